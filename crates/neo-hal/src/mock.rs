//! Mock implementations for testing without real hardware
//!
//! Every mock shares one [`MockState`] behind `Arc<RwLock<_>>`, so a test can
//! hand the mocks to the code under test and still flip pins, change the
//! battery level, or inspect what the LED did.
//!
//! # Usage
//!
//! ```no_run
//! use neo_hal::mock::{ManualClock, MockPower, MockState};
//! use neo_hal::{Clock, PowerSource};
//! use std::time::Duration;
//!
//! let state = MockState::shared();
//! let power = MockPower::new(state.clone());
//! state.write().unwrap().battery_percent = Some(42);
//! assert_eq!(power.battery_percent().unwrap(), Some(42));
//!
//! let clock = ManualClock::new();
//! let start = clock.now();
//! clock.sleep(Duration::from_secs(5));
//! assert_eq!(clock.now() - start, Duration::from_secs(5));
//! ```

use crate::clock::Clock;
use crate::gpio::{InputPin, OutputPin};
use crate::input::{ButtonId, ButtonInput};
use crate::led::LedIndicator;
use crate::power::{PowerSource, ThresholdLadder};
use crate::shutdown::ShutdownTrigger;
use crate::{HalError, Result};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

/// Shared state of all mock hardware
#[derive(Debug, Clone)]
pub struct MockState {
    pub pins: HashMap<u32, bool>,
    pub failing_pins: HashSet<u32>,
    pub led_on: Option<bool>,
    pub led_writes: Vec<bool>,
    pub led_fails: bool,
    pub battery_percent: Option<u8>,
    pub battery_present: bool,
    pub charger_present: bool,
    pub power_fails: bool,
    pub ladder: Vec<bool>,
    pub pressed: HashSet<ButtonId>,
    pub shutdown_requests: u32,
}

impl MockState {
    pub fn new() -> Self {
        Self {
            pins: HashMap::new(),
            failing_pins: HashSet::new(),
            led_on: None,
            led_writes: Vec::new(),
            led_fails: false,
            battery_percent: Some(85),
            battery_present: true,
            charger_present: false,
            power_fails: false,
            ladder: vec![true, true, true, true],
            pressed: HashSet::new(),
            shutdown_requests: 0,
        }
    }

    /// New state wrapped for sharing between mocks
    pub fn shared() -> Arc<RwLock<MockState>> {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Number of times the LED was switched off (one per blink)
    pub fn led_off_count(&self) -> usize {
        self.led_writes.iter().filter(|on| !**on).count()
    }
}

impl Default for MockState {
    fn default() -> Self {
        Self::new()
    }
}

fn mock_io_error(what: &str) -> HalError {
    HalError::Io(std::io::Error::other(format!("[MOCK] {} failed", what)))
}

/// Mock input pin
pub struct MockInputPin {
    number: u32,
    state: Arc<RwLock<MockState>>,
}

impl MockInputPin {
    pub fn new(number: u32, state: Arc<RwLock<MockState>>) -> Self {
        Self { number, state }
    }
}

impl InputPin for MockInputPin {
    fn number(&self) -> u32 {
        self.number
    }

    fn is_high(&self) -> Result<bool> {
        let state = self.state.read().map_err(|_| mock_io_error("pin read"))?;
        if state.failing_pins.contains(&self.number) {
            return Err(mock_io_error("pin read"));
        }
        Ok(state.pins.get(&self.number).copied().unwrap_or(false))
    }
}

/// Mock output pin
pub struct MockOutputPin {
    number: u32,
    state: Arc<RwLock<MockState>>,
}

impl MockOutputPin {
    pub fn new(number: u32, state: Arc<RwLock<MockState>>) -> Self {
        Self { number, state }
    }
}

impl OutputPin for MockOutputPin {
    fn number(&self) -> u32 {
        self.number
    }

    fn set_high(&self, high: bool) -> Result<()> {
        let mut state = self.state.write().map_err(|_| mock_io_error("pin write"))?;
        if state.failing_pins.contains(&self.number) {
            return Err(mock_io_error("pin write"));
        }
        state.pins.insert(self.number, high);
        Ok(())
    }
}

/// Mock LED recording every write
pub struct MockLed {
    state: Arc<RwLock<MockState>>,
}

impl MockLed {
    pub fn new(state: Arc<RwLock<MockState>>) -> Self {
        Self { state }
    }
}

impl LedIndicator for MockLed {
    fn set_on(&mut self, on: bool) -> Result<()> {
        let mut state = self.state.write().map_err(|_| mock_io_error("led write"))?;
        if state.led_fails {
            return Err(mock_io_error("led write"));
        }
        state.led_on = Some(on);
        state.led_writes.push(on);
        tracing::trace!("[MOCK] LED {}", if on { "on" } else { "off" });
        Ok(())
    }
}

/// Mock fuel gauge
pub struct MockPower {
    state: Arc<RwLock<MockState>>,
}

impl MockPower {
    pub fn new(state: Arc<RwLock<MockState>>) -> Self {
        Self { state }
    }

    fn read(&self) -> Result<MockState> {
        let state = self.state.read().map_err(|_| mock_io_error("gauge read"))?;
        if state.power_fails {
            return Err(mock_io_error("gauge read"));
        }
        Ok(state.clone())
    }
}

impl PowerSource for MockPower {
    fn battery_percent(&self) -> Result<Option<u8>> {
        let state = self.read()?;
        Ok(state.battery_percent.filter(|_| state.battery_present))
    }

    fn battery_exists(&self) -> Result<bool> {
        Ok(self.read()?.battery_present)
    }

    fn charger_present(&self) -> Result<bool> {
        Ok(self.read()?.charger_present)
    }
}

/// Mock threshold ladder
pub struct MockLadder {
    state: Arc<RwLock<MockState>>,
}

impl MockLadder {
    pub fn new(state: Arc<RwLock<MockState>>) -> Self {
        Self { state }
    }
}

impl ThresholdLadder for MockLadder {
    fn levels(&self) -> Result<Vec<bool>> {
        let state = self.state.read().map_err(|_| mock_io_error("ladder read"))?;
        if state.power_fails {
            return Err(mock_io_error("ladder read"));
        }
        Ok(state.ladder.clone())
    }
}

/// Mock buttons
pub struct MockButtons {
    buttons: Vec<ButtonId>,
    state: Arc<RwLock<MockState>>,
}

impl MockButtons {
    pub fn new(buttons: Vec<ButtonId>, state: Arc<RwLock<MockState>>) -> Self {
        Self { buttons, state }
    }

    pub fn press(&self, button: ButtonId) {
        if let Ok(mut state) = self.state.write() {
            state.pressed.insert(button);
        }
    }

    pub fn release(&self, button: ButtonId) {
        if let Ok(mut state) = self.state.write() {
            state.pressed.remove(&button);
        }
    }
}

impl ButtonInput for MockButtons {
    fn buttons(&self) -> Vec<ButtonId> {
        self.buttons.clone()
    }

    fn is_pressed(&self, button: ButtonId) -> Result<bool> {
        let state = self.state.read().map_err(|_| mock_io_error("button read"))?;
        Ok(state.pressed.contains(&button))
    }
}

/// Mock shutdown counting requests
pub struct MockShutdown {
    state: Arc<RwLock<MockState>>,
}

impl MockShutdown {
    pub fn new(state: Arc<RwLock<MockState>>) -> Self {
        Self { state }
    }
}

impl ShutdownTrigger for MockShutdown {
    fn request_shutdown(&self) -> Result<()> {
        let mut state = self.state.write().map_err(|_| mock_io_error("shutdown"))?;
        state.shutdown_requests += 1;
        tracing::debug!("[MOCK] Shutdown requested");
        Ok(())
    }
}

/// Virtual clock: `sleep` advances time instantly
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    /// Move virtual time forward
    pub fn advance(&self, duration: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += duration;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.lock().map(|now| *now).unwrap_or_else(|e| *e.into_inner())
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
