//! Status LED signalling
//!
//! One call to [`LedSignaler::signal`] is one LED cycle: the blink pattern for
//! the battery band followed by padding up to the minimum cycle length. All
//! waiting goes through a caller-supplied idle hook so the runtime can keep
//! serving events while the LED is blinking.

use neo_hal::{Clock, LedIndicator};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::battery::BatteryBand;
use crate::{CoreError, Result};

/// What the LED does during one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedPattern {
    /// Steady on
    Solid,
    /// Off/on this many times
    Blink(u8),
}

impl LedPattern {
    fn from_count(count: u8) -> Self {
        if count == 0 {
            LedPattern::Solid
        } else {
            LedPattern::Blink(count)
        }
    }
}

/// Band to pattern mapping for one board revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedTable {
    patterns: [LedPattern; 4],
}

impl LedTable {
    /// Build from blink counts ordered critical, low, medium, full.
    /// A count of zero means solid.
    pub fn from_blinks(blinks: &[u8]) -> Result<Self> {
        match blinks {
            [critical, low, medium, full] => Ok(Self {
                patterns: [
                    LedPattern::from_count(*critical),
                    LedPattern::from_count(*low),
                    LedPattern::from_count(*medium),
                    LedPattern::from_count(*full),
                ],
            }),
            _ => Err(CoreError::InvalidTable(format!(
                "expected 4 blink counts, got {:?}",
                blinks
            ))),
        }
    }

    pub fn pattern(&self, band: BatteryBand) -> LedPattern {
        match band {
            BatteryBand::Critical => self.patterns[0],
            BatteryBand::Low => self.patterns[1],
            BatteryBand::Medium => self.patterns[2],
            BatteryBand::Full => self.patterns[3],
            BatteryBand::NoBattery => LedPattern::Solid,
        }
    }
}

impl Default for LedTable {
    fn default() -> Self {
        Self {
            patterns: [
                LedPattern::Blink(3),
                LedPattern::Blink(2),
                LedPattern::Blink(1),
                LedPattern::Solid,
            ],
        }
    }
}

/// Drives the status LED
pub struct LedSignaler {
    led: Box<dyn LedIndicator>,
    table: LedTable,
    clock: Arc<dyn Clock>,
    cycle: Duration,
    flash_delay: Duration,
    write_failed: bool,
}

impl LedSignaler {
    pub fn new(
        led: Box<dyn LedIndicator>,
        table: LedTable,
        clock: Arc<dyn Clock>,
        cycle: Duration,
        flash_delay: Duration,
    ) -> Self {
        Self {
            led,
            table,
            clock,
            cycle,
            flash_delay,
            write_failed: false,
        }
    }

    /// Run one LED cycle, sleeping on the clock while waiting
    pub fn signal(&mut self, band: BatteryBand) -> LedPattern {
        let clock = self.clock.clone();
        self.signal_with(band, move |until| {
            let now = clock.now();
            if until > now {
                clock.sleep(until - now);
            }
        })
    }

    /// Run one LED cycle, calling `wait_until` for every pause. The hook
    /// should return once the given instant has passed; returning early only
    /// shortens the cycle.
    pub fn signal_with<F>(&mut self, band: BatteryBand, mut wait_until: F) -> LedPattern
    where
        F: FnMut(Instant),
    {
        let start = self.clock.now();
        let pattern = self.table.pattern(band);

        match pattern {
            LedPattern::Solid => self.set(true),
            LedPattern::Blink(count) => {
                for _ in 0..count {
                    self.set(false);
                    wait_until(after(self.clock.now(), self.flash_delay));
                    self.set(true);
                    wait_until(after(self.clock.now(), self.flash_delay));
                }
            }
        }

        wait_until(after(start, self.cycle));
        pattern
    }

    /// Switch the LED off, used right before power-off
    pub fn off(&mut self) {
        self.set(false);
    }

    fn set(&mut self, on: bool) {
        match self.led.set_on(on) {
            Ok(()) => self.write_failed = false,
            Err(e) => {
                // One warning per failure streak
                if !self.write_failed {
                    tracing::warn!("LED write failed: {}", e);
                }
                self.write_failed = true;
            }
        }
    }
}

/// `at + delay`, or `at` when that is not representable
fn after(at: Instant, delay: Duration) -> Instant {
    at.checked_add(delay).unwrap_or(at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo_hal::mock::{ManualClock, MockLed, MockState};
    use std::sync::RwLock;

    fn signaler(table: LedTable) -> (LedSignaler, Arc<RwLock<MockState>>, Arc<ManualClock>) {
        let state = MockState::shared();
        let clock = Arc::new(ManualClock::new());
        let signaler = LedSignaler::new(
            Box::new(MockLed::new(state.clone())),
            table,
            clock.clone(),
            Duration::from_secs(5),
            Duration::from_millis(300),
        );
        (signaler, state, clock)
    }

    #[test]
    fn test_default_table() {
        let table = LedTable::default();
        assert_eq!(table.pattern(BatteryBand::Full), LedPattern::Solid);
        assert_eq!(table.pattern(BatteryBand::Medium), LedPattern::Blink(1));
        assert_eq!(table.pattern(BatteryBand::Low), LedPattern::Blink(2));
        assert_eq!(table.pattern(BatteryBand::Critical), LedPattern::Blink(3));
        assert_eq!(table.pattern(BatteryBand::NoBattery), LedPattern::Solid);
    }

    #[test]
    fn test_table_from_blinks() {
        let table = LedTable::from_blinks(&[4, 2, 1, 0]).unwrap();
        assert_eq!(table.pattern(BatteryBand::Critical), LedPattern::Blink(4));
        assert_eq!(table.pattern(BatteryBand::Full), LedPattern::Solid);
        assert!(LedTable::from_blinks(&[1, 2]).is_err());
    }

    #[test]
    fn test_blink_cycle_is_padded() {
        let (mut led, state, clock) = signaler(LedTable::default());
        let start = clock.now();

        assert_eq!(led.signal(BatteryBand::Low), LedPattern::Blink(2));

        assert_eq!(clock.now() - start, Duration::from_secs(5));
        let state = state.read().unwrap();
        assert_eq!(state.led_writes, vec![false, true, false, true]);
        assert_eq!(state.led_on, Some(true));
    }

    #[test]
    fn test_solid_cycle() {
        let (mut led, state, clock) = signaler(LedTable::default());
        let start = clock.now();

        led.signal(BatteryBand::Full);

        assert_eq!(clock.now() - start, Duration::from_secs(5));
        assert_eq!(state.read().unwrap().led_writes, vec![true]);
    }

    #[test]
    fn test_long_pattern_overruns_cycle() {
        let (mut led, _state, clock) = signaler(LedTable::from_blinks(&[9, 2, 1, 0]).unwrap());
        let start = clock.now();

        led.signal(BatteryBand::Critical);

        // 9 blinks of 600 ms do not fit into 5 s; no padding is added
        assert_eq!(clock.now() - start, Duration::from_millis(5400));
    }

    #[test]
    fn test_waits_go_through_hook() {
        let (mut led, _state, clock) = signaler(LedTable::default());
        let mut waits = Vec::new();
        let start = clock.now();

        led.signal_with(BatteryBand::Medium, |until| {
            waits.push(until - start);
            clock.advance(until.saturating_duration_since(clock.now()));
        });

        assert_eq!(
            waits,
            vec![
                Duration::from_millis(300),
                Duration::from_millis(600),
                Duration::from_secs(5)
            ]
        );
    }

    #[test]
    fn test_write_failure_is_ignored() {
        let (mut led, state, clock) = signaler(LedTable::default());
        state.write().unwrap().led_fails = true;
        let start = clock.now();

        assert_eq!(led.signal(BatteryBand::Critical), LedPattern::Blink(3));
        assert_eq!(clock.now() - start, Duration::from_secs(5));
    }

    #[test]
    fn test_off() {
        let (mut led, state, _clock) = signaler(LedTable::default());
        led.off();
        assert_eq!(state.read().unwrap().led_on, Some(false));
    }
}
