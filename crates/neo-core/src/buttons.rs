//! Button handling
//!
//! [`PressTracker`] turns sampled button levels into press events: it
//! debounces each button, measures how long a press lasts, and detects both
//! navigation buttons held together. [`ButtonDispatcher`] then maps an event
//! to a navigation command based on what the display is showing.
//! [`ButtonSampler`] runs a tracker on a background thread and forwards the
//! events over a channel.

use neo_config::{ButtonPin, ButtonRole, DaemonSettings};
use neo_hal::{ButtonId, ButtonInput, Clock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::pages::PageContext;
use crate::Result;

/// A completed press
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonEvent {
    Press(ButtonId),
    /// Both navigation buttons held past the long-press threshold
    LongPressBoth,
}

/// Navigation command produced from a press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    MoveForward,
    MoveBackward,
    PowerOff,
    SwitchStack,
    Enter,
    Cancel,
}

/// Timing used by [`PressTracker`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressTiming {
    pub bounce: Duration,
    pub cooldown: Duration,
    pub long_press: Duration,
    pub noise_floor: Duration,
}

impl From<&DaemonSettings> for PressTiming {
    fn from(settings: &DaemonSettings) -> Self {
        Self {
            bounce: settings.bounce(),
            cooldown: settings.press_cooldown(),
            long_press: settings.long_press(),
            noise_floor: settings.noise_floor(),
        }
    }
}

impl Default for PressTiming {
    fn default() -> Self {
        Self::from(&DaemonSettings::default())
    }
}

#[derive(Debug, Clone, Copy)]
struct Measurement {
    button: ButtonId,
    started: Instant,
    /// Release seen inside the bounce window, not yet confirmed
    released_at: Option<Instant>,
    dual_since: Option<Instant>,
    dual_longest: Duration,
}

impl Measurement {
    fn close_dual(&mut self, now: Instant) {
        if let Some(since) = self.dual_since.take() {
            self.dual_longest = self
                .dual_longest
                .max(now.saturating_duration_since(since));
        }
    }
}

/// Debounces samples and measures presses
#[derive(Debug)]
pub struct PressTracker {
    roles: HashMap<ButtonId, ButtonRole>,
    timing: PressTiming,
    down: HashSet<ButtonId>,
    last_edge: HashMap<ButtonId, Instant>,
    measuring: Option<Measurement>,
    finished_at: Option<Instant>,
}

impl PressTracker {
    pub fn new(layout: &[ButtonPin], timing: PressTiming) -> Self {
        Self {
            roles: layout.iter().map(|b| (b.id, b.role)).collect(),
            timing,
            down: HashSet::new(),
            last_edge: HashMap::new(),
            measuring: None,
            finished_at: None,
        }
    }

    /// Whether a press is being measured
    pub fn is_busy(&self) -> bool {
        self.measuring.is_some()
    }

    /// Feed one sample of button levels (`true` = pressed)
    pub fn sample(&mut self, levels: &[(ButtonId, bool)], now: Instant) -> Vec<ButtonEvent> {
        let mut events = Vec::new();
        let mut pressed = Vec::new();
        let mut released = Vec::new();

        for &(button, is_down) in levels {
            let was_down = self.down.contains(&button);
            if is_down && !was_down {
                self.down.insert(button);
                pressed.push(button);
            } else if !is_down && was_down {
                self.down.remove(&button);
                released.push(button);
            }
        }

        if let Some(event) = self.follow_measurement(&pressed, &released, now) {
            events.push(event);
        }

        for button in pressed {
            if let Some(event) = self.accept_press(button, now) {
                events.push(event);
            }
        }

        events
    }

    fn role(&self, button: ButtonId) -> Option<ButtonRole> {
        self.roles.get(&button).copied()
    }

    fn partner_down(&self, button: ButtonId) -> bool {
        self.down.iter().any(|other| {
            *other != button
                && matches!(
                    self.role(*other),
                    Some(ButtonRole::Primary | ButtonRole::Secondary)
                )
        })
    }

    /// Track the press being measured. A release inside the bounce window
    /// only ends the press once the window has passed without the button
    /// coming back.
    fn follow_measurement(
        &mut self,
        pressed: &[ButtonId],
        released: &[ButtonId],
        now: Instant,
    ) -> Option<ButtonEvent> {
        let partner_down = self.measuring.map(|m| self.partner_down(m.button))?;
        let bounce = self.timing.bounce;
        let measurement = self.measuring.as_mut()?;

        if partner_down {
            measurement.dual_since.get_or_insert(now);
        } else {
            measurement.close_dual(now);
        }

        if pressed.contains(&measurement.button) {
            measurement.released_at = None;
        } else if released.contains(&measurement.button) {
            measurement.released_at = Some(now);
        }
        let released_at = measurement.released_at?;
        if now - measurement.started < bounce {
            return None;
        }

        measurement.close_dual(released_at);
        let measurement = *measurement;
        self.measuring = None;
        self.finished_at = Some(now);

        let held = released_at - measurement.started;
        if held < self.timing.noise_floor {
            tracing::debug!("Ignoring {}ms blip on {}", held.as_millis(), measurement.button.name());
            return None;
        }
        if held >= self.timing.long_press && measurement.dual_longest >= self.timing.long_press {
            tracing::info!("Long press on both buttons");
            return Some(ButtonEvent::LongPressBoth);
        }
        Some(ButtonEvent::Press(measurement.button))
    }

    fn accept_press(&mut self, button: ButtonId, now: Instant) -> Option<ButtonEvent> {
        if let Some(last) = self.last_edge.get(&button) {
            if now - *last < self.timing.bounce {
                return None;
            }
        }
        self.last_edge.insert(button, now);

        match self.role(button)? {
            ButtonRole::PowerOff => Some(ButtonEvent::Press(button)),
            ButtonRole::Primary | ButtonRole::Secondary => {
                if self.measuring.is_some() {
                    return None;
                }
                if let Some(finished) = self.finished_at {
                    if now - finished < self.timing.cooldown {
                        return None;
                    }
                }
                self.measuring = Some(Measurement {
                    button,
                    started: now,
                    released_at: None,
                    dual_since: self.partner_down(button).then_some(now),
                    dual_longest: Duration::ZERO,
                });
                None
            }
        }
    }
}

/// Maps press events to commands
#[derive(Debug, Clone)]
pub struct ButtonDispatcher {
    roles: HashMap<ButtonId, ButtonRole>,
}

impl ButtonDispatcher {
    pub fn new(layout: &[ButtonPin]) -> Self {
        Self {
            roles: layout.iter().map(|b| (b.id, b.role)).collect(),
        }
    }

    /// Command for an event given the current page context
    pub fn dispatch(&self, event: ButtonEvent, context: PageContext) -> Option<Command> {
        let button = match event {
            ButtonEvent::LongPressBoth => return Some(Command::SwitchStack),
            ButtonEvent::Press(button) => button,
        };

        let command = match (self.roles.get(&button)?, context) {
            (ButtonRole::PowerOff, _) => Command::PowerOff,
            (ButtonRole::Primary, PageContext::Confirm | PageContext::Result) => Command::Cancel,
            (ButtonRole::Primary, _) => Command::MoveForward,
            (ButtonRole::Secondary, PageContext::Status) => Command::MoveBackward,
            (ButtonRole::Secondary, PageContext::Result) => Command::Cancel,
            (ButtonRole::Secondary, _) => Command::Enter,
        };
        Some(command)
    }
}

/// Samples buttons on a background thread
pub struct ButtonSampler {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ButtonSampler {
    /// Start sampling `input` every `interval`, sending each event mapped
    /// through `map`
    pub fn spawn<T, F>(
        input: Box<dyn ButtonInput>,
        mut tracker: PressTracker,
        clock: Arc<dyn Clock>,
        interval: Duration,
        tx: Sender<T>,
        map: F,
    ) -> Result<Self>
    where
        T: Send + 'static,
        F: Fn(ButtonEvent) -> T + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let buttons = input.buttons();

        let handle = thread::Builder::new()
            .name("button-sampler".into())
            .spawn(move || {
                let mut read_failed = false;
                while flag.load(Ordering::Relaxed) {
                    let mut levels = Vec::with_capacity(buttons.len());
                    for button in &buttons {
                        match input.is_pressed(*button) {
                            Ok(down) => levels.push((*button, down)),
                            Err(e) => {
                                if !read_failed {
                                    tracing::warn!("Button {} read failed: {}", button.name(), e);
                                }
                                read_failed = true;
                            }
                        }
                    }
                    if levels.len() == buttons.len() {
                        read_failed = false;
                    }

                    for event in tracker.sample(&levels, clock.now()) {
                        if tx.send(map(event)).is_err() {
                            tracing::debug!("Event receiver gone, stopping button sampler");
                            return;
                        }
                    }
                    thread::sleep(interval);
                }
            })
            .map_err(neo_hal::HalError::from)?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ButtonSampler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEFT: ButtonId = ButtonId::Left;
    const RIGHT: ButtonId = ButtonId::Right;

    fn layout() -> Vec<ButtonPin> {
        vec![
            ButtonPin {
                id: LEFT,
                pin: 198,
                role: ButtonRole::Primary,
            },
            ButtonPin {
                id: RIGHT,
                pin: 199,
                role: ButtonRole::Secondary,
            },
            ButtonPin {
                id: ButtonId::Middle,
                pin: 200,
                role: ButtonRole::PowerOff,
            },
        ]
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    /// Drive a tracker with a level timeline sampled every 10 ms
    struct Harness {
        tracker: PressTracker,
        t0: Instant,
        now: Duration,
        levels: HashMap<ButtonId, bool>,
        events: Vec<(Duration, ButtonEvent)>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                tracker: PressTracker::new(&layout(), PressTiming::default()),
                t0: Instant::now(),
                now: Duration::ZERO,
                levels: HashMap::new(),
                events: Vec::new(),
            }
        }

        fn set(&mut self, button: ButtonId, down: bool) -> &mut Self {
            self.levels.insert(button, down);
            self
        }

        fn run(&mut self, duration: Duration) -> &mut Self {
            let end = self.now + duration;
            while self.now < end {
                let levels: Vec<_> = self.levels.iter().map(|(b, d)| (*b, *d)).collect();
                for event in self.tracker.sample(&levels, self.t0 + self.now) {
                    self.events.push((self.now, event));
                }
                self.now += ms(10);
            }
            self
        }

        fn events(&self) -> Vec<ButtonEvent> {
            self.events.iter().map(|(_, e)| *e).collect()
        }
    }

    #[test]
    fn test_short_press() {
        let mut h = Harness::new();
        h.set(LEFT, true).run(ms(200)).set(LEFT, false).run(ms(50));

        assert_eq!(h.events(), vec![ButtonEvent::Press(LEFT)]);
        assert_eq!(h.events[0].0, ms(200));
        assert!(!h.tracker.is_busy());
    }

    #[test]
    fn test_noise_is_ignored() {
        let mut h = Harness::new();
        h.set(LEFT, true).run(ms(50)).set(LEFT, false).run(ms(50));
        assert!(h.events().is_empty());
    }

    #[test]
    fn test_bounce_within_window_is_one_press() {
        let mut h = Harness::new();
        // contact chatter: release and re-press inside the bounce window
        h.set(LEFT, true).run(ms(20));
        h.set(LEFT, false).run(ms(20));
        h.set(LEFT, true).run(ms(300));
        h.set(LEFT, false).run(ms(50));

        assert_eq!(h.events(), vec![ButtonEvent::Press(LEFT)]);
        assert_eq!(h.events[0].0, ms(340));

        let mut h = Harness::new();
        h.set(LEFT, true).run(ms(150));
        h.set(LEFT, false).run(ms(400));
        h.set(LEFT, true).run(ms(150));
        h.set(LEFT, false).run(ms(50));
        assert_eq!(
            h.events(),
            vec![ButtonEvent::Press(LEFT), ButtonEvent::Press(LEFT)]
        );
    }

    #[test]
    fn test_chatter_on_release_edge_is_one_press() {
        let mut h = Harness::new();
        h.set(LEFT, true).run(ms(200));
        // release chatters before settling
        h.set(LEFT, false).run(ms(10));
        h.set(LEFT, true).run(ms(10));
        h.set(LEFT, false).run(ms(300));

        assert_eq!(h.events(), vec![ButtonEvent::Press(LEFT)]);
        assert!(!h.tracker.is_busy());
    }

    #[test]
    fn test_tap_inside_bounce_window_is_noise() {
        let mut h = Harness::new();
        h.set(LEFT, true).run(ms(50));
        h.set(LEFT, false).run(ms(200));

        // the release is confirmed once the window passes; 50 ms is noise
        assert!(h.events().is_empty());
        assert!(!h.tracker.is_busy());
    }

    #[test]
    fn test_cooldown_after_press() {
        let mut h = Harness::new();
        h.set(LEFT, true).run(ms(150)).set(LEFT, false).run(ms(100));
        h.set(RIGHT, true).run(ms(150)).set(RIGHT, false).run(ms(50));

        // the right press began 100 ms after the left one finished
        assert_eq!(h.events(), vec![ButtonEvent::Press(LEFT)]);
    }

    #[test]
    fn test_busy_suppresses_second_button() {
        let mut h = Harness::new();
        h.set(LEFT, true).run(ms(100));
        h.set(RIGHT, true).run(ms(200));
        h.set(RIGHT, false).run(ms(100));
        h.set(LEFT, false).run(ms(50));

        assert_eq!(h.events(), vec![ButtonEvent::Press(LEFT)]);
    }

    #[test]
    fn test_long_press_both() {
        let mut h = Harness::new();
        h.set(LEFT, true).set(RIGHT, true).run(ms(3200));
        h.set(LEFT, false).set(RIGHT, false).run(ms(50));

        assert_eq!(h.events(), vec![ButtonEvent::LongPressBoth]);
    }

    #[test]
    fn test_long_single_press_is_a_press() {
        let mut h = Harness::new();
        h.set(LEFT, true).run(ms(1000));
        h.set(RIGHT, true).run(ms(1000));
        h.set(RIGHT, false).run(ms(2000));
        h.set(LEFT, false).run(ms(50));

        // held 4 s but together for only 1 s
        assert_eq!(h.events(), vec![ButtonEvent::Press(LEFT)]);
    }

    #[test]
    fn test_power_button_is_immediate() {
        let mut h = Harness::new();
        h.set(LEFT, true).run(ms(100));
        h.set(ButtonId::Middle, true).run(ms(20));

        assert_eq!(h.events(), vec![ButtonEvent::Press(ButtonId::Middle)]);
        assert_eq!(h.events[0].0, ms(100));
    }

    #[test]
    fn test_dispatch_by_context() {
        let dispatcher = ButtonDispatcher::new(&layout());
        let left = ButtonEvent::Press(LEFT);
        let right = ButtonEvent::Press(RIGHT);

        assert_eq!(
            dispatcher.dispatch(left, PageContext::Status),
            Some(Command::MoveForward)
        );
        assert_eq!(
            dispatcher.dispatch(left, PageContext::Admin),
            Some(Command::MoveForward)
        );
        assert_eq!(
            dispatcher.dispatch(left, PageContext::Confirm),
            Some(Command::Cancel)
        );
        assert_eq!(
            dispatcher.dispatch(right, PageContext::Status),
            Some(Command::MoveBackward)
        );
        assert_eq!(
            dispatcher.dispatch(right, PageContext::Admin),
            Some(Command::Enter)
        );
        assert_eq!(
            dispatcher.dispatch(right, PageContext::Confirm),
            Some(Command::Enter)
        );
        assert_eq!(
            dispatcher.dispatch(right, PageContext::Result),
            Some(Command::Cancel)
        );
        assert_eq!(
            dispatcher.dispatch(ButtonEvent::Press(ButtonId::Middle), PageContext::Admin),
            Some(Command::PowerOff)
        );
        assert_eq!(
            dispatcher.dispatch(ButtonEvent::LongPressBoth, PageContext::Status),
            Some(Command::SwitchStack)
        );
    }

    #[test]
    fn test_unknown_button_dispatches_nothing() {
        let dispatcher = ButtonDispatcher::new(&layout()[..2]);
        assert_eq!(
            dispatcher.dispatch(ButtonEvent::Press(ButtonId::Middle), PageContext::Status),
            None
        );
    }
}
