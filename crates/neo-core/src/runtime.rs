//! HAT runtime
//!
//! Owns every component and runs the main loop. One iteration:
//!
//! 1. drain queued events (button presses, power-critical edges)
//! 2. poll the battery when the check interval has elapsed, feeding the
//!    shutdown scheduler and the low battery warning page
//! 3. fire the shutdown if the scheduler says so
//! 4. signal the battery band on the LED, serving events while it waits
//!
//! Background threads never touch runtime state. They send [`HatEvent`]s into
//! the runtime's inbox and the loop applies them, so page changes, renders and
//! deadline updates all happen on the loop thread. Admin actions run on their
//! own worker thread and report back the same way.

use neo_config::{DaemonSettings, HatProfile, ShutdownPolicy};
use neo_hal::{Clock, LedIndicator, ShutdownTrigger};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use crate::Result;
use crate::battery::{BatteryBand, BatteryMonitor, BatterySensor, PercentTable};
use crate::buttons::{ButtonDispatcher, ButtonEvent};
use crate::led::{LedSignaler, LedTable};
use crate::pages::{AdminAction, DisplayPages, PageNavigator};
use crate::shutdown::{ShutdownLatch, ShutdownScheduler};

/// Something that happened outside the loop thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HatEvent {
    Button(ButtonEvent),
    /// Falling edge on a power-critical line
    PowerCritical { pin: u32 },
    /// An admin action finished
    AdminOutcome { action: AdminAction, success: bool },
}

/// Why [`HatRuntime::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    /// Power-off was requested
    Shutdown,
    /// The stop flag was raised
    Stopped,
}

/// Runs the maintenance actions offered on the admin pages
pub trait AdminActions: Send {
    /// Run an action to completion, returning whether it succeeded. Called
    /// on the admin worker thread, never on the loop thread.
    fn execute(&mut self, action: AdminAction) -> bool;
}

/// Hands admin actions to a worker thread, one at a time
struct AdminWorker {
    jobs: Sender<AdminAction>,
    running: Option<AdminAction>,
}

impl AdminWorker {
    fn spawn(mut admin: Box<dyn AdminActions>, events: Sender<HatEvent>) -> Result<Self> {
        let (jobs, queue) = mpsc::channel::<AdminAction>();

        thread::Builder::new()
            .name("admin-worker".into())
            .spawn(move || {
                for action in queue {
                    let success = admin.execute(action);
                    if events.send(HatEvent::AdminOutcome { action, success }).is_err() {
                        tracing::debug!("Event receiver gone, stopping admin worker");
                        return;
                    }
                }
            })
            .map_err(neo_hal::HalError::from)?;

        Ok(Self {
            jobs,
            running: None,
        })
    }

    /// Queue an action. Returns false if the worker is gone.
    fn start(&mut self, action: AdminAction) -> bool {
        tracing::info!("Running admin action {}", action.name());
        if self.jobs.send(action).is_err() {
            tracing::warn!("Admin worker gone, cannot run {}", action.name());
            return false;
        }
        self.running = Some(action);
        true
    }
}

/// Display, button mapping and admin actions of a display-capable HAT
pub struct DisplayUnit {
    pub navigator: PageNavigator,
    pub dispatcher: ButtonDispatcher,
    pub admin: Box<dyn AdminActions>,
}

/// Loop timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeTiming {
    pub battery_check: Duration,
    pub input_poll: Duration,
    pub splash: Duration,
    /// Battery percentage at or below which shutdown is immediate
    pub shutdown_percent: u8,
}

impl RuntimeTiming {
    pub fn new(profile: &HatProfile, settings: &DaemonSettings) -> Self {
        Self {
            battery_check: settings.battery_check_interval(&profile.sensor),
            input_poll: settings.input_poll(),
            splash: settings.splash_timeout(),
            shutdown_percent: settings.shutdown_percent,
        }
    }
}

/// Hardware handed to [`HatRuntime::assemble`]
pub struct Hardware {
    pub clock: Arc<dyn Clock>,
    pub led: Box<dyn LedIndicator>,
    pub sensor: BatterySensor,
    pub shutdown: Box<dyn ShutdownTrigger>,
    pub display: Option<(Box<dyn DisplayPages>, Box<dyn AdminActions>)>,
}

/// Display side of the loop
struct Panel {
    navigator: PageNavigator,
    dispatcher: ButtonDispatcher,
    worker: AdminWorker,
}

/// Everything the loop touches while the LED is waiting
struct Reactor {
    clock: Arc<dyn Clock>,
    inbox: Receiver<HatEvent>,
    scheduler: ShutdownScheduler,
    display: Option<Panel>,
    stop: Arc<AtomicBool>,
    poll: Duration,
}

impl Reactor {
    fn drain(&mut self) {
        while let Ok(event) = self.inbox.try_recv() {
            self.handle(event);
        }
    }

    fn handle(&mut self, event: HatEvent) {
        match event {
            HatEvent::PowerCritical { pin } => {
                tracing::warn!("Power critical signal on GPIO {}", pin);
                self.scheduler.fire_now();
            }
            HatEvent::Button(event) => {
                let Some(display) = self.display.as_mut() else {
                    tracing::debug!("Ignoring {:?}, no display", event);
                    return;
                };
                if let Some(action) = display.worker.running {
                    tracing::debug!("Ignoring {:?} while {} runs", event, action.name());
                    return;
                }
                let Some(command) = display.dispatcher.dispatch(event, display.navigator.context())
                else {
                    return;
                };

                let now = self.clock.now();
                if let Some(action) = display.navigator.apply(command, now) {
                    if !display.worker.start(action) {
                        display.navigator.show_outcome(false, now);
                    }
                }
            }
            HatEvent::AdminOutcome { action, success } => {
                let Some(display) = self.display.as_mut() else {
                    return;
                };
                display.worker.running = None;
                if success {
                    tracing::info!("Admin action {} finished", action.name());
                } else {
                    tracing::warn!("Admin action {} failed", action.name());
                }
                display.navigator.show_outcome(success, self.clock.now());
            }
        }
    }

    /// Serve events until `until`, or until there is a reason to leave early
    fn idle_until(&mut self, until: Instant) {
        loop {
            self.drain();
            let now = self.clock.now();
            self.scheduler.tick(now);
            if let Some(display) = self.display.as_mut() {
                display.navigator.tick(now);
            }

            if now >= until || self.scheduler.is_firing() || self.stop.load(Ordering::Relaxed) {
                return;
            }
            self.clock.sleep((until - now).min(self.poll));
        }
    }
}

/// The HAT daemon state machine
pub struct HatRuntime {
    monitor: BatteryMonitor,
    led: LedSignaler,
    latch: ShutdownLatch,
    reactor: Reactor,
    events: Sender<HatEvent>,
    timing: RuntimeTiming,
    last_battery_check: Option<Instant>,
}

impl HatRuntime {
    pub fn new(
        clock: Arc<dyn Clock>,
        monitor: BatteryMonitor,
        led: LedSignaler,
        scheduler: ShutdownScheduler,
        latch: ShutdownLatch,
        display: Option<DisplayUnit>,
        timing: RuntimeTiming,
    ) -> Result<Self> {
        let (events, inbox) = mpsc::channel();
        let display = match display {
            Some(unit) => Some(Panel {
                navigator: unit.navigator,
                dispatcher: unit.dispatcher,
                worker: AdminWorker::spawn(unit.admin, events.clone())?,
            }),
            None => None,
        };

        Ok(Self {
            monitor,
            led,
            latch,
            reactor: Reactor {
                clock,
                inbox,
                scheduler,
                display,
                stop: Arc::new(AtomicBool::new(false)),
                poll: timing.input_poll,
            },
            events,
            timing,
            last_battery_check: None,
        })
    }

    /// Build a runtime for a HAT profile
    pub fn assemble(profile: &HatProfile, settings: &DaemonSettings, hw: Hardware) -> Result<Self> {
        let table = PercentTable::new(&profile.percent_thresholds)?;
        let scheduler = match profile.shutdown_policy {
            ShutdownPolicy::Countdown => ShutdownScheduler::countdown(
                table.classify(settings.warning_percent),
                settings.warning_period(),
            ),
            ShutdownPolicy::Confirmation => {
                ShutdownScheduler::confirmation(settings.confirm_iterations)
            }
        };

        let led = LedSignaler::new(
            hw.led,
            LedTable::from_blinks(&profile.led_blinks)?,
            hw.clock.clone(),
            settings.led_cycle(),
            settings.flash_delay(),
        );

        let display = match (profile.has_display, hw.display) {
            (true, Some((pages, admin))) => Some(DisplayUnit {
                navigator: PageNavigator::with_default_stacks(pages, settings.display_timeout())?,
                dispatcher: ButtonDispatcher::new(&profile.buttons),
                admin,
            }),
            (true, None) => {
                tracing::warn!("{} has a display but none was provided", profile.name);
                None
            }
            (false, _) => None,
        };

        tracing::info!(
            "Assembled runtime for {} ({:?} shutdown policy)",
            profile.name,
            profile.shutdown_policy
        );

        Self::new(
            hw.clock,
            BatteryMonitor::new(hw.sensor, table),
            led,
            scheduler,
            ShutdownLatch::new(hw.shutdown),
            display,
            RuntimeTiming::new(profile, settings),
        )
    }

    /// Sender for background threads
    pub fn event_sender(&self) -> Sender<HatEvent> {
        self.events.clone()
    }

    /// Flag that makes [`run`](Self::run) return at the next opportunity
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.reactor.stop.clone()
    }

    pub fn band(&self) -> BatteryBand {
        self.monitor.band()
    }

    pub fn scheduler(&self) -> &ShutdownScheduler {
        &self.reactor.scheduler
    }

    pub fn navigator(&self) -> Option<&PageNavigator> {
        self.reactor.display.as_ref().map(|d| &d.navigator)
    }

    /// Show the splash page, if there is a display
    pub fn start(&mut self) {
        let now = self.reactor.clock.now();
        if let Some(display) = self.reactor.display.as_mut() {
            display.navigator.start(now, self.timing.splash);
        }
    }

    /// Run until shutdown or stop
    pub fn run(&mut self) -> RunExit {
        tracing::info!("HAT runtime started");
        self.start();

        loop {
            if self.reactor.stop.load(Ordering::Relaxed) {
                tracing::info!("Stop requested");
                return RunExit::Stopped;
            }
            if let Some(exit) = self.run_cycle() {
                return exit;
            }
        }
    }

    /// One loop iteration. Returns `Some` once the board is shutting down.
    pub fn run_cycle(&mut self) -> Option<RunExit> {
        self.reactor.drain();

        let now = self.reactor.clock.now();
        let due = self
            .last_battery_check
            .is_none_or(|last| now.saturating_duration_since(last) >= self.timing.battery_check);
        if due {
            self.check_battery(now);
            self.last_battery_check = Some(now);
        }

        self.reactor.scheduler.tick(now);
        if let Some(display) = self.reactor.display.as_mut() {
            display.navigator.tick(now);
        }
        if self.reactor.scheduler.is_firing() {
            return Some(self.shutdown());
        }

        let band = self.monitor.band();
        let reactor = &mut self.reactor;
        self.led.signal_with(band, |until| reactor.idle_until(until));

        if self.reactor.scheduler.is_firing() {
            return Some(self.shutdown());
        }
        None
    }

    fn check_battery(&mut self, now: Instant) {
        let band = self.monitor.poll();

        if !self.monitor.above_percent(self.timing.shutdown_percent) {
            tracing::warn!(
                "Battery at {}%, shutting down immediately",
                self.monitor.percent().unwrap_or(0)
            );
            self.reactor.scheduler.fire_now();
            return;
        }

        self.reactor.scheduler.observe(band, now);

        let armed = self.reactor.scheduler.is_armed();
        if let Some(display) = self.reactor.display.as_mut() {
            if armed {
                display.navigator.show_low_battery_warning();
            } else {
                display.navigator.hide_low_battery_warning();
            }
        }
    }

    fn shutdown(&mut self) -> RunExit {
        self.led.off();
        self.latch.fire();
        RunExit::Shutdown
    }
}
