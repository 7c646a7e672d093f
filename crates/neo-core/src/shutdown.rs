//! Low battery shutdown scheduling
//!
//! Two policies decide when the board powers off:
//!
//! - **Countdown**: a warning band arms a deadline; recovering before the
//!   deadline disarms it, reaching it fires.
//! - **Confirmation**: boards without a display require several consecutive
//!   critical readings before firing, to ride out comparator glitches.
//!
//! Firing is terminal. The actual power-off goes through [`ShutdownLatch`],
//! which guarantees the trigger runs at most once no matter how many paths
//! request it.

use neo_hal::ShutdownTrigger;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::battery::BatteryBand;

/// Where the scheduler is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Idle,
    Armed { deadline: Instant },
    Firing,
}

/// Change caused by an observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownTransition {
    Armed { deadline: Instant },
    Disarmed,
    Fired,
}

#[derive(Debug, Clone, Copy)]
enum Policy {
    Countdown {
        warning_band: BatteryBand,
        period: Duration,
    },
    Confirmation {
        iterations: u32,
        remaining: u32,
    },
}

/// Decides when a low battery becomes a shutdown
#[derive(Debug, Clone)]
pub struct ShutdownScheduler {
    policy: Policy,
    state: ShutdownState,
}

impl ShutdownScheduler {
    /// Arm when the band drops to `warning_band` or below, fire `period` later
    pub fn countdown(warning_band: BatteryBand, period: Duration) -> Self {
        Self {
            policy: Policy::Countdown {
                warning_band,
                period,
            },
            state: ShutdownState::Idle,
        }
    }

    /// Fire on the critical reading that follows `iterations` consecutive
    /// critical readings
    pub fn confirmation(iterations: u32) -> Self {
        Self {
            policy: Policy::Confirmation {
                iterations,
                remaining: iterations,
            },
            state: ShutdownState::Idle,
        }
    }

    pub fn state(&self) -> ShutdownState {
        self.state
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, ShutdownState::Armed { .. })
    }

    pub fn is_firing(&self) -> bool {
        self.state == ShutdownState::Firing
    }

    /// Remaining critical readings the confirmation policy will tolerate
    pub fn confirmations_left(&self) -> Option<u32> {
        match self.policy {
            Policy::Confirmation { remaining, .. } => Some(remaining),
            Policy::Countdown { .. } => None,
        }
    }

    /// Feed a fresh battery classification
    pub fn observe(&mut self, band: BatteryBand, now: Instant) -> Option<ShutdownTransition> {
        if self.is_firing() {
            return None;
        }

        match &mut self.policy {
            Policy::Countdown {
                warning_band,
                period,
            } => match self.state {
                ShutdownState::Idle if band <= *warning_band => {
                    let Some(deadline) = now.checked_add(*period) else {
                        tracing::warn!(
                            "Warning period of {}s cannot be scheduled, countdown disabled",
                            period.as_secs()
                        );
                        return None;
                    };
                    tracing::warn!(
                        "Battery {}, shutting down in {}s unless it recovers",
                        band.name(),
                        period.as_secs()
                    );
                    self.state = ShutdownState::Armed { deadline };
                    Some(ShutdownTransition::Armed { deadline })
                }
                ShutdownState::Armed { .. } if band > *warning_band => {
                    tracing::info!("Battery recovered to {}, shutdown cancelled", band.name());
                    self.state = ShutdownState::Idle;
                    Some(ShutdownTransition::Disarmed)
                }
                _ => None,
            },
            Policy::Confirmation {
                iterations,
                remaining,
            } => {
                if band != BatteryBand::Critical {
                    *remaining = *iterations;
                    return None;
                }
                if *remaining == 0 {
                    tracing::warn!("Battery critical, confirmed");
                    self.state = ShutdownState::Firing;
                    return Some(ShutdownTransition::Fired);
                }
                *remaining -= 1;
                tracing::info!("Battery critical, {} confirmations left", *remaining);
                None
            }
        }
    }

    /// Fire if an armed deadline has passed
    pub fn tick(&mut self, now: Instant) -> Option<ShutdownTransition> {
        match self.state {
            ShutdownState::Armed { deadline } if now >= deadline => {
                tracing::warn!("Low battery warning period elapsed");
                self.state = ShutdownState::Firing;
                Some(ShutdownTransition::Fired)
            }
            _ => None,
        }
    }

    /// Skip any warning and fire
    pub fn fire_now(&mut self) -> Option<ShutdownTransition> {
        if self.is_firing() {
            return None;
        }
        self.state = ShutdownState::Firing;
        Some(ShutdownTransition::Fired)
    }
}

/// Runs a shutdown trigger at most once
pub struct ShutdownLatch {
    trigger: Box<dyn ShutdownTrigger>,
    fired: AtomicBool,
}

impl ShutdownLatch {
    pub fn new(trigger: Box<dyn ShutdownTrigger>) -> Self {
        Self {
            trigger,
            fired: AtomicBool::new(false),
        }
    }

    /// Request power-off. Returns false if it was already requested.
    pub fn fire(&self) -> bool {
        if self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        tracing::warn!("Powering off");
        if let Err(e) = self.trigger.request_shutdown() {
            tracing::error!("Shutdown request failed: {}", e);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo_hal::mock::{MockShutdown, MockState};
    use std::sync::Arc;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn test_countdown_arms_and_fires() {
        let mut scheduler = ShutdownScheduler::countdown(BatteryBand::Critical, MINUTE);
        let t0 = Instant::now();

        assert_eq!(scheduler.observe(BatteryBand::Low, t0), None);
        assert_eq!(
            scheduler.observe(BatteryBand::Critical, t0),
            Some(ShutdownTransition::Armed { deadline: t0 + MINUTE })
        );
        // staying low does not push the deadline back
        assert_eq!(scheduler.observe(BatteryBand::Critical, t0 + MINUTE / 2), None);
        assert_eq!(scheduler.tick(t0 + MINUTE / 2), None);

        assert_eq!(scheduler.tick(t0 + MINUTE), Some(ShutdownTransition::Fired));
        assert!(scheduler.is_firing());
    }

    #[test]
    fn test_unschedulable_period_never_fires() {
        let mut scheduler =
            ShutdownScheduler::countdown(BatteryBand::Critical, Duration::from_secs(u64::MAX));
        let t0 = Instant::now();

        assert_eq!(scheduler.observe(BatteryBand::Critical, t0), None);
        assert_eq!(scheduler.state(), ShutdownState::Idle);
        assert_eq!(scheduler.tick(t0 + MINUTE), None);

        // the immediate path still works
        assert_eq!(scheduler.fire_now(), Some(ShutdownTransition::Fired));
    }

    #[test]
    fn test_countdown_recovery_disarms() {
        let mut scheduler = ShutdownScheduler::countdown(BatteryBand::Medium, MINUTE);
        let t0 = Instant::now();

        scheduler.observe(BatteryBand::Medium, t0 + Duration::from_secs(30));
        assert!(scheduler.is_armed());

        assert_eq!(
            scheduler.observe(BatteryBand::Full, t0 + Duration::from_secs(60)),
            Some(ShutdownTransition::Disarmed)
        );
        assert_eq!(scheduler.state(), ShutdownState::Idle);
        assert_eq!(scheduler.tick(t0 + Duration::from_secs(120)), None);
    }

    #[test]
    fn test_firing_is_terminal() {
        let mut scheduler = ShutdownScheduler::countdown(BatteryBand::Critical, MINUTE);
        let t0 = Instant::now();

        assert_eq!(scheduler.fire_now(), Some(ShutdownTransition::Fired));
        assert_eq!(scheduler.fire_now(), None);
        assert_eq!(scheduler.observe(BatteryBand::Full, t0), None);
        assert!(scheduler.is_firing());
    }

    #[test]
    fn test_no_battery_never_arms() {
        let mut scheduler = ShutdownScheduler::countdown(BatteryBand::Critical, MINUTE);
        let t0 = Instant::now();

        for i in 0..10 {
            scheduler.observe(BatteryBand::NoBattery, t0 + MINUTE * i);
            scheduler.tick(t0 + MINUTE * i);
        }
        assert_eq!(scheduler.state(), ShutdownState::Idle);
    }

    #[test]
    fn test_confirmation_counts_down() {
        let mut scheduler = ShutdownScheduler::confirmation(3);
        let t0 = Instant::now();

        for left in [2, 1, 0] {
            assert_eq!(scheduler.observe(BatteryBand::Critical, t0), None);
            assert_eq!(scheduler.confirmations_left(), Some(left));
        }
        assert_eq!(
            scheduler.observe(BatteryBand::Critical, t0),
            Some(ShutdownTransition::Fired)
        );
    }

    #[test]
    fn test_confirmation_resets_on_recovery() {
        let mut scheduler = ShutdownScheduler::confirmation(3);
        let t0 = Instant::now();

        scheduler.observe(BatteryBand::Critical, t0);
        scheduler.observe(BatteryBand::Critical, t0);
        scheduler.observe(BatteryBand::Low, t0);
        assert_eq!(scheduler.confirmations_left(), Some(3));
        assert_eq!(scheduler.state(), ShutdownState::Idle);
    }

    #[test]
    fn test_latch_fires_once() {
        let state = MockState::shared();
        let latch = ShutdownLatch::new(Box::new(MockShutdown::new(state.clone())));

        assert!(latch.fire());
        assert!(!latch.fire());
        assert_eq!(state.read().unwrap().shutdown_requests, 1);
    }

    #[test]
    fn test_latch_fires_once_across_threads() {
        let state = MockState::shared();
        let latch = Arc::new(ShutdownLatch::new(Box::new(MockShutdown::new(
            state.clone(),
        ))));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let latch = latch.clone();
                std::thread::spawn(move || latch.fire())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|fired| *fired)
            .count();

        assert_eq!(winners, 1);
        assert_eq!(state.read().unwrap().shutdown_requests, 1);
    }
}
