//! Battery level classification
//!
//! Turns fuel-gauge percentages or comparator pin levels into a small ordered
//! set of bands. Sensor failures never produce a low band: an unreadable
//! sensor is treated the same as "no battery, running on external power".

use neo_hal::{PowerSource, ThresholdLadder};
use serde::{Deserialize, Serialize};

use crate::{CoreError, Result};

/// Discretised battery charge, ordered from emptiest to fullest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatteryBand {
    Critical,
    Low,
    Medium,
    Full,
    /// No battery (or no reading): above every threshold
    NoBattery,
}

impl BatteryBand {
    /// Get band name
    pub fn name(&self) -> &'static str {
        match self {
            BatteryBand::Critical => "critical",
            BatteryBand::Low => "low",
            BatteryBand::Medium => "medium",
            BatteryBand::Full => "full",
            BatteryBand::NoBattery => "no battery",
        }
    }

    /// Bands a real battery can be in, emptiest first
    pub fn measured() -> [BatteryBand; 4] {
        [
            BatteryBand::Critical,
            BatteryBand::Low,
            BatteryBand::Medium,
            BatteryBand::Full,
        ]
    }
}

/// Percentage thresholds a battery must be strictly above for each band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PercentTable {
    low: u8,
    medium: u8,
    full: u8,
}

impl PercentTable {
    /// Build from `[low, medium, full]`, strictly increasing
    pub fn new(thresholds: &[u8]) -> Result<Self> {
        match thresholds {
            [low, medium, full] if low < medium && medium < full => Ok(Self {
                low: *low,
                medium: *medium,
                full: *full,
            }),
            _ => Err(CoreError::InvalidTable(format!(
                "expected 3 increasing percentages, got {:?}",
                thresholds
            ))),
        }
    }

    /// Band for a percentage
    pub fn classify(&self, percent: u8) -> BatteryBand {
        if percent > self.full {
            BatteryBand::Full
        } else if percent > self.medium {
            BatteryBand::Medium
        } else if percent > self.low {
            BatteryBand::Low
        } else {
            BatteryBand::Critical
        }
    }
}

impl Default for PercentTable {
    fn default() -> Self {
        Self {
            low: 3,
            medium: 33,
            full: 63,
        }
    }
}

/// Where readings come from
pub enum BatterySensor {
    Gauge(Box<dyn PowerSource>),
    Ladder(Box<dyn ThresholdLadder>),
}

/// Polls the battery sensor and keeps the latest classification
pub struct BatteryMonitor {
    sensor: BatterySensor,
    table: PercentTable,
    band: BatteryBand,
    percent: Option<u8>,
}

impl BatteryMonitor {
    pub fn new(sensor: BatterySensor, table: PercentTable) -> Self {
        Self {
            sensor,
            table,
            band: BatteryBand::NoBattery,
            percent: None,
        }
    }

    /// Read the sensor and classify
    pub fn poll(&mut self) -> BatteryBand {
        let (band, percent) = match &self.sensor {
            BatterySensor::Gauge(source) => Self::read_gauge(source.as_ref(), &self.table),
            BatterySensor::Ladder(ladder) => (Self::read_ladder(ladder.as_ref()), None),
        };

        if band != self.band {
            tracing::info!("Battery band {} -> {}", self.band.name(), band.name());
        }
        self.band = band;
        self.percent = percent;
        band
    }

    fn read_gauge(source: &dyn PowerSource, table: &PercentTable) -> (BatteryBand, Option<u8>) {
        match source.battery_exists() {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!("No battery attached");
                return (BatteryBand::NoBattery, None);
            }
            Err(e) => {
                tracing::warn!("Battery presence read failed, assuming external power: {}", e);
                return (BatteryBand::NoBattery, None);
            }
        }

        if let Ok(charging) = source.charger_present() {
            tracing::debug!("Charger present: {}", charging);
        }

        match source.battery_percent() {
            Ok(Some(percent)) => {
                tracing::debug!("Battery level: {}%", percent);
                (table.classify(percent), Some(percent))
            }
            Ok(None) => (BatteryBand::NoBattery, None),
            Err(e) => {
                tracing::warn!("Battery level read failed, assuming external power: {}", e);
                (BatteryBand::NoBattery, None)
            }
        }
    }

    fn read_ladder(ladder: &dyn ThresholdLadder) -> BatteryBand {
        let levels = match ladder.levels() {
            Ok(levels) => levels,
            Err(e) => {
                tracing::warn!("Threshold pin read failed, assuming external power: {}", e);
                return BatteryBand::NoBattery;
            }
        };

        // Only the highest asserted comparator is trusted; the lower ones may
        // disagree near their thresholds
        let bands = BatteryBand::measured();
        match levels.iter().rposition(|high| *high) {
            Some(index) if index > 0 => bands[index.min(bands.len() - 1)],
            _ => BatteryBand::Critical,
        }
    }

    /// Band from the latest poll
    pub fn band(&self) -> BatteryBand {
        self.band
    }

    /// Percentage from the latest poll, if the sensor reports one
    pub fn percent(&self) -> Option<u8> {
        self.percent
    }

    /// Whether the latest reading is above `level` percent. Without a
    /// percentage reading the battery counts as above every level.
    pub fn above_percent(&self, level: u8) -> bool {
        self.percent.is_none_or(|percent| percent > level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo_hal::mock::{MockLadder, MockPower, MockState};

    fn gauge_monitor() -> (BatteryMonitor, std::sync::Arc<std::sync::RwLock<MockState>>) {
        let state = MockState::shared();
        let monitor = BatteryMonitor::new(
            BatterySensor::Gauge(Box::new(MockPower::new(state.clone()))),
            PercentTable::default(),
        );
        (monitor, state)
    }

    #[test]
    fn test_band_ordering() {
        assert!(BatteryBand::Critical < BatteryBand::Low);
        assert!(BatteryBand::Low < BatteryBand::Medium);
        assert!(BatteryBand::Medium < BatteryBand::Full);
        assert!(BatteryBand::Full < BatteryBand::NoBattery);
    }

    #[test]
    fn test_percent_table_boundaries() {
        let table = PercentTable::default();
        assert_eq!(table.classify(100), BatteryBand::Full);
        assert_eq!(table.classify(64), BatteryBand::Full);
        assert_eq!(table.classify(63), BatteryBand::Medium);
        assert_eq!(table.classify(34), BatteryBand::Medium);
        assert_eq!(table.classify(33), BatteryBand::Low);
        assert_eq!(table.classify(4), BatteryBand::Low);
        assert_eq!(table.classify(3), BatteryBand::Critical);
        assert_eq!(table.classify(0), BatteryBand::Critical);
    }

    #[test]
    fn test_classification_is_a_step_function() {
        let table = PercentTable::default();
        let mut changes = 0;
        for percent in 1..=100u8 {
            if table.classify(percent) != table.classify(percent - 1) {
                changes += 1;
                assert!(table.classify(percent) > table.classify(percent - 1));
            }
        }
        // Exactly one step per threshold, never back down
        assert_eq!(changes, 3);
    }

    #[test]
    fn test_percent_table_rejects_bad_input() {
        assert!(PercentTable::new(&[3, 33, 63]).is_ok());
        assert!(PercentTable::new(&[33, 3, 63]).is_err());
        assert!(PercentTable::new(&[3, 33]).is_err());
    }

    #[test]
    fn test_gauge_poll() {
        let (mut monitor, state) = gauge_monitor();

        state.write().unwrap().battery_percent = Some(50);
        assert_eq!(monitor.poll(), BatteryBand::Medium);
        assert_eq!(monitor.percent(), Some(50));
        assert!(monitor.above_percent(3));
        assert!(!monitor.above_percent(50));
    }

    #[test]
    fn test_absent_battery_is_always_above() {
        let (mut monitor, state) = gauge_monitor();
        state.write().unwrap().battery_present = false;

        assert_eq!(monitor.poll(), BatteryBand::NoBattery);
        assert!(monitor.above_percent(100));
    }

    #[test]
    fn test_sensor_failure_fails_safe() {
        let (mut monitor, state) = gauge_monitor();
        state.write().unwrap().battery_percent = Some(1);
        assert_eq!(monitor.poll(), BatteryBand::Critical);

        state.write().unwrap().power_fails = true;
        assert_eq!(monitor.poll(), BatteryBand::NoBattery);
        assert_eq!(monitor.percent(), None);
        assert!(monitor.above_percent(1));
    }

    #[test]
    fn test_ladder_highest_pin_wins() {
        let state = MockState::shared();
        let mut monitor = BatteryMonitor::new(
            BatterySensor::Ladder(Box::new(MockLadder::new(state.clone()))),
            PercentTable::default(),
        );

        let cases = [
            (vec![true, true, true, true], BatteryBand::Full),
            (vec![true, true, true, false], BatteryBand::Medium),
            (vec![true, true, false, false], BatteryBand::Low),
            (vec![true, false, false, false], BatteryBand::Critical),
            (vec![false, false, false, false], BatteryBand::Critical),
            // lower comparators flapping near their threshold are ignored
            (vec![false, true, false, true], BatteryBand::Full),
            (vec![false, false, true, false], BatteryBand::Medium),
        ];
        for (levels, expected) in cases {
            state.write().unwrap().ladder = levels.clone();
            assert_eq!(monitor.poll(), expected, "levels {:?}", levels);
        }
    }

    #[test]
    fn test_ladder_failure_fails_safe() {
        let state = MockState::shared();
        state.write().unwrap().power_fails = true;
        let mut monitor = BatteryMonitor::new(
            BatterySensor::Ladder(Box::new(MockLadder::new(state))),
            PercentTable::default(),
        );
        assert_eq!(monitor.poll(), BatteryBand::NoBattery);
    }
}
