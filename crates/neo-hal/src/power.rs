//! Power sources
//!
//! Two ways of learning how much battery is left:
//!
//! - [`SysfsPowerSupply`]: the AXP209 fuel gauge, read through the kernel
//!   `power_supply` class (`capacity`, `present`, charger `online`).
//! - [`GpioLadder`]: a resistor-ladder board whose comparators pull one GPIO
//!   high per voltage threshold that the battery is above.

use crate::gpio::InputPin;
use crate::{HalError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Battery gauge reported by a power-management chip
pub trait PowerSource: Send {
    /// Charge percentage, or `None` when the chip reports no reading
    fn battery_percent(&self) -> Result<Option<u8>>;

    /// Whether a battery is attached
    fn battery_exists(&self) -> Result<bool>;

    /// Whether external power is connected
    fn charger_present(&self) -> Result<bool>;
}

/// Voltage threshold comparators, ordered from the lowest threshold upwards
pub trait ThresholdLadder: Send {
    /// Level of each threshold pin, lowest threshold first
    fn levels(&self) -> Result<Vec<bool>>;
}

/// Sysfs locations of the battery and charger supplies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerSupplyPaths {
    pub battery: PathBuf,
    pub charger: PathBuf,
}

impl Default for PowerSupplyPaths {
    fn default() -> Self {
        Self {
            battery: PathBuf::from("/sys/class/power_supply/axp20x-battery"),
            charger: PathBuf::from("/sys/class/power_supply/axp20x-ac"),
        }
    }
}

/// Power source backed by the kernel `power_supply` class
#[derive(Debug, Clone)]
pub struct SysfsPowerSupply {
    paths: PowerSupplyPaths,
}

impl SysfsPowerSupply {
    /// Create with explicit paths
    pub fn new(paths: PowerSupplyPaths) -> Self {
        Self { paths }
    }

    /// Create with the given paths, replacing any that don't exist with the
    /// supplies found by scanning `supply_root`
    pub fn detect(paths: PowerSupplyPaths, supply_root: &Path) -> Result<Self> {
        let mut supply = Self::new(paths);
        if !supply.paths.battery.exists() || !supply.paths.charger.exists() {
            supply.detect_power_supplies(supply_root)?;
        }
        Ok(supply)
    }

    /// Detect power supply sysfs paths
    fn detect_power_supplies(&mut self, supply_root: &Path) -> Result<()> {
        if !supply_root.exists() {
            return Ok(());
        }

        for entry in fs::read_dir(supply_root)? {
            let entry = entry?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_lowercase();

            // Read type to determine if it's battery or charger
            if let Ok(psu_type) = fs::read_to_string(path.join("type")) {
                let psu_type = psu_type.trim().to_lowercase();

                if psu_type == "battery" && !self.paths.battery.exists() {
                    tracing::info!("Found battery at {}", path.display());
                    self.paths.battery = path;
                } else if (psu_type == "mains" || psu_type == "usb" || name.contains("ac"))
                    && psu_type != "battery"
                    && !self.paths.charger.exists()
                {
                    tracing::info!("Found charger at {}", path.display());
                    self.paths.charger = path;
                }
            }
        }

        Ok(())
    }

    /// Resolved paths
    pub fn paths(&self) -> &PowerSupplyPaths {
        &self.paths
    }

    /// Whether the battery supply node exists at all
    pub fn is_present(&self) -> bool {
        self.paths.battery.exists()
    }

    /// Read integer from sysfs file
    fn read_sysfs_int(path: &Path) -> Result<i64> {
        let raw = fs::read_to_string(path)?;
        raw.trim().parse().map_err(|e| {
            HalError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{}: {}", path.display(), e),
            ))
        })
    }
}

impl PowerSource for SysfsPowerSupply {
    fn battery_percent(&self) -> Result<Option<u8>> {
        if !self.battery_exists()? {
            return Ok(None);
        }
        // The gauge reports -1 before it has been calibrated
        let capacity = Self::read_sysfs_int(&self.paths.battery.join("capacity"))?;
        if capacity < 0 {
            return Ok(None);
        }
        Ok(Some(capacity.min(100) as u8))
    }

    fn battery_exists(&self) -> Result<bool> {
        let present = self.paths.battery.join("present");
        if present.exists() {
            return Ok(Self::read_sysfs_int(&present)? == 1);
        }
        Ok(self.paths.battery.join("capacity").exists())
    }

    fn charger_present(&self) -> Result<bool> {
        let online = self.paths.charger.join("online");
        if online.exists() {
            return Ok(Self::read_sysfs_int(&online)? == 1);
        }

        // Fallback: check battery status
        let status = fs::read_to_string(self.paths.battery.join("status"))?;
        Ok(matches!(status.trim(), "Charging" | "Full"))
    }
}

/// Threshold ladder read from GPIO inputs
pub struct GpioLadder {
    pins: Vec<Box<dyn InputPin>>,
}

impl GpioLadder {
    /// Pins must be ordered from the lowest voltage threshold upwards
    pub fn new(pins: Vec<Box<dyn InputPin>>) -> Self {
        Self { pins }
    }
}

impl ThresholdLadder for GpioLadder {
    fn levels(&self) -> Result<Vec<bool>> {
        self.pins
            .iter()
            .map(|pin| {
                let high = pin.is_high()?;
                tracing::trace!("Threshold pin {} reads {}", pin.number(), high);
                Ok(high)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn supply_dir(root: &Path, name: &str, kind: &str, attrs: &[(&str, &str)]) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("type"), kind).unwrap();
        for (attr, value) in attrs {
            fs::write(dir.join(attr), value).unwrap();
        }
        dir
    }

    #[test]
    fn test_reads_capacity_and_charger() {
        let root = TempDir::new().unwrap();
        let battery = supply_dir(
            root.path(),
            "axp20x-battery",
            "Battery",
            &[("present", "1\n"), ("capacity", "57\n"), ("status", "Discharging\n")],
        );
        let charger = supply_dir(root.path(), "axp20x-ac", "Mains", &[("online", "0\n")]);

        let supply = SysfsPowerSupply::new(PowerSupplyPaths { battery, charger });
        assert!(supply.battery_exists().unwrap());
        assert_eq!(supply.battery_percent().unwrap(), Some(57));
        assert!(!supply.charger_present().unwrap());
    }

    #[test]
    fn test_absent_battery_has_no_percent() {
        let root = TempDir::new().unwrap();
        let battery = supply_dir(
            root.path(),
            "axp20x-battery",
            "Battery",
            &[("present", "0\n"), ("capacity", "0\n")],
        );
        let charger = supply_dir(root.path(), "axp20x-ac", "Mains", &[("online", "1\n")]);

        let supply = SysfsPowerSupply::new(PowerSupplyPaths { battery, charger });
        assert!(!supply.battery_exists().unwrap());
        assert_eq!(supply.battery_percent().unwrap(), None);
        assert!(supply.charger_present().unwrap());
    }

    #[test]
    fn test_uncalibrated_gauge_reports_none() {
        let root = TempDir::new().unwrap();
        let battery = supply_dir(
            root.path(),
            "axp20x-battery",
            "Battery",
            &[("present", "1\n"), ("capacity", "-1\n")],
        );

        let supply = SysfsPowerSupply::new(PowerSupplyPaths {
            battery,
            charger: root.path().join("missing"),
        });
        assert_eq!(supply.battery_percent().unwrap(), None);
    }

    #[test]
    fn test_detects_supplies_by_type() {
        let root = TempDir::new().unwrap();
        let battery = supply_dir(root.path(), "bat0", "Battery", &[("capacity", "90")]);
        let charger = supply_dir(root.path(), "ac-in", "Mains", &[("online", "1")]);

        let supply = SysfsPowerSupply::detect(
            PowerSupplyPaths {
                battery: root.path().join("nope-bat"),
                charger: root.path().join("nope-ac"),
            },
            root.path(),
        )
        .unwrap();

        assert_eq!(supply.paths().battery, battery);
        assert_eq!(supply.paths().charger, charger);
        assert!(supply.is_present());
    }

    #[test]
    fn test_missing_capacity_is_an_error() {
        let root = TempDir::new().unwrap();
        let battery = supply_dir(root.path(), "axp20x-battery", "Battery", &[("present", "1")]);

        let supply = SysfsPowerSupply::new(PowerSupplyPaths {
            battery,
            charger: root.path().join("missing"),
        });
        assert!(supply.battery_percent().is_err());
    }
}
