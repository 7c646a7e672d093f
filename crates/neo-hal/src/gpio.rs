//! GPIO access
//!
//! Drives pins through the legacy Linux sysfs interface (`/sys/class/gpio`),
//! which is what the H3 kernels shipped on NEO boards expose. Pin numbers are
//! sysfs numbers (PA6 = 6, PG6 = 198, ...).

use crate::{HalError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default sysfs GPIO root
pub const GPIO_SYSFS_ROOT: &str = "/sys/class/gpio";

/// Pin direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    /// Get sysfs name
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

/// A pin whose level can be read
pub trait InputPin: Send {
    /// Pin number (for logging)
    fn number(&self) -> u32;

    /// Read the current level
    fn is_high(&self) -> Result<bool>;
}

/// A pin whose level can be driven
pub trait OutputPin: Send {
    /// Pin number (for logging)
    fn number(&self) -> u32;

    /// Drive the pin high or low
    fn set_high(&self, high: bool) -> Result<()>;
}

/// Sysfs GPIO controller
#[derive(Debug, Clone)]
pub struct SysfsGpio {
    root: PathBuf,
}

impl SysfsGpio {
    /// Create a controller on the default sysfs root
    pub fn new() -> Self {
        Self::with_root(GPIO_SYSFS_ROOT)
    }

    /// Create a controller on a custom root (used by tests)
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Check whether the sysfs GPIO interface is available at all
    pub fn is_available(&self) -> bool {
        self.root.join("export").exists()
    }

    /// Export a pin (if needed) and configure its direction
    pub fn setup(&self, pin: u32, direction: Direction) -> Result<SysfsPin> {
        let export = self.root.join("export");
        if !export.exists() {
            return Err(HalError::PinSetup {
                pin,
                reason: format!(
                    "unable to find GPIO export file {}, is GPIO_SYSFS active?",
                    export.display()
                ),
            });
        }

        let pin_dir = self.root.join(format!("gpio{}", pin));
        if !pin_dir.exists() {
            fs::write(&export, pin.to_string()).map_err(|e| HalError::PinSetup {
                pin,
                reason: format!("export failed: {}", e),
            })?;
            tracing::info!("Completed export of GPIO pin {}", pin);
        }

        fs::write(pin_dir.join("direction"), direction.as_str()).map_err(|e| {
            HalError::PinSetup {
                pin,
                reason: format!("setting direction {} failed: {}", direction.as_str(), e),
            }
        })?;
        tracing::debug!("GPIO pin {} configured as {}", pin, direction.as_str());

        Ok(SysfsPin {
            number: pin,
            value_path: pin_dir.join("value"),
        })
    }
}

impl Default for SysfsGpio {
    fn default() -> Self {
        Self::new()
    }
}

/// An exported sysfs pin
#[derive(Debug, Clone)]
pub struct SysfsPin {
    number: u32,
    value_path: PathBuf,
}

impl SysfsPin {
    /// Path of the `value` attribute
    pub fn value_path(&self) -> &Path {
        &self.value_path
    }
}

impl InputPin for SysfsPin {
    fn number(&self) -> u32 {
        self.number
    }

    fn is_high(&self) -> Result<bool> {
        let raw = fs::read_to_string(&self.value_path).map_err(|source| HalError::PinIo {
            pin: self.number,
            source,
        })?;
        Ok(raw.trim_start().starts_with('1'))
    }
}

impl OutputPin for SysfsPin {
    fn number(&self) -> u32 {
        self.number
    }

    fn set_high(&self, high: bool) -> Result<()> {
        fs::write(&self.value_path, if high { "1" } else { "0" }).map_err(|source| {
            HalError::PinIo {
                pin: self.number,
                source,
            }
        })
    }
}
