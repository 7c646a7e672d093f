//! Daemon settings
//!
//! Timing constants and admin commands. Every field has a default so an empty
//! `[daemon]` table is valid.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::profiles::{Revision, SensorProfile};

/// Daemon settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonSettings {
    /// Which HAT is fitted
    #[serde(default)]
    pub revision: Revision,

    /// Minimum duration of one main-loop cycle (LED update period)
    #[serde(default = "default_led_cycle_ms")]
    pub led_cycle_ms: u64,

    /// On/off time of one LED blink
    #[serde(default = "default_flash_delay_ms")]
    pub flash_delay_ms: u64,

    /// Battery check period; unset means the revision default
    /// (every cycle on ladder boards, 30 s on fuel-gauge boards)
    #[serde(default)]
    pub battery_check_secs: Option<u64>,

    /// Countdown between the low battery warning and shutdown
    #[serde(default = "default_warning_period_secs")]
    pub warning_period_secs: u64,

    /// Battery percentage at or below which the countdown arms
    #[serde(default = "default_warning_percent")]
    pub warning_percent: u8,

    /// Battery percentage at or below which shutdown is immediate
    #[serde(default = "default_shutdown_percent")]
    pub shutdown_percent: u8,

    /// Consecutive low ladder readings needed before shutting down
    #[serde(default = "default_confirm_iterations")]
    pub confirm_iterations: u32,

    /// Display blanks after this much inactivity
    #[serde(default = "default_display_timeout_secs")]
    pub display_timeout_secs: u64,

    /// How long the splash page stays up after start
    #[serde(default = "default_splash_timeout_secs")]
    pub splash_timeout_secs: u64,

    /// Edges closer together than this on one button are bounces
    #[serde(default = "default_bounce_ms")]
    pub bounce_ms: u64,

    /// Quiet time after a handled press before another is accepted
    #[serde(default = "default_press_cooldown_ms")]
    pub press_cooldown_ms: u64,

    /// Hold time for the dual long press
    #[serde(default = "default_long_press_ms")]
    pub long_press_ms: u64,

    /// Presses shorter than this are noise
    #[serde(default = "default_noise_floor_ms")]
    pub noise_floor_ms: u64,

    /// Button / edge sampling period
    #[serde(default = "default_input_poll_ms")]
    pub input_poll_ms: u64,
}

fn default_led_cycle_ms() -> u64 {
    5000
}

fn default_flash_delay_ms() -> u64 {
    300
}

fn default_warning_period_secs() -> u64 {
    60
}

fn default_warning_percent() -> u8 {
    3
}

fn default_shutdown_percent() -> u8 {
    1
}

fn default_confirm_iterations() -> u32 {
    3
}

fn default_display_timeout_secs() -> u64 {
    20
}

fn default_splash_timeout_secs() -> u64 {
    3
}

fn default_bounce_ms() -> u64 {
    125
}

fn default_press_cooldown_ms() -> u64 {
    250
}

fn default_long_press_ms() -> u64 {
    3000
}

fn default_noise_floor_ms() -> u64 {
    100
}

fn default_input_poll_ms() -> u64 {
    50
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            revision: Revision::default(),
            led_cycle_ms: default_led_cycle_ms(),
            flash_delay_ms: default_flash_delay_ms(),
            battery_check_secs: None,
            warning_period_secs: default_warning_period_secs(),
            warning_percent: default_warning_percent(),
            shutdown_percent: default_shutdown_percent(),
            confirm_iterations: default_confirm_iterations(),
            display_timeout_secs: default_display_timeout_secs(),
            splash_timeout_secs: default_splash_timeout_secs(),
            bounce_ms: default_bounce_ms(),
            press_cooldown_ms: default_press_cooldown_ms(),
            long_press_ms: default_long_press_ms(),
            noise_floor_ms: default_noise_floor_ms(),
            input_poll_ms: default_input_poll_ms(),
        }
    }
}

impl DaemonSettings {
    pub fn led_cycle(&self) -> Duration {
        Duration::from_millis(self.led_cycle_ms)
    }

    pub fn flash_delay(&self) -> Duration {
        Duration::from_millis(self.flash_delay_ms)
    }

    /// Battery check period for the given sensor
    pub fn battery_check_interval(&self, sensor: &SensorProfile) -> Duration {
        let secs = self.battery_check_secs.unwrap_or(match sensor {
            SensorProfile::Ladder { .. } => 0,
            SensorProfile::FuelGauge { .. } => 30,
        });
        Duration::from_secs(secs)
    }

    pub fn warning_period(&self) -> Duration {
        Duration::from_secs(self.warning_period_secs)
    }

    pub fn display_timeout(&self) -> Duration {
        Duration::from_secs(self.display_timeout_secs)
    }

    pub fn splash_timeout(&self) -> Duration {
        Duration::from_secs(self.splash_timeout_secs)
    }

    pub fn bounce(&self) -> Duration {
        Duration::from_millis(self.bounce_ms)
    }

    pub fn press_cooldown(&self) -> Duration {
        Duration::from_millis(self.press_cooldown_ms)
    }

    pub fn long_press(&self) -> Duration {
        Duration::from_millis(self.long_press_ms)
    }

    pub fn noise_floor(&self) -> Duration {
        Duration::from_millis(self.noise_floor_ms)
    }

    pub fn input_poll(&self) -> Duration {
        Duration::from_millis(self.input_poll_ms.max(1))
    }

    /// Every configured period, by field name
    pub fn periods(&self) -> Vec<(&'static str, Duration)> {
        let mut periods = vec![
            ("led_cycle_ms", self.led_cycle()),
            ("flash_delay_ms", self.flash_delay()),
            ("warning_period_secs", self.warning_period()),
            ("display_timeout_secs", self.display_timeout()),
            ("splash_timeout_secs", self.splash_timeout()),
            ("bounce_ms", self.bounce()),
            ("press_cooldown_ms", self.press_cooldown()),
            ("long_press_ms", self.long_press()),
            ("noise_floor_ms", self.noise_floor()),
            ("input_poll_ms", self.input_poll()),
        ];
        if let Some(secs) = self.battery_check_secs {
            periods.push(("battery_check_secs", Duration::from_secs(secs)));
        }
        periods
    }
}

/// External commands run for admin-stack actions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Action name (`copy_from_usb`, `erase_folder`) to command line
    #[serde(default)]
    pub commands: HashMap<String, Vec<String>>,

    /// A command still running after this long is killed and counts as failed
    #[serde(default = "default_admin_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_admin_timeout_secs() -> u64 {
    600
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            commands: HashMap::new(),
            timeout_secs: default_admin_timeout_secs(),
        }
    }
}

impl AdminConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Command line for an action, if configured
    pub fn command_for(&self, action: &str) -> Option<&[String]> {
        self.commands
            .get(action)
            .map(Vec::as_slice)
            .filter(|argv| !argv.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = DaemonSettings::default();
        assert_eq!(settings.led_cycle(), Duration::from_secs(5));
        assert_eq!(settings.flash_delay(), Duration::from_millis(300));
        assert_eq!(settings.warning_period(), Duration::from_secs(60));
        assert_eq!(settings.display_timeout(), Duration::from_secs(20));
        assert_eq!(settings.long_press(), Duration::from_secs(3));
        assert_eq!(settings.confirm_iterations, 3);
        assert_eq!(settings.revision, Revision::None);
    }

    #[test]
    fn test_battery_check_interval_per_sensor() {
        let settings = DaemonSettings::default();
        let ladder = SensorProfile::Ladder {
            pins: vec![1, 2, 3, 4],
            volts: vec![3.0, 3.2, 3.4, 3.6],
        };
        let gauge = SensorProfile::FuelGauge {
            battery_path: String::new(),
            charger_path: String::new(),
        };

        assert_eq!(settings.battery_check_interval(&ladder), Duration::ZERO);
        assert_eq!(settings.battery_check_interval(&gauge), Duration::from_secs(30));

        let settings = DaemonSettings {
            battery_check_secs: Some(10),
            ..DaemonSettings::default()
        };
        assert_eq!(settings.battery_check_interval(&gauge), Duration::from_secs(10));
    }

    #[test]
    fn test_input_poll_never_zero() {
        let settings = DaemonSettings {
            input_poll_ms: 0,
            ..DaemonSettings::default()
        };
        assert_eq!(settings.input_poll(), Duration::from_millis(1));
    }

    #[test]
    fn test_admin_command_lookup() {
        let mut admin = AdminConfig::default();
        admin.commands.insert(
            "erase_folder".into(),
            vec!["/usr/local/bin/erase".into(), "/media/usb0".into()],
        );
        admin.commands.insert("copy_from_usb".into(), vec![]);

        assert_eq!(admin.command_for("erase_folder").unwrap().len(), 2);
        assert!(admin.command_for("copy_from_usb").is_none());
        assert!(admin.command_for("exit").is_none());
        assert_eq!(admin.timeout(), Duration::from_secs(600));
    }

    #[test]
    fn test_admin_timeout_from_toml() {
        let admin: AdminConfig = toml::from_str("timeout_secs = 30").unwrap();
        assert_eq!(admin.timeout(), Duration::from_secs(30));
        assert!(admin.commands.is_empty());
    }
}
