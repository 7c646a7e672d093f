//! HAT revision profiles
//!
//! Each hardware revision is described by data: pin numbers, how the battery
//! is sensed, how many buttons exist and what they do, and which shutdown
//! policy applies. Pin numbers use sysfs numbering (PA1 = 1, PA6 = 6,
//! PG6..PG9 = 198..201).

use neo_hal::ButtonId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::ConfigError;

/// HAT hardware revisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Revision {
    /// No HAT fitted; the daemon has nothing to do
    #[default]
    None,
    /// Original NEO board: four voltage comparators, LED only
    Neo2017,
    /// 100 unit run: four voltage comparators, 3.0 V line cuts power
    Q1Y2018,
    /// AXP209 + OLED, three buttons
    Q3Y2018,
    /// AXP209 + OLED (Anker), two buttons and the AXP interrupt line
    Q4Y2018,
}

impl Revision {
    /// Get config name
    pub fn as_str(&self) -> &'static str {
        match self {
            Revision::None => "none",
            Revision::Neo2017 => "neo2017",
            Revision::Q1Y2018 => "q1y2018",
            Revision::Q3Y2018 => "q3y2018",
            Revision::Q4Y2018 => "q4y2018",
        }
    }

    /// All revisions with hardware
    pub fn all() -> &'static [Revision] {
        &[
            Revision::Neo2017,
            Revision::Q1Y2018,
            Revision::Q3Y2018,
            Revision::Q4Y2018,
        ]
    }
}

/// How the battery level is sensed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SensorProfile {
    /// Comparator pins, lowest threshold first
    Ladder { pins: Vec<u32>, volts: Vec<f32> },
    /// Fuel gauge exposed as a sysfs power supply
    FuelGauge {
        battery_path: String,
        charger_path: String,
    },
}

/// What a button does when pressed on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonRole {
    /// Forward / cancel
    Primary,
    /// Backward / enter
    Secondary,
    /// Blank the display
    PowerOff,
}

/// A button wired to a pin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonPin {
    pub id: ButtonId,
    pub pin: u32,
    pub role: ButtonRole,
}

/// How a low battery turns into a shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownPolicy {
    /// Arm a timed countdown at the warning level
    Countdown,
    /// Require N consecutive low readings
    Confirmation,
}

/// Complete HAT profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HatProfile {
    pub revision: Revision,
    pub name: String,
    /// Status LED pin (active-low); also used to probe for the HAT
    pub led_pin: u32,
    pub sensor: SensorProfile,
    /// LED blinks per band, lowest band first; 0 means solid
    pub led_blinks: Vec<u8>,
    /// Percentages a battery must be above for Low, Medium and Full
    #[serde(default = "default_percent_thresholds")]
    pub percent_thresholds: Vec<u8>,
    #[serde(default)]
    pub buttons: Vec<ButtonPin>,
    /// Pins whose falling edge means power is about to be cut
    #[serde(default)]
    pub critical_pins: Vec<u32>,
    pub shutdown_policy: ShutdownPolicy,
    #[serde(default)]
    pub has_display: bool,
}

fn default_percent_thresholds() -> Vec<u8> {
    // Parity with the 3.45 V / 3.71 V / 3.84 V comparators
    vec![3, 33, 63]
}

impl HatProfile {
    /// Built-in profile for a revision (`None` has no profile)
    pub fn for_revision(revision: Revision) -> Option<Self> {
        match revision {
            Revision::None => None,
            Revision::Neo2017 => Some(Self::neo2017()),
            Revision::Q1Y2018 => Some(Self::q1y2018()),
            Revision::Q3Y2018 => Some(Self::q3y2018()),
            Revision::Q4Y2018 => Some(Self::q4y2018()),
        }
    }

    /// Original NEO board
    pub fn neo2017() -> Self {
        Self {
            revision: Revision::Neo2017,
            name: "NEO HAT 2017".to_string(),
            led_pin: 6,
            sensor: SensorProfile::Ladder {
                pins: vec![198, 199, 200, 201],
                volts: vec![3.0, 3.2, 3.4, 3.6],
            },
            led_blinks: vec![4, 2, 1, 0],
            percent_thresholds: default_percent_thresholds(),
            buttons: vec![],
            critical_pins: vec![],
            shutdown_policy: ShutdownPolicy::Confirmation,
            has_display: false,
        }
    }

    /// Q1Y2018 100 unit run
    pub fn q1y2018() -> Self {
        Self {
            revision: Revision::Q1Y2018,
            name: "NEO HAT Q1Y2018".to_string(),
            led_pin: 6,
            sensor: SensorProfile::Ladder {
                pins: vec![198, 199, 200, 201],
                volts: vec![3.0, 3.45, 3.71, 3.84],
            },
            led_blinks: vec![3, 2, 1, 0],
            percent_thresholds: default_percent_thresholds(),
            buttons: vec![],
            // The board cuts the 5 V rail 8 s after the 3.0 V line drops
            critical_pins: vec![198],
            shutdown_policy: ShutdownPolicy::Confirmation,
            has_display: false,
        }
    }

    /// Q3Y2018 AXP209 + OLED
    pub fn q3y2018() -> Self {
        Self {
            revision: Revision::Q3Y2018,
            name: "NEO HAT Q3Y2018".to_string(),
            led_pin: 6,
            sensor: axp209_sensor(),
            led_blinks: vec![3, 2, 1, 0],
            percent_thresholds: default_percent_thresholds(),
            buttons: vec![
                ButtonPin {
                    id: ButtonId::Left,
                    pin: 1,
                    role: ButtonRole::Primary,
                },
                ButtonPin {
                    id: ButtonId::Middle,
                    pin: 199,
                    role: ButtonRole::Secondary,
                },
                ButtonPin {
                    id: ButtonId::Right,
                    pin: 200,
                    role: ButtonRole::PowerOff,
                },
            ],
            critical_pins: vec![],
            shutdown_policy: ShutdownPolicy::Countdown,
            has_display: true,
        }
    }

    /// Q4Y2018 AXP209 + OLED (Anker)
    pub fn q4y2018() -> Self {
        Self {
            revision: Revision::Q4Y2018,
            name: "NEO HAT Q4Y2018".to_string(),
            led_pin: 6,
            sensor: axp209_sensor(),
            led_blinks: vec![3, 2, 1, 0],
            percent_thresholds: default_percent_thresholds(),
            buttons: vec![
                ButtonPin {
                    id: ButtonId::Left,
                    pin: 198,
                    role: ButtonRole::Primary,
                },
                ButtonPin {
                    id: ButtonId::Right,
                    pin: 199,
                    role: ButtonRole::Secondary,
                },
            ],
            // AXP209 IRQ line: only the LEVEL2 and N_OE sources are enabled
            critical_pins: vec![200],
            shutdown_policy: ShutdownPolicy::Countdown,
            has_display: true,
        }
    }

    /// Pin of the button with the given role
    pub fn button_for(&self, role: ButtonRole) -> Option<&ButtonPin> {
        self.buttons.iter().find(|b| b.role == role)
    }

    /// Check internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.led_blinks.len() != 4 {
            return Err(ConfigError::Invalid(format!(
                "{}: led_blinks needs one entry per band (4), got {}",
                self.name,
                self.led_blinks.len()
            )));
        }
        if self.percent_thresholds.len() != 3
            || !self.percent_thresholds.windows(2).all(|w| w[0] < w[1])
        {
            return Err(ConfigError::Invalid(format!(
                "{}: percent_thresholds must be 3 increasing values",
                self.name
            )));
        }
        if let SensorProfile::Ladder { pins, .. } = &self.sensor
            && pins.len() != 4
        {
            return Err(ConfigError::Invalid(format!(
                "{}: ladder needs 4 threshold pins, got {}",
                self.name,
                pins.len()
            )));
        }
        let has_primary = self.button_for(ButtonRole::Primary).is_some();
        let has_secondary = self.button_for(ButtonRole::Secondary).is_some();
        if self.has_display && !(has_primary && has_secondary) {
            return Err(ConfigError::Invalid(format!(
                "{}: a display needs primary and secondary buttons",
                self.name
            )));
        }
        Ok(())
    }
}

fn axp209_sensor() -> SensorProfile {
    SensorProfile::FuelGauge {
        battery_path: "/sys/class/power_supply/axp20x-battery".to_string(),
        charger_path: "/sys/class/power_supply/axp20x-ac".to_string(),
    }
}

/// Load HAT profiles: the built-ins plus `<config_dir>/hats/*.toml`
pub fn load_hat_profiles(config_dir: &Path) -> Result<HashMap<Revision, HatProfile>, ConfigError> {
    let profiles_dir = config_dir.join("hats");
    let mut profiles = HashMap::new();

    // Add built-in profiles
    for revision in Revision::all() {
        if let Some(profile) = HatProfile::for_revision(*revision) {
            profiles.insert(*revision, profile);
        }
    }

    // Load custom profiles from directory
    if profiles_dir.exists() {
        for entry in std::fs::read_dir(&profiles_dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.extension().is_some_and(|e| e == "toml") {
                let contents = std::fs::read_to_string(&path)?;
                let profile: HatProfile = toml::from_str(&contents)?;
                profile.validate()?;
                tracing::info!("Loaded HAT profile {} from {}", profile.name, path.display());
                profiles.insert(profile.revision, profile);
            }
        }
    }

    Ok(profiles)
}
