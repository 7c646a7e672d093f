//! Hardware Abstraction Layer (HAL)
//!
//! This crate provides the hardware collaborators used by the NEO HAT daemon,
//! so the runtime state machine can be written against small traits and run
//! unchanged on real boards, on a desktop, or inside tests.
//!
//! # Supported Hardware
//!
//! - NEO 2017 / Q1Y2018 boards: resistor-ladder voltage threshold pins
//! - Q3Y2018 / Q4Y2018 boards: AXP209 power chip (exposed through the
//!   `axp20x` kernel driver as a sysfs power supply) plus buttons and OLED
//!
//! # Example
//!
//! ```no_run
//! use neo_hal::{Direction, LedIndicator, GpioLed, SysfsGpio};
//!
//! fn main() -> neo_hal::Result<()> {
//!     let gpio = SysfsGpio::new();
//!     let pin = gpio.setup(6, Direction::Out)?;
//!     let mut led = GpioLed::active_low(Box::new(pin));
//!     led.set_on(true)?;
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod edge;
pub mod gpio;
pub mod input;
pub mod led;
pub mod mock;
pub mod power;
pub mod shutdown;

pub use clock::{Clock, SystemClock};
pub use edge::FallingEdgeWatcher;
pub use gpio::{Direction, InputPin, OutputPin, SysfsGpio, SysfsPin};
pub use input::{ButtonId, ButtonInput, GpioButtons};
pub use led::{GpioLed, LedIndicator};
pub use power::{GpioLadder, PowerSource, PowerSupplyPaths, SysfsPowerSupply, ThresholdLadder};
pub use shutdown::{ShutdownTrigger, SystemShutdown};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HalError {
    #[error("GPIO pin {pin} setup failed: {reason}")]
    PinSetup { pin: u32, reason: String },

    #[error("GPIO pin {pin} I/O failed: {source}")]
    PinIo {
        pin: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported hardware: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// HAL Result type
pub type Result<T> = std::result::Result<T, HalError>;
