//! NEO HAT runtime state machine
//!
//! Battery classification, LED signalling, low battery shutdown scheduling,
//! display page navigation and button handling, composed by [`HatRuntime`].
//! Hardware access goes through the `neo-hal` traits so everything here runs
//! against mocks in tests.

pub mod battery;
pub mod buttons;
pub mod display;
pub mod led;
pub mod pages;
pub mod runtime;
pub mod shutdown;

pub use battery::{BatteryBand, BatteryMonitor, BatterySensor, PercentTable};
pub use buttons::{ButtonDispatcher, ButtonEvent, ButtonSampler, Command, PressTiming, PressTracker};
pub use display::LogDisplay;
pub use led::{LedPattern, LedSignaler, LedTable};
pub use pages::{AdminAction, DisplayPages, PageContext, PageId, PageNavigator, Stack, StatsPeriod};
pub use runtime::{AdminActions, DisplayUnit, Hardware, HatEvent, HatRuntime, RunExit, RuntimeTiming};
pub use shutdown::{ShutdownLatch, ShutdownScheduler, ShutdownState, ShutdownTransition};

use neo_config::ConfigError;
use neo_hal::HalError;
use thiserror::Error;

/// Runtime errors
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Page stack '{0}' is empty")]
    EmptyStack(&'static str),

    #[error("Invalid table: {0}")]
    InvalidTable(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Hardware error: {0}")]
    Hal(#[from] HalError),
}

pub type Result<T> = std::result::Result<T, CoreError>;
