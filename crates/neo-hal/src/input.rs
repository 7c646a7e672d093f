//! Button input
//!
//! HAT buttons are plain GPIO inputs pulled up on the board, so a pressed
//! button reads low.

use crate::Result;
use crate::gpio::InputPin;
use serde::{Deserialize, Serialize};

/// Physical HAT buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonId {
    Left,
    Middle,
    Right,
}

impl ButtonId {
    /// Get button name
    pub fn name(&self) -> &'static str {
        match self {
            ButtonId::Left => "left",
            ButtonId::Middle => "middle",
            ButtonId::Right => "right",
        }
    }
}

/// Polled button state
pub trait ButtonInput: Send {
    /// Buttons fitted on this board, fixed at construction
    fn buttons(&self) -> Vec<ButtonId>;

    /// Whether the button is currently held down
    fn is_pressed(&self, button: ButtonId) -> Result<bool>;
}

/// Buttons wired to active-low GPIO inputs
pub struct GpioButtons {
    pins: Vec<(ButtonId, Box<dyn InputPin>)>,
}

impl GpioButtons {
    pub fn new(pins: Vec<(ButtonId, Box<dyn InputPin>)>) -> Self {
        Self { pins }
    }
}

impl ButtonInput for GpioButtons {
    fn buttons(&self) -> Vec<ButtonId> {
        self.pins.iter().map(|(id, _)| *id).collect()
    }

    fn is_pressed(&self, button: ButtonId) -> Result<bool> {
        match self.pins.iter().find(|(id, _)| *id == button) {
            Some((_, pin)) => Ok(!pin.is_high()?),
            None => Ok(false),
        }
    }
}
