//! Status LED
//!
//! The HAT status LED sits on PA6 and is wired active-low: driving the pin low
//! lights it.

use crate::Result;
use crate::gpio::OutputPin;

/// A physical indicator LED
pub trait LedIndicator: Send {
    /// Switch the LED on or off
    fn set_on(&mut self, on: bool) -> Result<()>;
}

/// LED driven by a single GPIO output
pub struct GpioLed {
    pin: Box<dyn OutputPin>,
    active_low: bool,
}

impl GpioLed {
    /// LED that lights when the pin is driven high
    pub fn active_high(pin: Box<dyn OutputPin>) -> Self {
        Self {
            pin,
            active_low: false,
        }
    }

    /// LED that lights when the pin is driven low
    pub fn active_low(pin: Box<dyn OutputPin>) -> Self {
        Self {
            pin,
            active_low: true,
        }
    }
}

impl LedIndicator for GpioLed {
    fn set_on(&mut self, on: bool) -> Result<()> {
        self.pin.set_high(on != self.active_low)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockOutputPin, MockState};
    use std::sync::{Arc, RwLock};

    #[test]
    fn test_active_low_inverts_level() {
        let state = Arc::new(RwLock::new(MockState::new()));
        let mut led = GpioLed::active_low(Box::new(MockOutputPin::new(6, state.clone())));

        led.set_on(true).unwrap();
        assert_eq!(state.read().unwrap().pins.get(&6), Some(&false));

        led.set_on(false).unwrap();
        assert_eq!(state.read().unwrap().pins.get(&6), Some(&true));
    }

    #[test]
    fn test_active_high_follows_level() {
        let state = Arc::new(RwLock::new(MockState::new()));
        let mut led = GpioLed::active_high(Box::new(MockOutputPin::new(12, state.clone())));

        led.set_on(true).unwrap();
        assert_eq!(state.read().unwrap().pins.get(&12), Some(&true));
    }
}
