//! Output pins
//!
//! Chip selects and LCD control lines are plain push-pull outputs set up
//! with embassy-stm32; this wrapper gives them the infallible
//! [`OutputPin`] interface the drivers expect.

use busline_hal::gpio::OutputPin;
use embassy_stm32::gpio::{Level, Output, Pin, Speed};
use embassy_stm32::Peri;

/// embassy-stm32 push-pull output
pub struct Stm32OutputPin<'d> {
    pin: Output<'d>,
}

impl<'d> Stm32OutputPin<'d> {
    /// Configure `pin` as an output driven to `initial`
    pub fn new(pin: Peri<'d, impl Pin>, initial: Level) -> Self {
        Self {
            pin: Output::new(pin, initial, Speed::VeryHigh),
        }
    }

    /// Chip select line, idle high
    pub fn chip_select(pin: Peri<'d, impl Pin>) -> Self {
        Self::new(pin, Level::High)
    }
}

impl From<Output<'_>> for Stm32OutputPin<'_> {
    fn from(pin: Output<'_>) -> Self {
        Self { pin }
    }
}

impl OutputPin for Stm32OutputPin<'_> {
    fn set_high(&mut self) {
        self.pin.set_high();
    }

    fn set_low(&mut self) {
        self.pin.set_low();
    }

    fn is_set_high(&self) -> bool {
        self.pin.is_set_high()
    }
}
