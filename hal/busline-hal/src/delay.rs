//! Blocking delays
//!
//! Reset pulses and power-up waits use the embedded-hal delay trait
//! directly; every supported platform already provides an implementation.

pub use embedded_hal::delay::DelayNs;
