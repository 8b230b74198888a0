//! Caller-supplied timeouts
//!
//! Poll loops that wait on an external device (SD card busy and data
//! tokens) are bracketed by `begin`/`end`, and `expired` is checked once per
//! iteration. The engine itself has no notion of time.

/// Timeout source for bounded poll loops
pub trait Timeout {
    /// Arm the timeout for `ms` milliseconds
    fn begin(&mut self, ms: u32);

    /// Check whether the armed timeout has elapsed
    fn expired(&mut self) -> bool;

    /// Disarm the timeout
    fn end(&mut self) {}
}

impl<T: Timeout + ?Sized> Timeout for &mut T {
    fn begin(&mut self, ms: u32) {
        (**self).begin(ms)
    }

    fn expired(&mut self) -> bool {
        (**self).expired()
    }

    fn end(&mut self) {
        (**self).end()
    }
}
