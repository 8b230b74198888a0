//! Simulated delays

use embedded_hal::delay::DelayNs;

/// Delay that returns immediately and accumulates the requested time
#[derive(Debug, Default)]
pub struct SimDelay {
    /// Total requested delay in nanoseconds
    pub elapsed_ns: u64,
}

impl SimDelay {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns += u64::from(ns);
    }
}
