//! Timeouts backed by the embassy time driver

use busline_hal::timeout::Timeout;
use embassy_time::{Duration, Instant};

/// Wall-clock timeout for SD card poll loops
#[derive(Debug, Clone, Copy, Default)]
pub struct InstantTimeout {
    deadline: Option<Instant>,
}

impl InstantTimeout {
    pub const fn new() -> Self {
        Self { deadline: None }
    }
}

impl Timeout for InstantTimeout {
    fn begin(&mut self, ms: u32) {
        self.deadline = Some(Instant::now() + Duration::from_millis(u64::from(ms)));
    }

    fn expired(&mut self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    fn end(&mut self) {
        self.deadline = None;
    }
}
