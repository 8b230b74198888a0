//! Poll-counting timeout
//!
//! For targets without a timer, [`PollTimeout`] approximates milliseconds
//! by counting calls to `expired`. Host tests use it too, since it is
//! deterministic.

use busline_hal::timeout::Timeout;

/// Timeout measured in poll iterations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTimeout {
    polls_per_ms: u32,
    remaining: u32,
    armed: bool,
}

impl PollTimeout {
    /// Create a timeout allowing `polls_per_ms` polls per millisecond
    pub const fn new(polls_per_ms: u32) -> Self {
        Self {
            polls_per_ms,
            remaining: 0,
            armed: false,
        }
    }

    /// Check whether a poll loop is currently bracketed
    pub fn is_armed(&self) -> bool {
        self.armed
    }
}

impl Timeout for PollTimeout {
    fn begin(&mut self, ms: u32) {
        self.remaining = ms.saturating_mul(self.polls_per_ms);
        self.armed = true;
    }

    fn expired(&mut self) -> bool {
        if !self.armed {
            return false;
        }
        if self.remaining == 0 {
            return true;
        }
        self.remaining -= 1;
        false
    }

    fn end(&mut self) {
        self.armed = false;
    }
}
