//! SPI slave models

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Device on the simulated bus
pub trait SpiSlave {
    /// Shift one byte in and one byte out
    fn exchange(&mut self, mosi: u8) -> u8;

    /// Chip select changed
    fn select(&mut self, _selected: bool) {}
}

impl<S: SpiSlave + ?Sized> SpiSlave for Rc<RefCell<S>> {
    fn exchange(&mut self, mosi: u8) -> u8 {
        self.borrow_mut().exchange(mosi)
    }

    fn select(&mut self, selected: bool) {
        self.borrow_mut().select(selected)
    }
}

/// Records received bytes and replies from a queue (0xFF when empty)
#[derive(Debug, Default)]
pub struct Recorder {
    /// Bytes received, in order
    pub received: Vec<u8>,
    /// Bytes to send back, in order
    pub replies: VecDeque<u8>,
    /// Number of select edges seen
    pub selections: u32,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue reply bytes
    pub fn reply(&mut self, bytes: &[u8]) {
        self.replies.extend(bytes.iter().copied());
    }
}

impl SpiSlave for Recorder {
    fn exchange(&mut self, mosi: u8) -> u8 {
        self.received.push(mosi);
        self.replies.pop_front().unwrap_or(0xFF)
    }

    fn select(&mut self, selected: bool) {
        if selected {
            self.selections += 1;
        }
    }
}
