//! Transfer messages

use core::ptr;

use busline_hal::spi::{Duplex, FrameSize};

use crate::error::{Error, Result};

/// Data direction of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Receive only; the bus clocks out filler frames
    Read,
    /// Transmit only; received frames are discarded
    Write,
    /// Transmit and receive the same number of frames
    ReadWrite,
}

/// One DMA block of a transfer
///
/// A message records raw buffer addresses for the DMA controller. It does
/// not borrow the buffers: whoever passes it to
/// [`SpiTransport::transfer`](super::SpiTransport::transfer) guarantees
/// they outlive the transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiMessage {
    direction: Direction,
    tx: *const u8,
    tx_len: usize,
    rx: *mut u8,
    rx_len: usize,
    callback: bool,
    sender: u32,
}

// SAFETY: the pointers are only dereferenced by the DMA controller (or
// its simulation) during a transfer, under the contract of `transfer`.
unsafe impl Send for SpiMessage {}

impl SpiMessage {
    /// Transmit `data`
    pub fn write(data: &[u8]) -> Self {
        Self {
            direction: Direction::Write,
            tx: data.as_ptr(),
            tx_len: data.len(),
            rx: ptr::null_mut(),
            rx_len: 0,
            callback: false,
            sender: 0,
        }
    }

    /// Receive into `buf`
    pub fn read(buf: &mut [u8]) -> Self {
        Self {
            direction: Direction::Read,
            tx: ptr::null(),
            tx_len: 0,
            rx: buf.as_mut_ptr(),
            rx_len: buf.len(),
            callback: false,
            sender: 0,
        }
    }

    /// Transmit `tx` while receiving into `rx`
    pub fn read_write(tx: &[u8], rx: &mut [u8]) -> Self {
        Self {
            direction: Direction::ReadWrite,
            tx: tx.as_ptr(),
            tx_len: tx.len(),
            rx: rx.as_mut_ptr(),
            rx_len: rx.len(),
            callback: false,
            sender: 0,
        }
    }

    /// Request a [`message_complete`](super::TransferListener::message_complete)
    /// notification when this message finishes
    pub fn with_callback(mut self) -> Self {
        self.callback = true;
        self
    }

    /// Attach an adapter-defined tag, passed back in notifications
    pub fn with_sender(mut self, sender: u32) -> Self {
        self.sender = sender;
        self
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        match self.direction {
            Direction::Write => self.tx_len,
            Direction::Read | Direction::ReadWrite => self.rx_len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_callback(&self) -> bool {
        self.callback
    }

    pub fn sender(&self) -> u32 {
        self.sender
    }

    pub(crate) fn tx_ptr(&self) -> *const u8 {
        self.tx
    }

    pub(crate) fn rx_ptr(&self) -> *mut u8 {
        self.rx
    }

    /// Number of frames for the given frame size
    pub(crate) fn frames(&self, frame_size: FrameSize) -> usize {
        self.len() / frame_size.bytes()
    }

    /// Check the message against the bus configuration
    pub(crate) fn validate(&self, duplex: Duplex, frame_size: FrameSize) -> Result<()> {
        let len = self.len();
        if len == 0 || len % frame_size.bytes() != 0 {
            return Err(Error::InvalidMessage);
        }
        if self.frames(frame_size) > usize::from(u16::MAX) {
            return Err(Error::InvalidMessage);
        }
        let allowed = match self.direction {
            Direction::Read => duplex.can_receive(),
            Direction::Write => duplex.can_transmit(),
            Direction::ReadWrite => duplex.is_full() && self.tx_len == self.rx_len,
        };
        if allowed {
            Ok(())
        } else {
            Err(Error::InvalidMessage)
        }
    }
}
