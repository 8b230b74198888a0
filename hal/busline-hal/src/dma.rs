//! DMA channel abstractions
//!
//! One DMA channel as the SPI engine programs it: a single
//! peripheral<->memory block move with transfer-complete and
//! transfer-error interrupts. Channel arbitration between buses is not
//! part of this trait; it lives in `busline_core::DmaLocks`, keyed by
//! [`DmaChannel::id`].

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Index of a channel in the shared lock bitmap (0..32)
pub type DmaChannelId = u8;

/// One DMA channel
pub trait DmaChannel {
    /// Lock bitmap index of this channel, unique across the system
    fn id(&self) -> DmaChannelId;

    /// Program the channel; the channel must be disabled
    ///
    /// The caller guarantees `request.memory` stays valid for
    /// `request.count` frames until the channel reports completion or is
    /// disabled.
    fn configure(&mut self, request: &DmaRequest);

    /// Start the programmed transfer
    fn enable(&mut self);

    /// Stop the channel
    fn disable(&mut self);

    /// Interrupt status of this channel
    fn flags(&self) -> DmaFlags;

    /// Clear all interrupt flags of this channel
    fn clear_flags(&mut self);

    /// Frames left to move
    fn remaining(&self) -> u16;

    /// Return the channel to its reset state
    fn deinit(&mut self);
}

/// Transfer description for [`DmaChannel::configure`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaRequest {
    /// Transfer direction
    pub direction: DmaDirection,
    /// Peripheral register address
    pub peripheral: u32,
    /// Memory address
    pub memory: *mut u8,
    /// Number of frames
    pub count: u16,
    /// Advance the memory address after each frame
    pub memory_increment: bool,
    /// Frame width on both sides
    pub width: DmaWidth,
    /// Channel priority
    pub priority: DmaPriority,
    /// Raise an interrupt on transfer complete
    pub tc_interrupt: bool,
    /// Raise an interrupt on transfer error
    pub te_interrupt: bool,
}

/// Transfer direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DmaDirection {
    /// Peripheral data register to memory
    PeripheralToMemory,
    /// Memory to peripheral data register
    MemoryToPeripheral,
}

/// Frame width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DmaWidth {
    /// 8-bit frames
    Byte,
    /// 16-bit frames
    HalfWord,
}

impl DmaWidth {
    /// Bytes per frame
    pub fn bytes(self) -> usize {
        match self {
            DmaWidth::Byte => 1,
            DmaWidth::HalfWord => 2,
        }
    }
}

/// Channel priority (DMA_CCR.PL)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DmaPriority {
    Low,
    Medium,
    High,
    VeryHigh,
}

/// Channel interrupt status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DmaFlags {
    /// Transfer complete (TCIF)
    pub transfer_complete: bool,
    /// Half transfer (HTIF)
    pub half_transfer: bool,
    /// Transfer error (TEIF)
    pub transfer_error: bool,
}

impl DmaFlags {
    /// Check if completion or error is pending
    pub fn is_pending(&self) -> bool {
        self.transfer_complete || self.transfer_error
    }
}
