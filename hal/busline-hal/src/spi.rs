//! SPI peripheral abstractions
//!
//! Register-level view of one SPI peripheral as the transaction engine
//! drives it: configuration, DMA request enables, status flags and the
//! data register. Frame movement during a transfer is done by DMA; the
//! data register accessors are only used for single-frame exchanges.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// SPI peripheral in master mode
pub trait SpiPeripheral {
    /// Apply a full configuration and enable the peripheral
    fn configure(&mut self, config: &SpiConfig);

    /// Change the clock prescaler without touching the rest of the setup
    fn set_baud_rate(&mut self, rate: BaudRate);

    /// Select the data line direction in bidirectional half-duplex mode
    ///
    /// `true` drives the line (transmit), `false` releases it (receive).
    fn set_bidi_output(&mut self, output: bool);

    /// Enable or disable the RX and TX DMA requests
    ///
    /// Enabling the TX request starts clocking once the TX channel is armed,
    /// so channels must be configured and enabled before calling this.
    fn set_dma_requests(&mut self, rx: bool, tx: bool);

    /// Enable or disable the error interrupt (overrun, mode fault, CRC)
    fn set_error_interrupt(&mut self, enabled: bool);

    /// Snapshot of the status register
    fn flags(&self) -> SpiFlags;

    /// Clear the error flags set in `flags`
    fn clear_errors(&mut self, flags: SpiFlags);

    /// Reset the hardware CRC calculation
    ///
    /// Only called between transfers, with DMA requests disabled.
    /// Implementations may stop the peripheral around the reset.
    fn reset_crc(&mut self);

    /// Write one frame to the data register
    fn write_data(&mut self, frame: u16);

    /// Read one frame from the data register
    fn read_data(&mut self) -> u16;

    /// Bus address of the data register, for DMA peripheral addressing
    fn data_register(&self) -> u32;
}

/// Status register snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpiFlags {
    /// Transmit buffer empty (TXE)
    pub tx_empty: bool,
    /// Receive buffer not empty (RXNE)
    pub rx_not_empty: bool,
    /// Peripheral busy (BSY)
    pub busy: bool,
    /// Overrun (OVR)
    pub overrun: bool,
    /// Master mode fault (MODF)
    pub mode_fault: bool,
    /// Hardware CRC mismatch (CRCERR)
    pub crc_error: bool,
}

impl SpiFlags {
    /// Check if any error flag is set
    pub fn has_error(&self) -> bool {
        self.overrun || self.mode_fault || self.crc_error
    }
}

/// SPI configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpiConfig {
    /// Clock prescaler
    pub baud_rate: BaudRate,
    /// Clock polarity and phase
    pub mode: Mode,
    /// Frame size
    pub frame_size: FrameSize,
    /// Bit order within a frame
    pub bit_order: BitOrder,
    /// Line configuration
    pub duplex: Duplex,
    /// Hardware CRC polynomial, `None` leaves the CRC unit disabled
    pub crc_polynomial: Option<u16>,
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            baud_rate: BaudRate::Div8,
            mode: Mode::Mode0,
            frame_size: FrameSize::Bits8,
            bit_order: BitOrder::MsbFirst,
            duplex: Duplex::Full,
            crc_polynomial: None,
        }
    }
}

/// Peripheral clock prescaler (SPI_CR1.BR)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BaudRate {
    /// f_pclk / 2
    Div2,
    /// f_pclk / 4
    Div4,
    /// f_pclk / 8
    Div8,
    /// f_pclk / 16
    Div16,
    /// f_pclk / 32
    Div32,
    /// f_pclk / 64
    Div64,
    /// f_pclk / 128
    Div128,
    /// f_pclk / 256
    Div256,
}

impl BaudRate {
    /// Value of the BR field
    pub fn bits(self) -> u8 {
        self as u8
    }

    /// Resulting SPI clock for a given peripheral clock
    pub fn frequency(self, pclk_hz: u32) -> u32 {
        pclk_hz >> (self.bits() + 1)
    }
}

/// SPI clock polarity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Polarity {
    /// Clock idles low (CPOL=0)
    IdleLow,
    /// Clock idles high (CPOL=1)
    IdleHigh,
}

/// SPI clock phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Phase {
    /// Data captured on first clock transition (CPHA=0)
    CaptureOnFirstTransition,
    /// Data captured on second clock transition (CPHA=1)
    CaptureOnSecondTransition,
}

/// SPI mode (combined polarity and phase)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Mode {
    /// Mode 0: CPOL=0, CPHA=0
    Mode0,
    /// Mode 1: CPOL=0, CPHA=1
    Mode1,
    /// Mode 2: CPOL=1, CPHA=0
    Mode2,
    /// Mode 3: CPOL=1, CPHA=1
    Mode3,
}

impl From<Mode> for (Polarity, Phase) {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Mode0 => (Polarity::IdleLow, Phase::CaptureOnFirstTransition),
            Mode::Mode1 => (Polarity::IdleLow, Phase::CaptureOnSecondTransition),
            Mode::Mode2 => (Polarity::IdleHigh, Phase::CaptureOnFirstTransition),
            Mode::Mode3 => (Polarity::IdleHigh, Phase::CaptureOnSecondTransition),
        }
    }
}

/// Data frame size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FrameSize {
    /// 8-bit frames
    Bits8,
    /// 16-bit frames
    Bits16,
}

impl FrameSize {
    /// Bytes per frame
    pub fn bytes(self) -> usize {
        match self {
            FrameSize::Bits8 => 1,
            FrameSize::Bits16 => 2,
        }
    }
}

/// Bit order within a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BitOrder {
    /// Most significant bit first
    MsbFirst,
    /// Least significant bit first
    LsbFirst,
}

/// Line configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Duplex {
    /// Two unidirectional lines (MOSI and MISO)
    Full,
    /// Two lines, receive only (RXONLY)
    HalfRxOnly,
    /// Single line wired for transmit only
    HalfTxOnly,
    /// Single bidirectional line, direction switched per message (BIDIMODE)
    HalfBidirectional,
}

impl Duplex {
    /// Whether frames can be received in this configuration
    pub fn can_receive(self) -> bool {
        !matches!(self, Duplex::HalfTxOnly)
    }

    /// Whether frames can be transmitted in this configuration
    pub fn can_transmit(self) -> bool {
        !matches!(self, Duplex::HalfRxOnly)
    }

    /// Whether simultaneous transmit and receive is possible
    pub fn is_full(self) -> bool {
        matches!(self, Duplex::Full)
    }
}
