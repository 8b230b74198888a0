//! Engine error type

/// Errors reported by the bus engine and the device adapters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Bus, DMA channel or adapter already in use; retry later
    Busy,
    /// Argument rejected before any hardware was touched
    InvalidArgument,
    /// Message incompatible with the bus configuration
    InvalidMessage,
    /// Hardware-reported failure (DMA error, overrun, mode fault)
    Io,
    /// Checksum mismatch
    Crc,
    /// A bounded poll loop ran out of budget
    Timeout,
}

/// Result type for engine and adapter operations
pub type Result<T> = core::result::Result<T, Error>;
