//! SD card error type

use busline_protocol::{CardStatusError, R1Error, RegisterError};

/// Errors reported by the SD/MMC layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Bus or card already in use
    Busy,
    /// Argument rejected before the card was addressed
    InvalidArgument,
    /// Bus-level failure (DMA error, overrun)
    Io,
    /// Command, data or register checksum mismatch
    Crc,
    /// The card did not answer within the configured time
    Timeout,
    /// Operation requires a successful `init_card`
    NotInitialized,
    /// The card answered, but not in a way this driver supports
    UnusableCard,
    /// Data response reported a write error
    Write,
    /// Condition reported by the card
    Card(CardStatusError),
}

impl From<busline_core::Error> for Error {
    fn from(e: busline_core::Error) -> Self {
        use busline_core::Error as Core;
        match e {
            Core::Busy => Error::Busy,
            Core::InvalidArgument | Core::InvalidMessage => Error::InvalidArgument,
            Core::Io => Error::Io,
            Core::Crc => Error::Crc,
            Core::Timeout => Error::Timeout,
        }
    }
}

impl From<R1Error> for Error {
    fn from(e: R1Error) -> Self {
        match e {
            R1Error::CommandCrc => Error::Crc,
            R1Error::Status(status) => Error::Card(status),
        }
    }
}

impl From<CardStatusError> for Error {
    fn from(e: CardStatusError) -> Self {
        Error::Card(e)
    }
}

impl From<RegisterError> for Error {
    fn from(e: RegisterError) -> Self {
        match e {
            RegisterError::Crc => Error::Crc,
            RegisterError::UnsupportedStructure => Error::UnusableCard,
        }
    }
}

/// Result type for SD card operations
pub type Result<T> = core::result::Result<T, Error>;
