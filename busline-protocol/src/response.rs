//! Command replies
//!
//! Every reply starts with the R1 byte. Its most significant bit is zero;
//! an idle line reads 0xFF, so the host polls until that bit clears.
//!
//! ```text
//! R1   ┌─┬─────┬──────┬──────────┬───────┬─────────┬───────────┬──────┐
//!      │0│param│addr  │erase seq │com crc│illegal  │erase reset│idle  │
//!      └─┴─────┴──────┴──────────┴───────┴─────────┴───────────┴──────┘
//! R2   R1 + status byte
//! R3   R1 + OCR (4 bytes, big endian)
//! R7   R1 + interface condition echo (4 bytes, big endian)
//! R1b  R1 + busy (zero bytes until the card is ready)
//! ```

/// Reply formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResponseKind {
    R1,
    R1b,
    R2,
    R3,
    R7,
}

impl ResponseKind {
    /// Bytes following the R1 byte
    pub fn trailing_len(self) -> usize {
        match self {
            ResponseKind::R1 | ResponseKind::R1b => 0,
            ResponseKind::R2 => 1,
            ResponseKind::R3 | ResponseKind::R7 => 4,
        }
    }
}

/// Condition reported by the card in a reply or a data error token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CardStatusError {
    /// Argument out of range for the command
    ParameterError,
    /// Misaligned address
    AddressError,
    /// Error in the erase command sequence
    EraseSequenceError,
    /// Command not legal in the current state
    IllegalCommand,
    /// Erase sequence cleared by an out-of-sequence command
    EraseReset,
    /// Card still initializing
    InIdleState,
    /// Address beyond the card capacity
    OutOfRange,
    /// Invalid erase selection
    EraseParameter,
    /// Write to a protected block
    WriteProtectViolation,
    /// Internal ECC failed to correct the data
    EccFailed,
    /// Internal card controller error
    CardControllerError,
    /// Unspecified card error
    Error,
    /// Protected blocks skipped during erase, or lock command failed
    WriteProtectEraseSkip,
    /// Card is locked by the host
    CardLocked,
}

/// Failure decoded from an R1 byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum R1Error {
    /// The card rejected the command CRC
    CommandCrc,
    /// Any other reported condition
    Status(CardStatusError),
}

/// R1 reply byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct R1(pub u8);

impl R1 {
    pub const IDLE: u8 = 1 << 0;
    pub const ERASE_RESET: u8 = 1 << 1;
    pub const ILLEGAL_COMMAND: u8 = 1 << 2;
    pub const COM_CRC_ERROR: u8 = 1 << 3;
    pub const ERASE_SEQUENCE_ERROR: u8 = 1 << 4;
    pub const ADDRESS_ERROR: u8 = 1 << 5;
    pub const PARAMETER_ERROR: u8 = 1 << 6;
    /// Set on an idle line; never set in a reply
    pub const START: u8 = 1 << 7;

    /// Check whether the byte is a reply at all
    pub fn is_response(self) -> bool {
        self.0 & Self::START == 0
    }

    pub fn is_idle(self) -> bool {
        self.0 & Self::IDLE != 0
    }

    pub fn is_illegal_command(self) -> bool {
        self.0 & Self::ILLEGAL_COMMAND != 0
    }

    /// Decode the first reported condition
    ///
    /// Bits are checked from parameter error down to the idle bit. The idle
    /// bit is only an error when `allow_idle` is false.
    pub fn check(self, allow_idle: bool) -> Result<(), R1Error> {
        use CardStatusError::*;

        let checks = [
            (Self::PARAMETER_ERROR, Some(ParameterError)),
            (Self::ADDRESS_ERROR, Some(AddressError)),
            (Self::ERASE_SEQUENCE_ERROR, Some(EraseSequenceError)),
            (Self::COM_CRC_ERROR, None),
            (Self::ILLEGAL_COMMAND, Some(IllegalCommand)),
            (Self::ERASE_RESET, Some(EraseReset)),
        ];
        for (mask, error) in checks {
            if self.0 & mask != 0 {
                return Err(error.map_or(R1Error::CommandCrc, R1Error::Status));
            }
        }
        if !allow_idle && self.is_idle() {
            return Err(R1Error::Status(InIdleState));
        }
        Ok(())
    }
}

/// Second byte of an R2 reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct R2Status(pub u8);

impl R2Status {
    pub const CARD_LOCKED: u8 = 1 << 0;
    pub const WP_ERASE_SKIP: u8 = 1 << 1;
    pub const ERROR: u8 = 1 << 2;
    pub const CC_ERROR: u8 = 1 << 3;
    pub const CARD_ECC_FAILED: u8 = 1 << 4;
    pub const WP_VIOLATION: u8 = 1 << 5;
    pub const ERASE_PARAM: u8 = 1 << 6;
    pub const OUT_OF_RANGE: u8 = 1 << 7;

    /// Decode the first reported condition, from out of range down to
    /// card locked
    pub fn check(self) -> Result<(), CardStatusError> {
        use CardStatusError::*;

        let checks = [
            (Self::OUT_OF_RANGE, OutOfRange),
            (Self::ERASE_PARAM, EraseParameter),
            (Self::WP_VIOLATION, WriteProtectViolation),
            (Self::CARD_ECC_FAILED, EccFailed),
            (Self::CC_ERROR, CardControllerError),
            (Self::ERROR, Error),
            (Self::WP_ERASE_SKIP, WriteProtectEraseSkip),
            (Self::CARD_LOCKED, CardLocked),
        ];
        match checks.iter().find(|(mask, _)| self.0 & mask != 0) {
            Some((_, error)) => Err(*error),
            None => Ok(()),
        }
    }
}
