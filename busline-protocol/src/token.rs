//! Data tokens
//!
//! Data blocks are preceded by a start token. A card that cannot supply a
//! block answers with an error token instead; a card receiving a block
//! answers with a data response.

use crate::response::CardStatusError;

/// Start of a block read, or of a single block write
pub const START_BLOCK: u8 = 0xFE;
/// Start of each block of a multiple block write
pub const START_BLOCK_MULTIPLE: u8 = 0xFC;
/// End of a multiple block write
pub const STOP_TRAN: u8 = 0xFD;

/// Byte received while waiting for a read block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReadToken {
    /// Block data follows
    Start,
    /// The card reports why no data follows
    Error(CardStatusError),
}

impl ReadToken {
    /// Decode a byte, `None` while the card is still preparing the block
    ///
    /// Error tokens are `0000xxxx`; the low bits, most severe first, are
    /// out of range, card ECC failed, card controller error and error.
    pub fn parse(byte: u8) -> Option<Self> {
        if byte == START_BLOCK {
            return Some(ReadToken::Start);
        }
        if byte == 0 || byte & 0xF0 != 0 {
            return None;
        }
        let error = if byte & 0x08 != 0 {
            CardStatusError::OutOfRange
        } else if byte & 0x04 != 0 {
            CardStatusError::EccFailed
        } else if byte & 0x02 != 0 {
            CardStatusError::CardControllerError
        } else {
            CardStatusError::Error
        };
        Some(ReadToken::Error(error))
    }
}

/// Card answer to a written block (`xxx0sss1`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataResponse {
    /// Status `010`
    Accepted,
    /// Status `101`: the block CRC did not match
    CrcError,
    /// Status `110`, or any undefined status
    WriteError,
}

impl DataResponse {
    /// Decode a byte, `None` if it is not a data response
    pub fn parse(byte: u8) -> Option<Self> {
        if byte & 0x11 != 0x01 {
            return None;
        }
        Some(match (byte >> 1) & 0x07 {
            0b010 => DataResponse::Accepted,
            0b101 => DataResponse::CrcError,
            _ => DataResponse::WriteError,
        })
    }

    /// Encoded form, as a card sends it
    pub fn to_byte(self) -> u8 {
        let status = match self {
            DataResponse::Accepted => 0b010,
            DataResponse::CrcError => 0b101,
            DataResponse::WriteError => 0b110,
        };
        0xE0 | (status << 1) | 1
    }
}
