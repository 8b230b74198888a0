//! Command frames
//!
//! Every command is six bytes: `01` start bits and the 6-bit index, the
//! 32-bit argument most significant byte first, then the CRC7 of the first
//! five bytes and the end bit.

use crate::crc::crc7_byte;
use crate::response::ResponseKind;

/// Length of a command frame
pub const CMD_LEN: usize = 6;

/// Check pattern and voltage range (2.7-3.6V) sent with SEND_IF_COND
pub const IF_COND_ARGUMENT: u32 = 0x1AA;

/// Host capacity support bit of SD_SEND_OP_COND
pub const ACMD41_HCS: u32 = 1 << 30;

/// Argument of CRC_ON_OFF that enables CRC checking
pub const CRC_ON: u32 = 1;

/// Command indices
pub mod cmd {
    pub const GO_IDLE_STATE: u8 = 0;
    pub const SEND_OP_COND: u8 = 1;
    pub const SEND_IF_COND: u8 = 8;
    pub const SEND_CSD: u8 = 9;
    pub const SEND_CID: u8 = 10;
    pub const STOP_TRANSMISSION: u8 = 12;
    pub const SEND_STATUS: u8 = 13;
    pub const SET_BLOCKLEN: u8 = 16;
    pub const READ_SINGLE_BLOCK: u8 = 17;
    pub const READ_MULTIPLE_BLOCK: u8 = 18;
    pub const WRITE_BLOCK: u8 = 24;
    pub const WRITE_MULTIPLE_BLOCK: u8 = 25;
    pub const ERASE_WR_BLK_START: u8 = 32;
    pub const ERASE_WR_BLK_END: u8 = 33;
    pub const ERASE_GROUP_START: u8 = 35;
    pub const ERASE_GROUP_END: u8 = 36;
    pub const ERASE: u8 = 38;
    pub const APP_CMD: u8 = 55;
    pub const READ_OCR: u8 = 58;
    pub const CRC_ON_OFF: u8 = 59;
}

/// Application command indices (sent after APP_CMD)
pub mod acmd {
    pub const SET_WR_BLK_ERASE_COUNT: u8 = 23;
    pub const SD_SEND_OP_COND: u8 = 41;
}

/// A command ready to be framed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Command {
    /// Command index (0-63)
    pub index: u8,
    /// Command argument
    pub argument: u32,
    /// Whether this is an application command
    pub app: bool,
}

impl Command {
    /// Standard command
    pub const fn new(index: u8, argument: u32) -> Self {
        Self {
            index,
            argument,
            app: false,
        }
    }

    /// Application command; the caller sends APP_CMD first
    pub const fn app(index: u8, argument: u32) -> Self {
        Self {
            index,
            argument,
            app: true,
        }
    }

    /// Wire encoding
    pub fn frame(&self) -> [u8; CMD_LEN] {
        frame(self.index, self.argument)
    }

    /// Reply format the card answers with
    pub fn response_kind(&self) -> ResponseKind {
        // Every application command used in SPI mode answers with R1
        if self.app {
            return ResponseKind::R1;
        }
        match self.index {
            cmd::STOP_TRANSMISSION | cmd::ERASE => ResponseKind::R1b,
            cmd::SEND_STATUS => ResponseKind::R2,
            cmd::READ_OCR => ResponseKind::R3,
            cmd::SEND_IF_COND => ResponseKind::R7,
            _ => ResponseKind::R1,
        }
    }
}

/// Encode command `index` with `argument`
pub fn frame(index: u8, argument: u32) -> [u8; CMD_LEN] {
    let arg = argument.to_be_bytes();
    let mut out = [0x40 | (index & 0x3F), arg[0], arg[1], arg[2], arg[3], 0];
    out[5] = crc7_byte(&out[..5]);
    out
}

/// Check the start, transmission and end bits and the CRC7 of a frame
pub fn verify(frame: &[u8; CMD_LEN]) -> bool {
    frame[0] & 0xC0 == 0x40 && frame[5] == crc7_byte(&frame[..5])
}

/// Decode a frame into index and argument, if it is well formed
pub fn parse(frame: &[u8; CMD_LEN]) -> Option<(u8, u32)> {
    if !verify(frame) {
        return None;
    }
    let argument = u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]);
    Some((frame[0] & 0x3F, argument))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::crc7;
    use proptest::prelude::*;

    #[test]
    fn test_go_idle_frame() {
        assert_eq!(
            frame(cmd::GO_IDLE_STATE, 0),
            [0x40, 0x00, 0x00, 0x00, 0x00, 0x95]
        );
    }

    #[test]
    fn test_if_cond_frame() {
        assert_eq!(
            Command::new(cmd::SEND_IF_COND, IF_COND_ARGUMENT).frame(),
            [0x48, 0x00, 0x00, 0x01, 0xAA, 0x87]
        );
    }

    #[test]
    fn test_argument_is_big_endian() {
        let f = frame(cmd::READ_SINGLE_BLOCK, 0x1234_5678);
        assert_eq!(&f[..5], &[0x51, 0x12, 0x34, 0x56, 0x78]);
        assert_eq!(parse(&f), Some((cmd::READ_SINGLE_BLOCK, 0x1234_5678)));
    }

    #[test]
    fn test_single_bit_corruption_detected() {
        let mut f = frame(cmd::READ_MULTIPLE_BLOCK, 0x0000_0800);
        f[3] ^= 0x10;
        assert!(!verify(&f));
        assert_eq!(parse(&f), None);
    }

    #[test]
    fn test_response_kinds() {
        assert_eq!(Command::new(cmd::GO_IDLE_STATE, 0).response_kind(), ResponseKind::R1);
        assert_eq!(Command::new(cmd::STOP_TRANSMISSION, 0).response_kind(), ResponseKind::R1b);
        assert_eq!(Command::new(cmd::SEND_STATUS, 0).response_kind(), ResponseKind::R2);
        assert_eq!(Command::new(cmd::READ_OCR, 0).response_kind(), ResponseKind::R3);
        assert_eq!(Command::new(cmd::SEND_IF_COND, 0x1AA).response_kind(), ResponseKind::R7);
        assert_eq!(Command::app(acmd::SD_SEND_OP_COND, ACMD41_HCS).response_kind(), ResponseKind::R1);
    }

    proptest! {
        #[test]
        fn prop_frame_carries_crc7_of_header(index in 0u8..64, argument in any::<u32>()) {
            let f = frame(index, argument);
            prop_assert_eq!(f[5] >> 1, crc7(&f[..5]));
            prop_assert_eq!(f[5] & 1, 1);
            prop_assert_eq!(parse(&f), Some((index, argument)));
        }

        #[test]
        fn prop_single_bit_flip_detected(
            index in 0u8..64,
            argument in any::<u32>(),
            bit in 0usize..40,
        ) {
            // Flip one bit among the index and argument bytes. A CRC7 with
            // x^7+x^3+1 detects every single-bit error in a 40-bit message.
            let mut f = frame(index, argument);
            f[bit / 8] ^= 0x80 >> (bit % 8);
            prop_assert!(!verify(&f));
        }
    }
}
