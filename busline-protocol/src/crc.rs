//! Checksums
//!
//! - CRC7 (polynomial x^7 + x^3 + 1, init 0) protects command frames and
//!   the CID/CSD registers.
//! - CRC16-CCITT (polynomial 0x1021, init 0, the XMODEM variant) protects
//!   data blocks.

use crc::{Crc, CRC_16_XMODEM, CRC_7_MMC};

const CRC7: Crc<u8> = Crc::<u8>::new(&CRC_7_MMC);
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// 7-bit CRC, right aligned
pub fn crc7(data: &[u8]) -> u8 {
    CRC7.checksum(data)
}

/// Trailing byte of a command or register: CRC7 followed by the end bit
pub fn crc7_byte(data: &[u8]) -> u8 {
    (crc7(data) << 1) | 1
}

/// Data block CRC
pub fn crc16(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}
