//! SD/MMC SPI-mode wire format
//!
//! Byte-exact encoding and decoding of what travels on the wire between
//! the host and an SD or MMC card in SPI mode. Nothing here touches a bus;
//! `busline-drivers` sequences these pieces into the card protocol.
//!
//! # Command frame
//!
//! ```text
//! ┌──────────────┬──────────────────┬───────────────┐
//! │ 01 + INDEX   │ ARGUMENT (BE)    │ CRC7 + STOP   │
//! │ 1B           │ 4B               │ 1B            │
//! └──────────────┴──────────────────┴───────────────┘
//! ```
//!
//! # Data block
//!
//! ```text
//! ┌───────┬──────────────┬──────────────┐
//! │ TOKEN │ DATA (512B)  │ CRC16 (BE)   │
//! └───────┴──────────────┴──────────────┘
//! ```

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod command;
pub mod crc;
pub mod registers;
pub mod response;
pub mod token;

pub use command::{Command, CMD_LEN};
pub use registers::{Cid, Csd, Ocr, RegisterError};
pub use response::{CardStatusError, R1Error, R2Status, ResponseKind, R1};
pub use token::{DataResponse, ReadToken};

/// Data block length used in SPI mode
pub const BLOCK_LEN: usize = 512;
