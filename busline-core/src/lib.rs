//! Completion futures and the DMA-driven SPI bus engine
//!
//! This crate contains the board-agnostic half of the bus-transaction
//! engine:
//!
//! - [`Future`]: single-slot completion shared with interrupt context
//! - [`DmaLocks`]: try-lock arbitration of DMA channels between buses
//! - [`spi::SpiBus`]: message-list state machine chained from DMA interrupts
//! - [`spi::SpiTransport`] and [`spi::TransferListener`]: the seams device
//!   adapters build on
//! - [`PollTimeout`]: poll-counting [`Timeout`](busline_hal::Timeout)
//!
//! Hardware access goes through the `busline-hal` traits.

#![cfg_attr(not(test), no_std)]

mod fmt;

pub mod dma_lock;
pub mod error;
pub mod future;
pub mod spi;
pub mod timeout;

pub use dma_lock::DmaLocks;
pub use error::{Error, Result};
pub use future::Future;
pub use timeout::PollTimeout;
