//! DMA-driven SPI bus engine
//!
//! A [`SpiBus`] executes an ordered list of [`SpiMessage`]s on one SPI
//! peripheral, chaining message to message from the DMA interrupts. Device
//! adapters share a bus cooperatively: each claims it with its own
//! [`TransferId`] and recognises its own completion through
//! [`TransferListener`].
//!
//! # Message lifecycle
//!
//! ```text
//!   transfer() ──► arm msg 0 ──► DMA TC ──► message_complete(0) ──► arm msg 1
//!                                                                     │
//!   transfer_complete() ◄── unlock DMA, Idle/Transferred ◄── DMA TC ◄─┘
//! ```
//!
//! A DMA transfer error or an SPI overrun, mode fault or CRC error ends the
//! transfer early with [`BusStatus::Error`].

mod bus;
mod config;
mod listener;
mod message;
mod transport;

pub use bus::{BusErrors, BusState, BusStatus, SpiBus, TransferId, MAX_MESSAGES};
pub use config::SpiBusConfig;
pub use listener::{TransferInfo, TransferListener};
pub use message::{Direction, SpiMessage};
pub use transport::SpiTransport;
