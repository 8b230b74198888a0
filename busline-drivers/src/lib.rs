//! SPI device drivers
//!
//! Device adapters that share one [`SpiBus`](busline_core::spi::SpiBus)
//! cooperatively:
//!
//! - [`m95x`]: M95xxx SPI EEPROM
//! - [`pcd8544`]: PCD8544 84x48 monochrome LCD (Nokia 5110)
//! - [`sdcard`]: SD/MMC cards in SPI mode
//!
//! Each adapter owns a [`Transaction`]: its transfer id, completion
//! future and chip select. Asynchronous `begin_*` operations return as soon
//! as DMA is armed; the synchronous wrappers wait on the future while
//! servicing the bus.
//!
//! # Sharing a bus
//!
//! ```ignore
//! let eeprom = M95x::new(&bus, TransferId(1), eeprom_cs, M95xConfig::default());
//! let lcd = Pcd8544::new(&bus, TransferId(2), lcd_cs, dc, rst, Pcd8544Config::default());
//!
//! // In the DMA and SPI interrupt handlers:
//! bus.dma_rx_irq_handler(&[&eeprom as &dyn TransferListener, &lcd]);
//! ```

#![cfg_attr(not(test), no_std)]

mod fmt;

pub mod m95x;
pub mod pcd8544;
pub mod sdcard;
pub mod transaction;

#[cfg(test)]
mod sim;

pub use transaction::Transaction;
