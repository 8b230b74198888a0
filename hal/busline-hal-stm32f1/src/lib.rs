//! STM32F10x backend for the Busline HAL traits
//!
//! Register-level implementations of [`busline_hal::SpiPeripheral`] and
//! [`busline_hal::DmaChannel`] on top of the `embassy-stm32` PAC, plus
//! thin wrappers for output pins and timeouts. Clock setup, pin muxing
//! and interrupt routing stay with the firmware; embassy-stm32 does the
//! former, and the firmware's interrupt handlers call into the bus.
//!
//! # Features
//!
//! - `stm32f103c8` / `stm32f103rb` / `stm32f103ze` - chip selection
//! - `defmt` - Enable debug formatting support
//!
//! # Usage
//!
//! ```ignore
//! let p = embassy_stm32::init(Default::default());
//! // AF push-pull on PA5/PA7, input on PA6 via embassy-stm32 GPIO
//! let spi = unsafe { Stm32Spi::new(pac::SPI1) };
//! let rx = unsafe { Stm32DmaChannel::new(pac::DMA1, 2, 0) };
//! let tx = unsafe { Stm32DmaChannel::new(pac::DMA1, 3, 1) };
//! static LOCKS: DmaLocks = DmaLocks::new();
//! let bus = SpiBus::new(spi, rx, tx, &LOCKS, SpiBusConfig::default());
//! ```
//!
//! The SPI1 interrupt calls `bus.irq_handler`, DMA1 channels 2 and 3 call
//! `bus.dma_rx_irq_handler` and `bus.dma_tx_irq_handler`.

#![no_std]

pub mod dma;
pub mod gpio;
pub mod spi;
pub mod timeout;

pub use dma::Stm32DmaChannel;
pub use embassy_stm32::pac;
pub use gpio::Stm32OutputPin;
pub use spi::Stm32Spi;
pub use timeout::InstantTimeout;
