//! Busline Hardware Abstraction Layer
//!
//! This crate defines the hardware abstraction traits consumed by the SPI
//! transaction engine and the device drivers. Chip-specific crates
//! (STM32F1, the host simulator) implement them, so the engine and the
//! drivers never touch registers directly.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  busline-drivers (M95x, PCD8544, SD)    │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  busline-core (Future, SpiBus engine)   │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  busline-hal (this crate - traits)      │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │ busline-hal-  │       │ busline-hal-  │
//! │    stm32f1    │       │      sim      │
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`gpio::OutputPin`] - Chip select and control lines
//! - [`spi::SpiPeripheral`] - Register-level SPI peripheral
//! - [`dma::DmaChannel`] - One DMA channel
//! - [`timeout::Timeout`] - Caller-supplied timeout for poll loops
//! - [`delay::DelayNs`] - Blocking delays (re-exported from embedded-hal)

#![no_std]
#![deny(unsafe_code)]

pub mod delay;
pub mod dma;
pub mod gpio;
pub mod spi;
pub mod timeout;

// Re-export key traits at crate root for convenience
pub use delay::DelayNs;
pub use dma::{DmaChannel, DmaChannelId, DmaDirection, DmaFlags, DmaPriority, DmaRequest, DmaWidth};
pub use gpio::{EhOutputPin, OutputPin};
pub use spi::{BaudRate, BitOrder, Duplex, FrameSize, SpiConfig, SpiFlags, SpiPeripheral};
pub use timeout::Timeout;
