//! Bus engine configuration

use busline_hal::dma::DmaPriority;
use busline_hal::spi::SpiConfig;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration of a [`SpiBus`](super::SpiBus)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpiBusConfig {
    /// Peripheral configuration
    pub spi: SpiConfig,
    /// Frame clocked out while a read-only message receives
    pub filler: u16,
    /// Priority of both DMA channels
    pub dma_priority: DmaPriority,
}

impl Default for SpiBusConfig {
    fn default() -> Self {
        Self {
            spi: SpiConfig::default(),
            filler: 0xFFFF,
            dma_priority: DmaPriority::Medium,
        }
    }
}
