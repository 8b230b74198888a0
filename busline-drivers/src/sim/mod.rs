//! Device models and bus fixtures for the driver tests

pub mod m95x;
pub mod pcd8544;
pub mod sdcard;

use busline_core::spi::{SpiBus, SpiBusConfig};
use busline_core::DmaLocks;
use busline_hal_sim::{SimDmaChannel, SimHardware, SimSpi};

pub type SimBus = SpiBus<'static, SimSpi, SimDmaChannel, SimDmaChannel>;

pub const RX: u8 = 2;
pub const TX: u8 = 3;

/// Simulated hardware with one full-duplex bus
pub struct Bench {
    pub hw: SimHardware,
    pub bus: SimBus,
}

impl Bench {
    pub fn new() -> Self {
        Self::with_config(SpiBusConfig::default())
    }

    pub fn with_config(config: SpiBusConfig) -> Self {
        let hw = SimHardware::new();
        let locks: &'static DmaLocks = Box::leak(Box::new(DmaLocks::new()));
        let bus = SpiBus::new(hw.spi(), hw.rx_channel(RX), hw.tx_channel(TX), locks, config);
        Self { hw, bus }
    }
}
