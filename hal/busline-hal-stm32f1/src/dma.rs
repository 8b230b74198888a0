//! DMA1/DMA2 channel register access
//!
//! On the F1 the SPI requests are hard-wired: SPI1 RX/TX on DMA1 channels
//! 2/3, SPI2 on 4/5, SPI3 on DMA2 channels 1/2.

use busline_hal::dma::{
    DmaChannel, DmaChannelId, DmaDirection, DmaFlags, DmaPriority, DmaRequest, DmaWidth,
};
use embassy_stm32::pac::bdma::{vals, Dma};

/// One channel of a DMA controller
pub struct Stm32DmaChannel {
    dma: Dma,
    /// Channel index within the controller, 0-based (channel 1 is 0)
    index: usize,
    id: DmaChannelId,
}

impl Stm32DmaChannel {
    /// Take over channel `channel` (1-based, as in RM0008) of `dma`
    ///
    /// `id` is the channel's slot in the shared `DmaLocks` bitmap.
    ///
    /// # Safety
    ///
    /// The caller hands exclusive ownership of the channel to this driver
    /// and has enabled the controller's clock.
    pub unsafe fn new(dma: Dma, channel: u8, id: DmaChannelId) -> Self {
        Self {
            dma,
            index: usize::from(channel.saturating_sub(1)),
            id,
        }
    }
}

fn size(width: DmaWidth) -> vals::Size {
    vals::Size::from_bits(match width {
        DmaWidth::Byte => 0,
        DmaWidth::HalfWord => 1,
    })
}

fn priority(priority: DmaPriority) -> vals::Pl {
    vals::Pl::from_bits(priority as u8)
}

impl DmaChannel for Stm32DmaChannel {
    fn id(&self) -> DmaChannelId {
        self.id
    }

    fn configure(&mut self, request: &DmaRequest) {
        let ch = self.dma.ch(self.index);
        ch.par().write_value(request.peripheral);
        ch.mar().write_value(request.memory as u32);
        ch.ndtr().write(|w| w.set_ndt(request.count));
        ch.cr().write(|w| {
            w.set_dir(vals::Dir::from_bits(
                (request.direction == DmaDirection::MemoryToPeripheral) as u8,
            ));
            w.set_psize(size(request.width));
            w.set_msize(size(request.width));
            w.set_pinc(false);
            w.set_minc(request.memory_increment);
            w.set_circ(false);
            w.set_pl(priority(request.priority));
            w.set_tcie(request.tc_interrupt);
            w.set_teie(request.te_interrupt);
            w.set_htie(false);
            w.set_en(false);
        });
    }

    fn enable(&mut self) {
        // Buffer writes must land before the channel starts reading memory
        cortex_m::asm::dsb();
        self.dma.ch(self.index).cr().modify(|w| w.set_en(true));
    }

    fn disable(&mut self) {
        self.dma.ch(self.index).cr().modify(|w| w.set_en(false));
    }

    fn flags(&self) -> DmaFlags {
        let isr = self.dma.isr().read();
        DmaFlags {
            transfer_complete: isr.tcif(self.index),
            half_transfer: isr.htif(self.index),
            transfer_error: isr.teif(self.index),
        }
    }

    fn clear_flags(&mut self) {
        self.dma.ifcr().write(|w| w.set_gif(self.index, true));
    }

    fn remaining(&self) -> u16 {
        self.dma.ch(self.index).ndtr().read().ndt()
    }

    fn deinit(&mut self) {
        let ch = self.dma.ch(self.index);
        ch.cr().write(|_| {});
        ch.ndtr().write(|w| w.set_ndt(0));
        ch.par().write_value(0);
        ch.mar().write_value(0);
        self.clear_flags();
    }
}
