//! SPI1/SPI2/SPI3 register access
//!
//! Field values are written through the PAC's `from_bits` constructors so
//! the encoding stays the one documented in RM0008 (SPI_CR1, SPI_CR2,
//! SPI_SR).

use busline_hal::spi::{
    BaudRate, BitOrder, Duplex, FrameSize, Phase, Polarity, SpiConfig, SpiFlags,
    SpiPeripheral,
};
use embassy_stm32::pac::spi::{vals, Spi};

/// One SPI peripheral in master mode
pub struct Stm32Spi {
    regs: Spi,
    crc: bool,
}

impl Stm32Spi {
    /// Take over a peripheral by its register block
    ///
    /// # Safety
    ///
    /// The caller hands exclusive ownership of the peripheral to this
    /// driver. Its clock must be enabled and SCK/MOSI/MISO muxed to the
    /// alternate function before [`SpiPeripheral::configure`] runs.
    pub unsafe fn new(regs: Spi) -> Self {
        Self { regs, crc: false }
    }
}

impl SpiPeripheral for Stm32Spi {
    fn configure(&mut self, config: &SpiConfig) {
        let (polarity, phase): (Polarity, Phase) = config.mode.into();
        let crc = config.crc_polynomial.is_some();
        self.crc = crc;

        self.regs.cr1().write(|w| w.set_spe(false));
        if let Some(poly) = config.crc_polynomial {
            self.regs.crcpr().write(|w| w.set_crcpoly(poly));
        }
        self.regs.cr2().write(|_| {});
        self.regs.cr1().write(|w| {
            w.set_cpha(vals::Cpha::from_bits(
                (phase == Phase::CaptureOnSecondTransition) as u8,
            ));
            w.set_cpol(vals::Cpol::from_bits((polarity == Polarity::IdleHigh) as u8));
            w.set_mstr(vals::Mstr::from_bits(1));
            w.set_br(vals::Br::from_bits(config.baud_rate.bits()));
            w.set_lsbfirst(vals::Lsbfirst::from_bits(
                (config.bit_order == BitOrder::LsbFirst) as u8,
            ));
            // Software slave management, chip selects are GPIOs
            w.set_ssm(true);
            w.set_ssi(true);
            w.set_dff(vals::Dff::from_bits((config.frame_size == FrameSize::Bits16) as u8));
            w.set_crcen(crc);
            w.set_rxonly(vals::Rxonly::from_bits((config.duplex == Duplex::HalfRxOnly) as u8));
            let bidi = matches!(config.duplex, Duplex::HalfBidirectional | Duplex::HalfTxOnly);
            w.set_bidimode(vals::Bidimode::from_bits(bidi as u8));
            w.set_bidioe(vals::Bidioe::from_bits((config.duplex == Duplex::HalfTxOnly) as u8));
            w.set_spe(true);
        });
    }

    fn set_baud_rate(&mut self, rate: BaudRate) {
        self.regs
            .cr1()
            .modify(|w| w.set_br(vals::Br::from_bits(rate.bits())));
    }

    fn set_bidi_output(&mut self, output: bool) {
        self.regs
            .cr1()
            .modify(|w| w.set_bidioe(vals::Bidioe::from_bits(output as u8)));
    }

    fn set_dma_requests(&mut self, rx: bool, tx: bool) {
        // RXDMAEN first so no received frame is missed once TX starts clocking
        self.regs.cr2().modify(|w| w.set_rxdmaen(rx));
        self.regs.cr2().modify(|w| w.set_txdmaen(tx));
    }

    fn set_error_interrupt(&mut self, enabled: bool) {
        self.regs.cr2().modify(|w| w.set_errie(enabled));
    }

    fn flags(&self) -> SpiFlags {
        let sr = self.regs.sr().read();
        SpiFlags {
            tx_empty: sr.txe(),
            rx_not_empty: sr.rxne(),
            busy: sr.bsy(),
            overrun: sr.ovr(),
            mode_fault: sr.modf(),
            crc_error: sr.crcerr(),
        }
    }

    fn clear_errors(&mut self, flags: SpiFlags) {
        if flags.overrun {
            // OVR clears on a DR read followed by an SR read
            let _ = self.read_data();
            let _ = self.regs.sr().read();
        }
        if flags.mode_fault {
            // MODF clears on an SR read followed by a CR1 write
            let _ = self.regs.sr().read();
            self.regs.cr1().modify(|w| w.set_mstr(vals::Mstr::from_bits(1)));
        }
        if flags.crc_error {
            self.regs.sr().modify(|w| w.set_crcerr(false));
        }
    }

    fn reset_crc(&mut self) {
        if !self.crc {
            return;
        }
        // CRCEN is only writable with SPE clear; the bus is idle here
        self.regs.cr1().modify(|w| w.set_spe(false));
        self.regs.cr1().modify(|w| w.set_crcen(false));
        self.regs.cr1().modify(|w| w.set_crcen(true));
        self.regs.cr1().modify(|w| w.set_spe(true));
    }

    fn write_data(&mut self, frame: u16) {
        // SAFETY: DR is a valid, aligned MMIO register of an owned peripheral
        unsafe { core::ptr::write_volatile(self.regs.dr().as_ptr() as *mut u16, frame) }
    }

    fn read_data(&mut self) -> u16 {
        // SAFETY: as for `write_data`
        unsafe { core::ptr::read_volatile(self.regs.dr().as_ptr() as *const u16) }
    }

    fn data_register(&self) -> u32 {
        self.regs.dr().as_ptr() as u32
    }
}

/// Prescaler giving the fastest SPI clock not above `max_hz`
pub fn baud_rate_for(pclk_hz: u32, max_hz: u32) -> BaudRate {
    use BaudRate::*;
    [Div2, Div4, Div8, Div16, Div32, Div64, Div128]
        .into_iter()
        .find(|rate| rate.frequency(pclk_hz) <= max_hz)
        .unwrap_or(Div256)
}

