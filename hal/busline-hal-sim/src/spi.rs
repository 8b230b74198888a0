//! Simulated SPI peripheral

use std::cell::RefCell;
use std::rc::Rc;

use busline_hal::spi::{BaudRate, FrameSize, SpiConfig, SpiFlags, SpiPeripheral};

use crate::{SimEvent, State};

/// Address reported for the data register (SPI1_DR on STM32F1)
pub const DATA_REGISTER: u32 = 0x4001_300C;

/// SPI peripheral handle of a [`SimHardware`](crate::SimHardware)
pub struct SimSpi {
    state: Rc<RefCell<State>>,
}

impl SimSpi {
    pub(crate) fn new(state: Rc<RefCell<State>>) -> Self {
        Self { state }
    }
}

impl SpiPeripheral for SimSpi {
    fn configure(&mut self, config: &SpiConfig) {
        let mut state = self.state.borrow_mut();
        state.config = Some(*config);
        state.baud_rate = Some(config.baud_rate);
        state.bidi_output = false;
    }

    fn set_baud_rate(&mut self, rate: BaudRate) {
        let mut state = self.state.borrow_mut();
        state.baud_rate = Some(rate);
        state.events.push(SimEvent::BaudRate(rate));
    }

    fn set_bidi_output(&mut self, output: bool) {
        self.state.borrow_mut().bidi_output = output;
    }

    fn set_dma_requests(&mut self, rx: bool, tx: bool) {
        let mut state = self.state.borrow_mut();
        state.rx_request = rx;
        state.tx_request = tx;
        state.run_dma();
    }

    fn set_error_interrupt(&mut self, enabled: bool) {
        self.state.borrow_mut().error_interrupt = enabled;
    }

    fn flags(&self) -> SpiFlags {
        let state = self.state.borrow();
        SpiFlags {
            busy: state.flags.busy || state.force_busy,
            ..state.flags
        }
    }

    fn clear_errors(&mut self, flags: SpiFlags) {
        let mut state = self.state.borrow_mut();
        state.flags.overrun &= !flags.overrun;
        state.flags.mode_fault &= !flags.mode_fault;
        state.flags.crc_error &= !flags.crc_error;
    }

    fn reset_crc(&mut self) {
        let mut state = self.state.borrow_mut();
        // The F1 only takes a CRC reset with the peripheral stopped
        assert!(
            !state.rx_request && !state.tx_request,
            "CRC reset while DMA requests are enabled"
        );
        state.crc_resets += 1;
        state.events.push(SimEvent::CrcReset);
    }

    fn write_data(&mut self, frame: u16) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let wide = state
            .config
            .map(|c| c.frame_size == FrameSize::Bits16)
            .unwrap_or(false);
        state.events.push(SimEvent::Transmit(frame));
        state.data = state.exchange_frame(frame, wide);
        state.flags.rx_not_empty = true;
    }

    fn read_data(&mut self) -> u16 {
        let mut state = self.state.borrow_mut();
        state.flags.rx_not_empty = false;
        state.data
    }

    fn data_register(&self) -> u32 {
        DATA_REGISTER
    }
}
