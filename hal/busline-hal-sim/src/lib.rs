//! Host simulation of the Busline HAL
//!
//! Models one SPI peripheral, its DMA channels and GPIO lines on the host so
//! the engine and the drivers can be tested without hardware. Devices are
//! attached as [`SpiSlave`]s behind a chip-select pin; frames are routed to
//! whichever slaves are currently selected.
//!
//! DMA transfers complete synchronously: once both the channel and the SPI
//! DMA request are enabled, the whole block is exchanged and the
//! transfer-complete flags are raised. Nothing happens in the background,
//! so a test decides exactly when an "interrupt" is serviced.
//!
//! ```ignore
//! let hw = SimHardware::new();
//! let eeprom = Rc::new(RefCell::new(EepromModel::new()));
//! let cs = hw.attach(eeprom.clone());
//! let bus = SpiBus::new(hw.spi(), hw.rx_channel(1), hw.tx_channel(2), &LOCKS, config);
//! ```

mod delay;
mod dma;
mod gpio;
mod slave;
mod spi;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use busline_hal::dma::{DmaChannelId, DmaFlags, DmaRequest};
use busline_hal::spi::{BaudRate, SpiConfig, SpiFlags};

pub use delay::SimDelay;
pub use dma::SimDmaChannel;
pub use gpio::{PinProbe, SimPin};
pub use slave::{Recorder, SpiSlave};
pub use spi::SimSpi;

/// Observable hardware activity, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    /// A DMA block exchange ran
    DmaStart { rx: bool, tx: bool, frames: u16 },
    /// Single-frame exchange through the data register
    Transmit(u16),
    /// Chip select of an attached slave changed
    Select { slave: usize, selected: bool },
    /// A plain GPIO line changed
    Pin { pin: u8, high: bool },
    /// Clock prescaler changed
    BaudRate(BaudRate),
    /// Hardware CRC calculation restarted
    CrcReset,
    /// Test-defined marker
    Marker(u32),
}

struct AttachedSlave {
    device: Box<dyn SpiSlave>,
    selected: bool,
}

#[derive(Default)]
struct Channel {
    request: Option<DmaRequest>,
    enabled: bool,
    flags: DmaFlags,
    remaining: u16,
    inject_error: bool,
}

struct State {
    config: Option<SpiConfig>,
    baud_rate: Option<BaudRate>,
    bidi_output: bool,
    rx_request: bool,
    tx_request: bool,
    error_interrupt: bool,
    flags: SpiFlags,
    force_busy: bool,
    inject_overrun: bool,
    inject_mode_fault: bool,
    inject_crc_error: bool,
    data: u16,
    crc_resets: u32,
    rx_channel: Option<DmaChannelId>,
    tx_channel: Option<DmaChannelId>,
    channels: BTreeMap<DmaChannelId, Channel>,
    slaves: Vec<AttachedSlave>,
    events: Vec<SimEvent>,
}

impl State {
    fn new() -> Self {
        Self {
            config: None,
            baud_rate: None,
            bidi_output: false,
            rx_request: false,
            tx_request: false,
            error_interrupt: false,
            flags: SpiFlags {
                tx_empty: true,
                ..SpiFlags::default()
            },
            force_busy: false,
            inject_overrun: false,
            inject_mode_fault: false,
            inject_crc_error: false,
            data: 0,
            crc_resets: 0,
            rx_channel: None,
            tx_channel: None,
            channels: BTreeMap::new(),
            slaves: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Shift one byte through every selected slave
    fn exchange_byte(&mut self, mosi: u8) -> u8 {
        let mut miso = 0xFF;
        for slave in self.slaves.iter_mut().filter(|s| s.selected) {
            miso &= slave.device.exchange(mosi);
        }
        miso
    }

    /// Shift one frame, most significant byte first for 16-bit frames
    fn exchange_frame(&mut self, mosi: u16, wide: bool) -> u16 {
        if wide {
            let hi = self.exchange_byte((mosi >> 8) as u8);
            let lo = self.exchange_byte(mosi as u8);
            u16::from_be_bytes([hi, lo])
        } else {
            self.exchange_byte(mosi as u8) as u16
        }
    }

    fn armed(&self, id: Option<DmaChannelId>, requested: bool) -> Option<DmaChannelId> {
        let id = id?;
        let ch = self.channels.get(&id)?;
        (requested && ch.enabled && ch.request.is_some() && ch.remaining > 0).then_some(id)
    }

    /// Run the armed DMA block exchange, if any
    fn run_dma(&mut self) {
        let rx = self.armed(self.rx_channel, self.rx_request);
        let tx = self.armed(self.tx_channel, self.tx_request);
        if rx.is_none() && tx.is_none() {
            return;
        }

        let frames = tx
            .or(rx)
            .and_then(|id| self.channels.get(&id))
            .map(|ch| ch.remaining)
            .unwrap_or(0);
        self.events.push(SimEvent::DmaStart {
            rx: rx.is_some(),
            tx: tx.is_some(),
            frames,
        });

        if self.inject_overrun {
            self.inject_overrun = false;
            self.flags.overrun = true;
            return;
        }
        if self.inject_mode_fault {
            self.inject_mode_fault = false;
            self.flags.mode_fault = true;
            return;
        }

        let mut failed = false;
        for id in [rx, tx].into_iter().flatten() {
            if let Some(ch) = self.channels.get_mut(&id) {
                if ch.inject_error {
                    ch.inject_error = false;
                    ch.flags.transfer_error = true;
                    failed = true;
                }
            }
        }
        if failed {
            return;
        }

        let tx_req = tx.and_then(|id| self.channels.get(&id)).and_then(|c| c.request);
        let rx_req = rx.and_then(|id| self.channels.get(&id)).and_then(|c| c.request);
        let wide = tx_req
            .or(rx_req)
            .map(|r| r.width.bytes() == 2)
            .unwrap_or(false);

        for i in 0..frames as usize {
            let mosi = match tx_req {
                // SAFETY: the engine keeps the source buffer alive and at
                // least `count` frames long until the channel completes.
                Some(req) => unsafe { dma::read_frame(&req, i) },
                None if wide => 0xFFFF,
                None => 0xFF,
            };
            let miso = self.exchange_frame(mosi, wide);
            if let Some(req) = rx_req {
                // SAFETY: as above, for the destination buffer.
                unsafe { dma::write_frame(&req, i, miso) };
            }
        }

        for id in [rx, tx].into_iter().flatten() {
            if let Some(ch) = self.channels.get_mut(&id) {
                ch.remaining = 0;
                ch.flags.transfer_complete = true;
            }
        }
        // The received CRC is checked once the last frame is in
        if self.inject_crc_error {
            self.inject_crc_error = false;
            self.flags.crc_error = true;
        }
    }
}

/// Simulated SPI peripheral, DMA controller and GPIO port
///
/// Cloning yields another handle to the same hardware.
#[derive(Clone)]
pub struct SimHardware(Rc<RefCell<State>>);

impl SimHardware {
    /// Create idle hardware with no attached devices
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(State::new())))
    }

    /// SPI peripheral handle
    pub fn spi(&self) -> SimSpi {
        SimSpi::new(self.0.clone())
    }

    /// DMA channel serving SPI receive, with lock index `id`
    pub fn rx_channel(&self, id: DmaChannelId) -> SimDmaChannel {
        let mut state = self.0.borrow_mut();
        state.rx_channel = Some(id);
        state.channels.entry(id).or_default();
        SimDmaChannel::new(self.0.clone(), id)
    }

    /// DMA channel serving SPI transmit, with lock index `id`
    pub fn tx_channel(&self, id: DmaChannelId) -> SimDmaChannel {
        let mut state = self.0.borrow_mut();
        state.tx_channel = Some(id);
        state.channels.entry(id).or_default();
        SimDmaChannel::new(self.0.clone(), id)
    }

    /// Attach a device and return its chip-select line (idle high)
    pub fn attach<S: SpiSlave + 'static>(&self, device: S) -> SimPin {
        let mut state = self.0.borrow_mut();
        state.slaves.push(AttachedSlave {
            device: Box::new(device),
            selected: false,
        });
        SimPin::chip_select(self.0.clone(), state.slaves.len() - 1)
    }

    /// Plain GPIO line, logged as [`SimEvent::Pin`]
    pub fn pin(&self, pin: u8, initial_high: bool) -> SimPin {
        SimPin::plain(self.0.clone(), pin, initial_high)
    }

    /// Snapshot of everything that happened so far
    pub fn events(&self) -> Vec<SimEvent> {
        self.0.borrow().events.clone()
    }

    /// Forget the recorded events
    pub fn clear_events(&self) {
        self.0.borrow_mut().events.clear();
    }

    /// Record a marker, typically from a test listener
    pub fn mark(&self, marker: u32) {
        self.0.borrow_mut().events.push(SimEvent::Marker(marker));
    }

    /// Hold the BSY flag
    pub fn set_busy(&self, busy: bool) {
        self.0.borrow_mut().force_busy = busy;
    }

    /// Fail the next DMA exchange on channel `id` with a transfer error
    pub fn inject_dma_error(&self, id: DmaChannelId) {
        if let Some(ch) = self.0.borrow_mut().channels.get_mut(&id) {
            ch.inject_error = true;
        }
    }

    /// Fail the next DMA exchange with an overrun
    pub fn inject_overrun(&self) {
        self.0.borrow_mut().inject_overrun = true;
    }

    /// Fail the next DMA exchange with a master mode fault
    pub fn inject_mode_fault(&self) {
        self.0.borrow_mut().inject_mode_fault = true;
    }

    /// Let the next DMA exchange move its data, then flag a CRC mismatch
    pub fn inject_crc_error(&self) {
        self.0.borrow_mut().inject_crc_error = true;
    }

    /// Current clock prescaler
    pub fn baud_rate(&self) -> Option<BaudRate> {
        self.0.borrow().baud_rate
    }

    /// Last applied configuration
    pub fn config(&self) -> Option<SpiConfig> {
        self.0.borrow().config
    }

    /// Whether the error interrupt is enabled
    pub fn error_interrupt(&self) -> bool {
        self.0.borrow().error_interrupt
    }

    /// Whether bidirectional mode is driving the line
    pub fn bidi_output(&self) -> bool {
        self.0.borrow().bidi_output
    }

    /// Number of hardware CRC resets
    pub fn crc_resets(&self) -> u32 {
        self.0.borrow().crc_resets
    }

    /// Whether DMA channel `id` is enabled
    pub fn channel_enabled(&self, id: DmaChannelId) -> bool {
        self.0
            .borrow()
            .channels
            .get(&id)
            .map(|ch| ch.enabled)
            .unwrap_or(false)
    }

    /// Number of DMA block exchanges so far
    pub fn dma_runs(&self) -> usize {
        self.0
            .borrow()
            .events
            .iter()
            .filter(|e| matches!(e, SimEvent::DmaStart { .. }))
            .count()
    }
}

impl Default for SimHardware {
    fn default() -> Self {
        Self::new()
    }
}
