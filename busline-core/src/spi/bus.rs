//! Bus engine state machine

use core::cell::RefCell;
use core::ops::BitOr;

use busline_hal::dma::{DmaChannel, DmaDirection, DmaRequest, DmaWidth};
use busline_hal::spi::{BaudRate, Duplex, FrameSize, SpiPeripheral};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Vec;

use super::config::SpiBusConfig;
use super::listener::{TransferInfo, TransferListener};
use super::message::{Direction, SpiMessage};
use super::transport::SpiTransport;
use crate::dma_lock::DmaLocks;
use crate::error::{Error, Result};

/// Maximum number of messages in one transfer
pub const MAX_MESSAGES: usize = 8;

/// Owner tag of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransferId(pub u32);

impl TransferId {
    /// No owner; rejected by `claim`
    pub const NONE: Self = Self(0);
}

/// Outcome of the current or last transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusStatus {
    /// No transfer since reset
    Idle,
    /// Transfer in flight
    Transferring,
    /// Last transfer completed
    Transferred,
    /// Last transfer aborted by a hardware error
    Error,
}

/// Direction of the message currently on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusState {
    Idle,
    Writing,
    Reading,
    ReadingWriting,
}

impl From<Direction> for BusState {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Write => BusState::Writing,
            Direction::Read => BusState::Reading,
            Direction::ReadWrite => BusState::ReadingWriting,
        }
    }
}

/// Hardware errors accumulated during a transfer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusErrors(u8);

impl BusErrors {
    /// SPI receive overrun
    pub const OVERRUN: Self = Self(1 << 0);
    /// SPI master mode fault
    pub const MODE_FAULT: Self = Self(1 << 1);
    /// SPI hardware CRC mismatch
    pub const CRC: Self = Self(1 << 2);
    /// DMA transfer error
    pub const DMA: Self = Self(1 << 3);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl BitOr for BusErrors {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Rx,
    Tx,
}

/// DMA channels in use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Lanes {
    rx: bool,
    tx: bool,
}

impl Lanes {
    /// Channels a message list needs under a line configuration
    fn needed(duplex: Duplex, messages: &[SpiMessage]) -> Self {
        match duplex {
            Duplex::Full => Lanes { rx: true, tx: true },
            Duplex::HalfRxOnly => Lanes { rx: true, tx: false },
            Duplex::HalfTxOnly => Lanes { rx: false, tx: true },
            Duplex::HalfBidirectional => Lanes {
                rx: messages.iter().any(|m| m.direction() == Direction::Read),
                tx: messages.iter().any(|m| m.direction() == Direction::Write),
            },
        }
    }
}

/// What the interrupt path must do once the state borrow is released
enum Event {
    None,
    /// Notify, then arm the next message
    Advance {
        info: TransferInfo,
        message: SpiMessage,
    },
    Finished {
        info: TransferInfo,
        message: SpiMessage,
    },
    Failed {
        info: TransferInfo,
    },
}

struct Inner<S, Rx, Tx> {
    spi: S,
    rx: Rx,
    tx: Tx,
    messages: Vec<SpiMessage, MAX_MESSAGES>,
    index: usize,
    transfer_id: TransferId,
    status: BusStatus,
    state: BusState,
    errors: BusErrors,
    locked: Lanes,
    lanes: Lanes,
    filler: u16,
    sink: u16,
}

impl<S: SpiPeripheral, Rx: DmaChannel, Tx: DmaChannel> Inner<S, Rx, Tx> {
    fn info(&self) -> TransferInfo {
        TransferInfo {
            transfer_id: self.transfer_id,
            status: self.status,
            errors: self.errors,
        }
    }

    fn lock_channels(&mut self, locks: &DmaLocks, needed: Lanes) -> Result<()> {
        let rx_id = self.rx.id();
        let tx_id = self.tx.id();
        if needed.rx && !locks.try_lock(rx_id) {
            return Err(Error::Busy);
        }
        if needed.tx && !locks.try_lock(tx_id) {
            if needed.rx {
                locks.unlock(rx_id);
            }
            return Err(Error::Busy);
        }
        self.locked = needed;
        Ok(())
    }

    fn unlock_channels(&mut self, locks: &DmaLocks) {
        if self.locked.rx {
            locks.unlock(self.rx.id());
        }
        if self.locked.tx {
            locks.unlock(self.tx.id());
        }
        self.locked = Lanes::default();
    }

    /// Stop DMA requests and both channels
    fn halt(&mut self) {
        self.spi.set_dma_requests(false, false);
        self.rx.disable();
        self.tx.disable();
    }

    /// Program and start the message at `index`
    fn arm(&mut self, config: &SpiBusConfig) {
        let Some(message) = self.messages.get(self.index).copied() else {
            return;
        };
        let duplex = config.spi.duplex;
        let (width, frames) = match config.spi.frame_size {
            FrameSize::Bits8 => (DmaWidth::Byte, message.frames(FrameSize::Bits8)),
            FrameSize::Bits16 => (DmaWidth::HalfWord, message.frames(FrameSize::Bits16)),
        };
        let count = frames as u16;
        let direction = message.direction();

        let rx_target = match direction {
            Direction::Read | Direction::ReadWrite => Some((message.rx_ptr(), true)),
            Direction::Write if duplex.is_full() => {
                Some((&mut self.sink as *mut u16 as *mut u8, false))
            }
            Direction::Write => None,
        };
        let tx_source = match direction {
            Direction::Write | Direction::ReadWrite => Some((message.tx_ptr() as *mut u8, true)),
            Direction::Read if duplex.is_full() => {
                Some((&mut self.filler as *mut u16 as *mut u8, false))
            }
            Direction::Read => None,
        };

        self.rx.clear_flags();
        self.tx.clear_flags();
        if duplex == Duplex::HalfBidirectional {
            self.spi.set_bidi_output(direction == Direction::Write);
        }

        let peripheral = self.spi.data_register();
        if let Some((memory, memory_increment)) = rx_target {
            self.rx.configure(&DmaRequest {
                direction: DmaDirection::PeripheralToMemory,
                peripheral,
                memory,
                count,
                memory_increment,
                width,
                priority: config.dma_priority,
                tc_interrupt: true,
                te_interrupt: true,
            });
        }
        if let Some((memory, memory_increment)) = tx_source {
            self.tx.configure(&DmaRequest {
                direction: DmaDirection::MemoryToPeripheral,
                peripheral,
                memory,
                count,
                memory_increment,
                width,
                priority: config.dma_priority,
                // Receive completion ends the message whenever RX is in use
                tc_interrupt: rx_target.is_none(),
                te_interrupt: true,
            });
        }

        self.lanes = Lanes {
            rx: rx_target.is_some(),
            tx: tx_source.is_some(),
        };
        self.state = direction.into();
        trace!("spi: arm message {} ({} frames)", self.index, count);

        if self.lanes.rx {
            self.rx.enable();
        }
        if self.lanes.tx {
            self.tx.enable();
        }
        self.spi.set_dma_requests(self.lanes.rx, self.lanes.tx);
    }

    fn fail(&mut self, locks: &DmaLocks) -> Event {
        self.halt();
        self.unlock_channels(locks);
        self.state = BusState::Idle;
        self.status = BusStatus::Error;
        error!(
            "spi: transfer {} failed, errors {=u8:#x}",
            self.transfer_id.0,
            self.errors.bits()
        );
        Event::Failed { info: self.info() }
    }

    fn on_dma(&mut self, channel: Channel, config: &SpiBusConfig, locks: &DmaLocks) -> Event {
        let flags = match channel {
            Channel::Rx => self.rx.flags(),
            Channel::Tx => self.tx.flags(),
        };
        match channel {
            Channel::Rx => self.rx.clear_flags(),
            Channel::Tx => self.tx.clear_flags(),
        }

        if self.status != BusStatus::Transferring {
            return Event::None;
        }
        if flags.transfer_error {
            self.errors.insert(BusErrors::DMA);
            return self.fail(locks);
        }

        let completes = if self.lanes.rx {
            channel == Channel::Rx
        } else {
            channel == Channel::Tx
        };
        if !flags.transfer_complete || !completes {
            return Event::None;
        }

        self.halt();
        let Some(message) = self.messages.get(self.index).copied() else {
            return self.fail(locks);
        };

        if self.index + 1 < self.messages.len() {
            self.index += 1;
            if message.has_callback() {
                return Event::Advance {
                    info: self.info(),
                    message,
                };
            }
            self.arm(config);
            Event::None
        } else {
            self.unlock_channels(locks);
            self.state = BusState::Idle;
            self.status = BusStatus::Transferred;
            debug!("spi: transfer {} done", self.transfer_id.0);
            Event::Finished {
                info: self.info(),
                message,
            }
        }
    }

    fn on_spi_error(&mut self, locks: &DmaLocks) -> Event {
        let flags = self.spi.flags();
        if !flags.has_error() {
            return Event::None;
        }
        self.spi.clear_errors(flags);

        if flags.overrun {
            self.errors.insert(BusErrors::OVERRUN);
        }
        if flags.mode_fault {
            self.errors.insert(BusErrors::MODE_FAULT);
        }
        if flags.crc_error {
            self.errors.insert(BusErrors::CRC);
        }

        if self.status != BusStatus::Transferring {
            return Event::None;
        }
        self.fail(locks)
    }
}

/// SPI bus engine
///
/// Owns one SPI peripheral and its RX/TX DMA channels. The platform routes
/// the SPI and both DMA channel interrupts to [`irq_handler`](Self::irq_handler),
/// [`dma_rx_irq_handler`](Self::dma_rx_irq_handler) and
/// [`dma_tx_irq_handler`](Self::dma_tx_irq_handler), passing the listener
/// (usually a slice of every adapter on the bus). Without interrupts,
/// [`SpiTransport::poll`] services the same conditions.
pub struct SpiBus<'a, S, Rx, Tx> {
    inner: Mutex<CriticalSectionRawMutex, RefCell<Inner<S, Rx, Tx>>>,
    locks: &'a DmaLocks,
    config: SpiBusConfig,
}

impl<'a, S, Rx, Tx> SpiBus<'a, S, Rx, Tx>
where
    S: SpiPeripheral,
    Rx: DmaChannel,
    Tx: DmaChannel,
{
    /// Configure the peripheral and take over its DMA channels
    pub fn new(
        mut spi: S,
        mut rx: Rx,
        mut tx: Tx,
        locks: &'a DmaLocks,
        config: SpiBusConfig,
    ) -> Self {
        rx.deinit();
        tx.deinit();
        spi.configure(&config.spi);
        spi.set_error_interrupt(true);

        Self {
            inner: Mutex::new(RefCell::new(Inner {
                spi,
                rx,
                tx,
                messages: Vec::new(),
                index: 0,
                transfer_id: TransferId::NONE,
                status: BusStatus::Idle,
                state: BusState::Idle,
                errors: BusErrors::empty(),
                locked: Lanes::default(),
                lanes: Lanes::default(),
                filler: config.filler,
                sink: 0,
            })),
            locks,
            config,
        }
    }

    pub fn config(&self) -> &SpiBusConfig {
        &self.config
    }

    /// Direction of the message on the wire
    pub fn state(&self) -> BusState {
        self.with(|inner| inner.state)
    }

    /// SPI interrupt: overrun, mode fault and CRC errors
    pub fn irq_handler(&self, listener: &dyn TransferListener) {
        let event = self.with(|inner| inner.on_spi_error(self.locks));
        self.dispatch(event, listener);
    }

    /// Interrupt of the receive DMA channel
    pub fn dma_rx_irq_handler(&self, listener: &dyn TransferListener) {
        let event = self.with(|inner| inner.on_dma(Channel::Rx, &self.config, self.locks));
        self.dispatch(event, listener);
    }

    /// Interrupt of the transmit DMA channel
    pub fn dma_tx_irq_handler(&self, listener: &dyn TransferListener) {
        let event = self.with(|inner| inner.on_dma(Channel::Tx, &self.config, self.locks));
        self.dispatch(event, listener);
    }

    fn with<R>(&self, f: impl FnOnce(&mut Inner<S, Rx, Tx>) -> R) -> R {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }

    fn dispatch(&self, event: Event, listener: &dyn TransferListener) {
        match event {
            Event::None => {}
            Event::Advance { info, message } => {
                listener.message_complete(&info, &message);
                self.with(|inner| inner.arm(&self.config));
            }
            Event::Finished { info, message } => {
                if message.has_callback() {
                    listener.message_complete(&info, &message);
                }
                listener.transfer_complete(&info);
            }
            Event::Failed { info } => {
                listener.transfer_complete(&info);
            }
        }
    }
}

impl<S, Rx, Tx> SpiTransport for SpiBus<'_, S, Rx, Tx>
where
    S: SpiPeripheral,
    Rx: DmaChannel,
    Tx: DmaChannel,
{
    fn claim(&self, id: TransferId) -> Result<()> {
        if id == TransferId::NONE {
            return Err(Error::InvalidArgument);
        }
        self.with(|inner| {
            if inner.status == BusStatus::Transferring && inner.transfer_id != id {
                return Err(Error::Busy);
            }
            inner.transfer_id = id;
            Ok(())
        })
    }

    fn transfer_id(&self) -> TransferId {
        self.with(|inner| inner.transfer_id)
    }

    fn status(&self) -> BusStatus {
        self.with(|inner| inner.status)
    }

    fn errors(&self) -> BusErrors {
        self.with(|inner| inner.errors)
    }

    fn is_busy(&self) -> bool {
        self.with(|inner| inner.status == BusStatus::Transferring || inner.spi.flags().busy)
    }

    unsafe fn transfer(&self, messages: &[SpiMessage]) -> Result<()> {
        if messages.is_empty() || messages.len() > MAX_MESSAGES {
            return Err(Error::InvalidArgument);
        }
        let list: Vec<SpiMessage, MAX_MESSAGES> =
            Vec::from_slice(messages).map_err(|_| Error::InvalidArgument)?;
        let spi_config = self.config.spi;

        self.with(|inner| {
            if inner.status == BusStatus::Transferring || inner.spi.flags().busy {
                return Err(Error::Busy);
            }
            for message in &list {
                message.validate(spi_config.duplex, spi_config.frame_size)?;
            }
            inner.lock_channels(self.locks, Lanes::needed(spi_config.duplex, &list))?;

            inner.messages = list;
            inner.index = 0;
            inner.errors = BusErrors::empty();
            inner.status = BusStatus::Transferring;
            if spi_config.crc_polynomial.is_some() {
                inner.spi.reset_crc();
            }
            debug!(
                "spi: transfer {} start ({} messages)",
                inner.transfer_id.0,
                inner.messages.len()
            );
            inner.arm(&self.config);
            Ok(())
        })
    }

    fn transmit(&self, frame: u16) -> Result<u16> {
        self.with(|inner| {
            if inner.status == BusStatus::Transferring {
                return Err(Error::Busy);
            }
            while !inner.spi.flags().tx_empty {
                core::hint::spin_loop();
            }
            inner.spi.write_data(frame);
            while !inner.spi.flags().rx_not_empty {
                core::hint::spin_loop();
            }
            Ok(inner.spi.read_data())
        })
    }

    fn set_baud_rate(&self, rate: BaudRate) -> Result<()> {
        self.with(|inner| {
            if inner.status == BusStatus::Transferring {
                return Err(Error::Busy);
            }
            inner.spi.set_baud_rate(rate);
            Ok(())
        })
    }

    fn poll(&self, listener: &dyn TransferListener) {
        let (spi_error, rx_pending, tx_pending) = self.with(|inner| {
            (
                inner.spi.flags().has_error(),
                inner.rx.flags().is_pending(),
                inner.tx.flags().is_pending(),
            )
        });
        if spi_error {
            self.irq_handler(listener);
        }
        if rx_pending {
            self.dma_rx_irq_handler(listener);
        }
        if tx_pending {
            self.dma_tx_irq_handler(listener);
        }
    }
}
