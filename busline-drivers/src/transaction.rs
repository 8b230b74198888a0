//! Per-adapter transfer bookkeeping
//!
//! Every device adapter on a shared bus follows the same sequence: refuse
//! to start while its own future is running, claim the bus for its
//! transfer id, select the device, hand the message list to the bus, and
//! finish the future from the completion callback once the id matches.
//! [`Transaction`] holds that state so adapters only describe messages.

use core::cell::RefCell;

use busline_core::spi::{BusErrors, BusStatus, SpiMessage, SpiTransport, TransferId, TransferInfo, TransferListener};
use busline_core::{Error, Future, Result};
use busline_hal::gpio::OutputPin;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

/// Transfer id, completion future and chip select of one device
pub struct Transaction<CS> {
    id: TransferId,
    future: Future<Result<()>>,
    cs: Mutex<CriticalSectionRawMutex, RefCell<CS>>,
    /// Chip select follows the transfer (low on start, high on completion)
    auto_select: bool,
}

impl<CS: OutputPin> Transaction<CS> {
    /// Create a transaction whose chip select brackets every transfer
    ///
    /// The pin is driven high (deselected).
    pub fn new(id: TransferId, cs: CS) -> Self {
        Self::with_select(id, cs, true)
    }

    /// Create a transaction that leaves chip select to the caller
    ///
    /// Used by protocols whose commands span several transfers and
    /// single-frame exchanges under one selection.
    pub fn with_manual_select(id: TransferId, cs: CS) -> Self {
        Self::with_select(id, cs, false)
    }

    fn with_select(id: TransferId, mut cs: CS, auto_select: bool) -> Self {
        cs.set_high();
        Self {
            id,
            future: Future::new(),
            cs: Mutex::new(RefCell::new(cs)),
            auto_select,
        }
    }

    /// Transfer id this device claims the bus with
    pub fn id(&self) -> TransferId {
        self.id
    }

    /// Completion future of the last started transfer
    pub fn future(&self) -> &Future<Result<()>> {
        &self.future
    }

    /// Fail with `Busy` while a transfer of this device is in flight
    pub fn check_idle(&self) -> Result<()> {
        if self.future.running() {
            return Err(Error::Busy);
        }
        Ok(())
    }

    /// Drive chip select (`true` selects the device)
    pub fn select(&self, selected: bool) {
        self.cs.lock(|cs| cs.borrow_mut().set_state(!selected));
    }

    /// Check whether the device is currently selected
    pub fn is_selected(&self) -> bool {
        self.cs.lock(|cs| cs.borrow().is_set_low())
    }

    /// Claim `bus`, select the device and start `messages`
    ///
    /// On failure the device is deselected again and the future returns
    /// to idle.
    ///
    /// # Safety
    ///
    /// Same contract as [`SpiTransport::transfer`]: the buffers behind
    /// `messages` must stay valid and untouched until the future is done.
    pub unsafe fn start<B: SpiTransport + ?Sized>(&self, bus: &B, messages: &[SpiMessage]) -> Result<()> {
        self.check_idle()?;
        bus.claim(self.id)?;

        if self.auto_select {
            self.select(true);
        }
        self.future.start();

        if let Err(e) = bus.transfer(messages) {
            if self.auto_select {
                self.select(false);
            }
            self.future.init();
            return Err(e);
        }
        Ok(())
    }

    /// Spin on the future while servicing `bus` with `listener`
    pub fn wait<B: SpiTransport + ?Sized>(&self, bus: &B, listener: &dyn TransferListener) -> Result<()> {
        bus.wait(&self.future, listener).unwrap_or(Err(Error::Io))
    }

    /// Handle a bus completion
    ///
    /// Returns `false`, touching nothing, if the transfer belongs to
    /// another device.
    pub fn complete(&self, info: &TransferInfo) -> bool {
        if info.transfer_id != self.id || !self.future.running() {
            return false;
        }
        if self.auto_select {
            self.select(false);
        }
        self.future.finish(outcome(info));
        true
    }
}

/// Map a finished transfer to the adapter result
pub fn outcome(info: &TransferInfo) -> Result<()> {
    match info.status {
        BusStatus::Transferred => Ok(()),
        _ if info.errors.contains(BusErrors::CRC) => Err(Error::Crc),
        _ => Err(Error::Io),
    }
}
