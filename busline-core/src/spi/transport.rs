//! Bus interface used by the device adapters

use busline_hal::spi::BaudRate;

use super::bus::{BusErrors, BusStatus, TransferId};
use super::listener::TransferListener;
use super::message::SpiMessage;
use crate::error::Result;
use crate::future::Future;

/// Shared SPI bus as seen by a device adapter
///
/// All methods take `&self`: the same bus is used by several adapters and
/// by the interrupt handlers.
pub trait SpiTransport {
    /// Take ownership of the bus for transfer `id`
    ///
    /// Fails with `Busy` while a transfer owned by a different id is in
    /// flight. Claiming is cooperative: it does not stop other callers.
    fn claim(&self, id: TransferId) -> Result<()>;

    /// Owner of the current or last transfer
    fn transfer_id(&self) -> TransferId;

    fn status(&self) -> BusStatus;

    fn errors(&self) -> BusErrors;

    /// Check whether a transfer is in flight or the peripheral is busy
    fn is_busy(&self) -> bool;

    /// Start executing `messages` and return immediately
    ///
    /// # Safety
    ///
    /// Every buffer referenced by `messages` must stay valid, and must not
    /// be accessed by the caller, until the bus reports completion through
    /// [`TransferListener::transfer_complete`]. The bus itself must not be
    /// moved during that time.
    unsafe fn transfer(&self, messages: &[SpiMessage]) -> Result<()>;

    /// Exchange one frame synchronously, without DMA
    fn transmit(&self, frame: u16) -> Result<u16>;

    /// Change the clock prescaler between transfers
    fn set_baud_rate(&self, rate: BaudRate) -> Result<()>;

    /// Service whichever interrupt condition is pending
    fn poll(&self, listener: &dyn TransferListener);

    /// Spin until `future` stops running, servicing the bus meanwhile
    fn wait<T: Copy>(&self, future: &Future<T>, listener: &dyn TransferListener) -> Option<T> {
        future.wait_with(|| self.poll(listener))
    }
}
