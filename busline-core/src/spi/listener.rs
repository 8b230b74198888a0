//! Completion notifications

use super::bus::{BusErrors, BusStatus, TransferId};
use super::message::SpiMessage;

/// Snapshot of the bus taken when a notification fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransferInfo {
    /// Owner of the transfer
    pub transfer_id: TransferId,
    /// Bus status at the time of the notification
    pub status: BusStatus,
    /// Errors accumulated during the transfer
    pub errors: BusErrors,
}

/// Receiver of bus notifications
///
/// Called from interrupt context (or from `poll`), never while the bus
/// state is borrowed, so implementations may query the bus.
pub trait TransferListener {
    /// A message that requested a callback has finished
    ///
    /// Runs before the next message is armed.
    fn message_complete(&self, _info: &TransferInfo, _message: &SpiMessage) {}

    /// The transfer ended, successfully or not
    ///
    /// Returns `true` if the completion belonged to this listener.
    fn transfer_complete(&self, info: &TransferInfo) -> bool;
}

impl TransferListener for () {
    fn transfer_complete(&self, _info: &TransferInfo) -> bool {
        false
    }
}

/// Fan out to several listeners sharing one bus
///
/// Message notifications go to every listener; each filters on the
/// transfer id. The transfer completion stops at the first listener that
/// claims it.
impl TransferListener for [&dyn TransferListener] {
    fn message_complete(&self, info: &TransferInfo, message: &SpiMessage) {
        for listener in self {
            listener.message_complete(info, message);
        }
    }

    fn transfer_complete(&self, info: &TransferInfo) -> bool {
        self.iter().any(|listener| listener.transfer_complete(info))
    }
}

impl<const N: usize> TransferListener for [&dyn TransferListener; N] {
    fn message_complete(&self, info: &TransferInfo, message: &SpiMessage) {
        self.as_slice().message_complete(info, message)
    }

    fn transfer_complete(&self, info: &TransferInfo) -> bool {
        self.as_slice().transfer_complete(info)
    }
}
