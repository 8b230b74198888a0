//! DMA channel arbitration
//!
//! Every bus that drives DMA shares one [`DmaLocks`]. A channel is taken
//! with a non-blocking try-lock; a bus that finds one of its channels taken
//! backs off with `Busy` instead of reprogramming it.

use busline_hal::dma::DmaChannelId;
use portable_atomic::{AtomicU32, Ordering};

/// Lock bitmap for up to 32 DMA channels
pub struct DmaLocks {
    bits: AtomicU32,
}

impl Default for DmaLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl DmaLocks {
    /// All channels free
    pub const fn new() -> Self {
        Self {
            bits: AtomicU32::new(0),
        }
    }

    /// Take channel `id`, returning `false` if it is already taken
    pub fn try_lock(&self, id: DmaChannelId) -> bool {
        let Some(mask) = Self::mask(id) else {
            return false;
        };
        self.bits.fetch_or(mask, Ordering::AcqRel) & mask == 0
    }

    /// Release channel `id`
    pub fn unlock(&self, id: DmaChannelId) {
        if let Some(mask) = Self::mask(id) {
            self.bits.fetch_and(!mask, Ordering::AcqRel);
        }
    }

    /// Check whether channel `id` is taken
    pub fn is_locked(&self, id: DmaChannelId) -> bool {
        Self::mask(id).is_some_and(|mask| self.bits.load(Ordering::Acquire) & mask != 0)
    }

    fn mask(id: DmaChannelId) -> Option<u32> {
        1u32.checked_shl(u32::from(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_unlock() {
        let locks = DmaLocks::new();
        assert!(locks.try_lock(3));
        assert!(locks.is_locked(3));
        assert!(!locks.try_lock(3));
        assert!(!locks.is_locked(4));

        locks.unlock(3);
        assert!(!locks.is_locked(3));
        assert!(locks.try_lock(3));
    }

    #[test]
    fn test_out_of_range_channel() {
        let locks = DmaLocks::new();
        assert!(!locks.try_lock(32));
        assert!(!locks.is_locked(32));
        locks.unlock(32);
        assert!(locks.try_lock(31));
    }
}
