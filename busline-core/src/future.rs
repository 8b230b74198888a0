//! Single-slot completion primitive
//!
//! A [`Future`] is started by the foreground when it hands work to the
//! interrupt side, and finished by the interrupt side with a result. The
//! foreground then spins on it. There is no waker and no executor: on a
//! target without an OS the spin is the suspension point.
//!
//! State transitions happen inside a critical section, so an observer
//! never sees `running` and `done` both set, and `done` is only visible
//! once the result is stored.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use portable_atomic::{AtomicBool, Ordering};

/// Completion slot shared between foreground and interrupt context
pub struct Future<T> {
    running: AtomicBool,
    done: AtomicBool,
    result: Mutex<CriticalSectionRawMutex, Cell<Option<T>>>,
}

impl<T: Copy> Default for Future<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> Future<T> {
    /// Create an idle future
    pub const fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            done: AtomicBool::new(false),
            result: Mutex::new(Cell::new(None)),
        }
    }

    /// Return to the idle state, dropping any stored result
    pub fn init(&self) {
        self.result.lock(|slot| {
            slot.set(None);
            self.done.store(false, Ordering::Release);
            self.running.store(false, Ordering::Release);
        });
    }

    /// Mark work as handed off
    pub fn start(&self) {
        self.result.lock(|slot| {
            slot.set(None);
            self.done.store(false, Ordering::Release);
            self.running.store(true, Ordering::Release);
        });
    }

    /// Store the result and mark the work complete
    pub fn finish(&self, result: T) {
        self.result.lock(|slot| {
            slot.set(Some(result));
            self.running.store(false, Ordering::Release);
            self.done.store(true, Ordering::Release);
        });
    }

    /// Check whether work is in flight
    pub fn running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Check whether a result is available
    pub fn done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Stored result, `None` until finished
    pub fn result(&self) -> Option<T> {
        self.result.lock(|slot| slot.get())
    }

    /// Spin until the work completes
    ///
    /// Never returns if nothing finishes the future.
    pub fn wait(&self) -> Option<T> {
        self.wait_with(core::hint::spin_loop)
    }

    /// Spin until the work completes, calling `idle` on every turn
    pub fn wait_with(&self, mut idle: impl FnMut()) -> Option<T> {
        while self.running() {
            idle();
        }
        self.result()
    }
}
