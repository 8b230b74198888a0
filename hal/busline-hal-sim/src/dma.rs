//! Simulated DMA channels

use std::cell::RefCell;
use std::rc::Rc;

use busline_hal::dma::{DmaChannel, DmaChannelId, DmaFlags, DmaRequest, DmaWidth};

use crate::State;

/// DMA channel handle of a [`SimHardware`](crate::SimHardware)
pub struct SimDmaChannel {
    state: Rc<RefCell<State>>,
    id: DmaChannelId,
}

impl SimDmaChannel {
    pub(crate) fn new(state: Rc<RefCell<State>>, id: DmaChannelId) -> Self {
        Self { state, id }
    }
}

impl DmaChannel for SimDmaChannel {
    fn id(&self) -> DmaChannelId {
        self.id
    }

    fn configure(&mut self, request: &DmaRequest) {
        let mut state = self.state.borrow_mut();
        let ch = state.channels.entry(self.id).or_default();
        ch.request = Some(*request);
        ch.remaining = request.count;
    }

    fn enable(&mut self) {
        let mut state = self.state.borrow_mut();
        state.channels.entry(self.id).or_default().enabled = true;
        state.run_dma();
    }

    fn disable(&mut self) {
        let mut state = self.state.borrow_mut();
        state.channels.entry(self.id).or_default().enabled = false;
    }

    fn flags(&self) -> DmaFlags {
        self.state
            .borrow()
            .channels
            .get(&self.id)
            .map(|ch| ch.flags)
            .unwrap_or_default()
    }

    fn clear_flags(&mut self) {
        let mut state = self.state.borrow_mut();
        state.channels.entry(self.id).or_default().flags = DmaFlags::default();
    }

    fn remaining(&self) -> u16 {
        self.state
            .borrow()
            .channels
            .get(&self.id)
            .map(|ch| ch.remaining)
            .unwrap_or(0)
    }

    fn deinit(&mut self) {
        let mut state = self.state.borrow_mut();
        let ch = state.channels.entry(self.id).or_default();
        ch.request = None;
        ch.enabled = false;
        ch.flags = DmaFlags::default();
        ch.remaining = 0;
    }
}

/// Read frame `index` of a memory-to-peripheral request
///
/// # Safety
///
/// `request.memory` must be valid for reads of the whole request.
pub(crate) unsafe fn read_frame(request: &DmaRequest, index: usize) -> u16 {
    let index = if request.memory_increment { index } else { 0 };
    match request.width {
        DmaWidth::Byte => *request.memory.add(index) as u16,
        DmaWidth::HalfWord => (request.memory.add(index * 2) as *const u16).read_unaligned(),
    }
}

/// Store frame `index` of a peripheral-to-memory request
///
/// # Safety
///
/// `request.memory` must be valid for writes of the whole request.
pub(crate) unsafe fn write_frame(request: &DmaRequest, index: usize, frame: u16) {
    let index = if request.memory_increment { index } else { 0 };
    match request.width {
        DmaWidth::Byte => *request.memory.add(index) = frame as u8,
        DmaWidth::HalfWord => (request.memory.add(index * 2) as *mut u16).write_unaligned(frame),
    }
}
