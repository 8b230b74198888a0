//! Simulated GPIO lines

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use busline_hal::gpio::OutputPin;

use crate::{SimEvent, State};

enum Role {
    ChipSelect(usize),
    Plain(u8),
}

/// Output line of a [`SimHardware`](crate::SimHardware)
///
/// A chip-select line selects its slave while low.
pub struct SimPin {
    state: Rc<RefCell<State>>,
    role: Role,
    level: Rc<Cell<bool>>,
}

impl SimPin {
    pub(crate) fn chip_select(state: Rc<RefCell<State>>, slave: usize) -> Self {
        Self {
            state,
            role: Role::ChipSelect(slave),
            level: Rc::new(Cell::new(true)),
        }
    }

    pub(crate) fn plain(state: Rc<RefCell<State>>, pin: u8, initial_high: bool) -> Self {
        Self {
            state,
            role: Role::Plain(pin),
            level: Rc::new(Cell::new(initial_high)),
        }
    }

    /// Read-only view of the line level, usable from slave models
    pub fn probe(&self) -> PinProbe {
        PinProbe(self.level.clone())
    }

    fn drive(&mut self, high: bool) {
        self.level.set(high);
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        match self.role {
            Role::ChipSelect(slave) => {
                let selected = !high;
                let attached = &mut state.slaves[slave];
                if attached.selected != selected {
                    attached.selected = selected;
                    attached.device.select(selected);
                    state.events.push(SimEvent::Select { slave, selected });
                }
            }
            Role::Plain(pin) => state.events.push(SimEvent::Pin { pin, high }),
        }
    }
}

impl OutputPin for SimPin {
    fn set_high(&mut self) {
        self.drive(true);
    }

    fn set_low(&mut self) {
        self.drive(false);
    }

    fn is_set_high(&self) -> bool {
        self.level.get()
    }
}

/// Shared view of a [`SimPin`] level
#[derive(Clone)]
pub struct PinProbe(Rc<Cell<bool>>);

impl PinProbe {
    /// Check if the line is high
    pub fn is_high(&self) -> bool {
        self.0.get()
    }
}
