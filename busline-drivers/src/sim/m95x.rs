//! M95xxx EEPROM model

use busline_hal_sim::SpiSlave;

use crate::m95x::instruction;

enum Phase {
    Opcode,
    Address { opcode: u8, address: u32, left: u8 },
    Read { address: u32 },
    Write { start: u32, address: u32, count: u32 },
    Status,
    WriteStatus,
    Ignore,
}

/// EEPROM behind one chip select
pub struct EepromModel {
    pub memory: Vec<u8>,
    page_size: u32,
    address_bytes: u8,
    /// WEL
    write_enabled: bool,
    /// BP1:BP0 and SRWD as stored
    status: u8,
    /// Status polls answered with WIP set after a write cycle starts
    pub busy_polls: u32,
    busy_left: u32,
    phase: Phase,
    current: Vec<u8>,
    /// MOSI bytes of every selection
    pub transactions: Vec<Vec<u8>>,
    /// (address, length) of every committed page write
    pub page_writes: Vec<(u32, u32)>,
    pending_write: Option<(u32, u32)>,
    pending_status: Option<u8>,
}

impl EepromModel {
    pub fn new(capacity: usize, page_size: u32, address_bytes: u8) -> Self {
        Self {
            memory: vec![0xFF; capacity],
            page_size,
            address_bytes,
            write_enabled: false,
            status: 0,
            busy_polls: 0,
            busy_left: 0,
            phase: Phase::Opcode,
            current: Vec::new(),
            transactions: Vec::new(),
            page_writes: Vec::new(),
            pending_write: None,
            pending_status: None,
        }
    }

    fn status_register(&self) -> u8 {
        let wip = self.busy_left > 0;
        self.status | if self.write_enabled { 0x02 } else { 0 } | u8::from(wip)
    }

    fn index(&self, address: u32) -> usize {
        address as usize % self.memory.len()
    }
}

impl SpiSlave for EepromModel {
    fn exchange(&mut self, mosi: u8) -> u8 {
        self.current.push(mosi);
        let busy = self.busy_left > 0;
        match self.phase {
            Phase::Opcode => {
                let opcode = mosi & !instruction::A8;
                self.phase = match opcode {
                    instruction::RDSR => Phase::Status,
                    _ if busy => Phase::Ignore,
                    instruction::WREN => {
                        self.write_enabled = true;
                        Phase::Ignore
                    }
                    instruction::WRDI => {
                        self.write_enabled = false;
                        Phase::Ignore
                    }
                    instruction::WRSR => Phase::WriteStatus,
                    instruction::READ | instruction::WRITE => {
                        let a8 = if self.address_bytes == 1 && mosi & instruction::A8 != 0 {
                            0x100
                        } else {
                            0
                        };
                        Phase::Address {
                            opcode,
                            address: a8,
                            left: self.address_bytes,
                        }
                    }
                    _ => Phase::Ignore,
                };
                0xFF
            }
            Phase::Address { opcode, address, left } => {
                let address = if self.address_bytes == 1 {
                    address | u32::from(mosi)
                } else {
                    (address << 8) | u32::from(mosi)
                };
                self.phase = match (left, opcode) {
                    (1, instruction::READ) => Phase::Read { address },
                    (1, _) => Phase::Write {
                        start: address,
                        address,
                        count: 0,
                    },
                    _ => Phase::Address {
                        opcode,
                        address,
                        left: left - 1,
                    },
                };
                0xFF
            }
            Phase::Read { address } => {
                let byte = self.memory[self.index(address)];
                self.phase = Phase::Read { address: address + 1 };
                byte
            }
            Phase::Write { start, address, count } => {
                if self.write_enabled {
                    // Wraps within the page like the real part
                    let page = start - start % self.page_size;
                    let offset = (address - page) % self.page_size;
                    let index = self.index(page + offset);
                    self.memory[index] = mosi;
                    self.pending_write = Some((start, count + 1));
                }
                self.phase = Phase::Write {
                    start,
                    address: address + 1,
                    count: count + 1,
                };
                0xFF
            }
            Phase::Status => {
                let value = self.status_register();
                self.busy_left = self.busy_left.saturating_sub(1);
                value
            }
            Phase::WriteStatus => {
                if self.write_enabled {
                    self.pending_status = Some(mosi & 0x8C);
                }
                self.phase = Phase::Ignore;
                0xFF
            }
            Phase::Ignore => 0xFF,
        }
    }

    fn select(&mut self, selected: bool) {
        if selected {
            self.phase = Phase::Opcode;
            self.current.clear();
            return;
        }
        self.transactions.push(std::mem::take(&mut self.current));
        // A write cycle starts on deselect
        let write = self.pending_write.take();
        let status = self.pending_status.take();
        if write.is_some() || status.is_some() {
            if let Some(write) = write {
                self.page_writes.push(write);
            }
            if let Some(status) = status {
                self.status = status;
            }
            self.write_enabled = false;
            self.busy_left = self.busy_polls;
        }
    }
}
