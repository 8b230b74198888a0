//! M95xxx SPI EEPROM driver
//!
//! Serial EEPROMs of the ST M95 family (M95040 to M95M02 and compatibles).
//! Every access is one bus transfer: an instruction with its address
//! bytes followed by the data phase.
//!
//! # Instruction format
//!
//! ```text
//! ┌─────────┬──────────────────┬──────────────┐
//! │ opcode  │ address (1-3 B)  │ data ...     │
//! └─────────┴──────────────────┴──────────────┘
//! ```
//!
//! Parts with 9 address bits (M95040) carry A8 in bit 3 of the opcode.
//!
//! Writes are limited to one page and need the write enable latch set
//! beforehand; [`M95x::write`] splits on page boundaries and waits out the
//! internal write cycle of every page.

use core::cell::RefCell;

use busline_core::spi::{SpiMessage, SpiTransport, TransferId, TransferInfo, TransferListener};
use busline_core::{Error, Future, Result};
use busline_hal::gpio::OutputPin;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::transaction::Transaction;

/// Instruction opcodes
pub mod instruction {
    /// Set the write enable latch
    pub const WREN: u8 = 0x06;
    /// Reset the write enable latch
    pub const WRDI: u8 = 0x04;
    /// Read the status register
    pub const RDSR: u8 = 0x05;
    /// Write the status register
    pub const WRSR: u8 = 0x01;
    /// Read from memory
    pub const READ: u8 = 0x03;
    /// Write to memory (within one page)
    pub const WRITE: u8 = 0x02;
    /// Opcode bit carrying A8 on 9-bit address parts
    pub const A8: u8 = 0x08;
}

/// Device geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct M95xConfig {
    /// Memory size in bytes
    pub capacity: u32,
    /// Write page size in bytes
    pub page_size: u16,
    /// Address bytes after the opcode (1, 2 or 3)
    pub address_bytes: u8,
    /// Status polls before a write cycle is considered stuck
    pub write_poll_limit: u32,
}

impl Default for M95xConfig {
    /// M95256: 32 KiB, 64-byte pages
    fn default() -> Self {
        Self {
            capacity: 32 * 1024,
            page_size: 64,
            address_bytes: 2,
            write_poll_limit: 10_000,
        }
    }
}

impl M95xConfig {
    /// M95040: 512 bytes, 16-byte pages, A8 in the opcode
    pub fn m95040() -> Self {
        Self {
            capacity: 512,
            page_size: 16,
            address_bytes: 1,
            ..Self::default()
        }
    }

    /// M95M01: 128 KiB, 256-byte pages, 3 address bytes
    pub fn m95m01() -> Self {
        Self {
            capacity: 128 * 1024,
            page_size: 256,
            address_bytes: 3,
            ..Self::default()
        }
    }

    fn is_valid(&self) -> bool {
        matches!(self.address_bytes, 1..=3) && self.page_size > 0 && self.capacity > 0
    }
}

/// Decoded status register
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct M95xStatus {
    /// Internal write cycle in progress (WIP)
    pub write_in_progress: bool,
    /// Write enable latch (WEL)
    pub write_enable_latch: bool,
    /// Block protect bits BP1:BP0
    pub block_protect: u8,
    /// Status register write disable (SRWD)
    pub status_reg_write_protect: bool,
}

impl M95xStatus {
    /// Decode the raw status register
    pub fn from_register(value: u8) -> Self {
        Self {
            write_in_progress: value & 0x01 != 0,
            write_enable_latch: value & 0x02 != 0,
            block_protect: (value >> 2) & 0x03,
            status_reg_write_protect: value & 0x80 != 0,
        }
    }

    /// Encode the writable fields (BP1:BP0 and SRWD)
    pub fn to_register(&self) -> u8 {
        ((self.block_protect & 0x03) << 2) | if self.status_reg_write_protect { 0x80 } else { 0 }
    }
}

/// Instruction and address bytes of the current operation
struct Scratch {
    header: [u8; 4],
    status: [u8; 1],
}

/// M95xxx EEPROM on a shared SPI bus
pub struct M95x<'a, B, CS> {
    bus: &'a B,
    transaction: Transaction<CS>,
    config: M95xConfig,
    scratch: Mutex<CriticalSectionRawMutex, RefCell<Scratch>>,
}

impl<'a, B, CS> M95x<'a, B, CS>
where
    B: SpiTransport,
    CS: OutputPin,
{
    /// Create a driver for the EEPROM behind `cs`
    pub fn new(bus: &'a B, id: TransferId, cs: CS, config: M95xConfig) -> Self {
        Self {
            bus,
            transaction: Transaction::new(id, cs),
            config,
            scratch: Mutex::new(RefCell::new(Scratch {
                header: [0; 4],
                status: [0xFF],
            })),
        }
    }

    pub fn config(&self) -> &M95xConfig {
        &self.config
    }

    /// Completion future of the last started operation
    pub fn future(&self) -> &Future<Result<()>> {
        self.transaction.future()
    }

    /// Start reading `data.len()` bytes from `address`
    ///
    /// # Safety
    ///
    /// `data` must stay valid and untouched, and the driver must not be
    /// moved, until [`future`](Self::future) is done.
    pub unsafe fn begin_read(&self, address: u32, data: &mut [u8]) -> Result<()> {
        self.check_range(address, data.len())?;
        self.transaction.check_idle()?;
        let header = self.header(instruction::READ, address);
        self.transaction
            .start(self.bus, &[header, SpiMessage::read(data)])
    }

    /// Read `data.len()` bytes from `address`
    pub fn read(&self, address: u32, data: &mut [u8]) -> Result<()> {
        // SAFETY: `data` is borrowed until the transfer has finished.
        unsafe { self.begin_read(address, data)? };
        self.wait()
    }

    /// Start a single-instruction transfer (WREN, WRDI)
    ///
    /// # Safety
    ///
    /// The driver must not be moved until the future is done.
    pub unsafe fn begin_instruction(&self, opcode: u8) -> Result<()> {
        self.transaction.check_idle()?;
        let header = self.fill_header(|h| {
            h[0] = opcode;
            1
        });
        self.transaction.start(self.bus, &[header])
    }

    /// Set the write enable latch
    pub fn write_enable(&self) -> Result<()> {
        // SAFETY: the instruction lives in the driver, which is borrowed
        // until the transfer has finished.
        unsafe { self.begin_instruction(instruction::WREN)? };
        self.wait()
    }

    /// Reset the write enable latch
    pub fn write_disable(&self) -> Result<()> {
        // SAFETY: as in `write_enable`.
        unsafe { self.begin_instruction(instruction::WRDI)? };
        self.wait()
    }

    /// Start reading the status register
    ///
    /// The value is available from [`last_status`](Self::last_status) once
    /// the future is done.
    ///
    /// # Safety
    ///
    /// The driver must not be moved until the future is done.
    pub unsafe fn begin_read_status(&self) -> Result<()> {
        self.transaction.check_idle()?;
        let header = self.fill_header(|h| {
            h[0] = instruction::RDSR;
            1
        });
        let status = self.scratch.lock(|s| {
            let mut s = s.borrow_mut();
            s.status[0] = 0xFF;
            SpiMessage::read(&mut s.status)
        });
        self.transaction.start(self.bus, &[header, status])
    }

    /// Status register as read by the last status read
    pub fn last_status(&self) -> M95xStatus {
        M95xStatus::from_register(self.scratch.lock(|s| s.borrow().status[0]))
    }

    /// Read and decode the status register
    pub fn read_status(&self) -> Result<M95xStatus> {
        // SAFETY: as in `write_enable`.
        unsafe { self.begin_read_status()? };
        self.wait()?;
        Ok(self.last_status())
    }

    /// Start writing the status register
    ///
    /// The write enable latch must be set.
    ///
    /// # Safety
    ///
    /// The driver must not be moved until the future is done.
    pub unsafe fn begin_write_status(&self, status: M95xStatus) -> Result<()> {
        self.transaction.check_idle()?;
        let header = self.fill_header(|h| {
            h[0] = instruction::WRSR;
            h[1] = status.to_register();
            2
        });
        self.transaction.start(self.bus, &[header])
    }

    /// Write the block protect and SRWD bits, then wait for the write cycle
    pub fn write_status(&self, status: M95xStatus) -> Result<()> {
        self.write_enable()?;
        // SAFETY: as in `write_enable`.
        unsafe { self.begin_write_status(status)? };
        self.wait()?;
        self.wait_write_cycle()
    }

    /// Start programming `data` at `address`
    ///
    /// The range must not cross a page boundary and the write enable latch
    /// must be set. The device starts its internal write cycle when the
    /// transfer ends.
    ///
    /// # Safety
    ///
    /// `data` must stay valid, and the driver must not be moved, until
    /// [`future`](Self::future) is done.
    pub unsafe fn begin_write(&self, address: u32, data: &[u8]) -> Result<()> {
        self.check_range(address, data.len())?;
        let page = u32::from(self.config.page_size);
        let offset = address % page;
        if offset + data.len() as u32 > page {
            return Err(Error::InvalidArgument);
        }
        self.transaction.check_idle()?;
        let header = self.header(instruction::WRITE, address);
        self.transaction
            .start(self.bus, &[header, SpiMessage::write(data)])
    }

    /// Write `data` at `address`, one page at a time
    ///
    /// Sets the write enable latch before every page and polls the status
    /// register until each write cycle ends.
    pub fn write(&self, address: u32, data: &[u8]) -> Result<()> {
        self.check_range(address, data.len())?;
        let page = u32::from(self.config.page_size);

        let mut address = address;
        let mut rest = data;
        while !rest.is_empty() {
            let room = (page - address % page) as usize;
            let (chunk, tail) = rest.split_at(room.min(rest.len()));

            self.write_enable()?;
            // SAFETY: `chunk` is borrowed until the transfer has finished.
            unsafe { self.begin_write(address, chunk)? };
            self.wait()?;
            self.wait_write_cycle()?;

            address += chunk.len() as u32;
            rest = tail;
        }
        Ok(())
    }

    /// Poll the status register until the write cycle ends
    pub fn wait_write_cycle(&self) -> Result<()> {
        for _ in 0..self.config.write_poll_limit {
            if !self.read_status()?.write_in_progress {
                return Ok(());
            }
        }
        warn!("m95x: write cycle did not end after {=u32} polls", self.config.write_poll_limit);
        Err(Error::Timeout)
    }

    fn wait(&self) -> Result<()> {
        self.transaction.wait(self.bus, self)
    }

    fn check_range(&self, address: u32, len: usize) -> Result<()> {
        if !self.config.is_valid() || len == 0 {
            return Err(Error::InvalidArgument);
        }
        let end = u32::try_from(len)
            .ok()
            .and_then(|len| address.checked_add(len));
        match end {
            Some(end) if end <= self.config.capacity => Ok(()),
            _ => Err(Error::InvalidArgument),
        }
    }

    /// Opcode and address bytes as a write message
    fn header(&self, opcode: u8, address: u32) -> SpiMessage {
        let width = self.config.address_bytes;
        self.fill_header(|h| {
            match width {
                1 => {
                    h[0] = opcode | if address & 0x100 != 0 { instruction::A8 } else { 0 };
                    h[1] = address as u8;
                }
                2 => {
                    h[0] = opcode;
                    h[1..3].copy_from_slice(&(address as u16).to_be_bytes());
                }
                _ => {
                    h[0] = opcode;
                    h[1..4].copy_from_slice(&address.to_be_bytes()[1..]);
                }
            }
            1 + usize::from(width)
        })
    }

    fn fill_header(&self, fill: impl FnOnce(&mut [u8; 4]) -> usize) -> SpiMessage {
        self.scratch.lock(|s| {
            let mut s = s.borrow_mut();
            let len = fill(&mut s.header);
            SpiMessage::write(&s.header[..len])
        })
    }
}

impl<B, CS> TransferListener for M95x<'_, B, CS>
where
    B: SpiTransport,
    CS: OutputPin,
{
    fn transfer_complete(&self, info: &TransferInfo) -> bool {
        self.transaction.complete(info)
    }
}
