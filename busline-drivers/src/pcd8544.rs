//! PCD8544 LCD controller driver
//!
//! 84x48 monochrome controller found in Nokia 5110/3310 modules. Display
//! RAM is organized in 6 banks of 84 columns; each byte is a vertical
//! strip of 8 pixels, LSB on top.
//!
//! The D/C line tells the controller whether a byte is a command (low) or
//! display data (high). A positioned write is one bus transfer of two
//! messages: the address commands, then the pixel data. The command
//! message requests a callback, and the driver raises D/C from it before
//! the bus arms the data message.

use core::cell::RefCell;

use busline_core::spi::{SpiMessage, SpiTransport, TransferId, TransferInfo, TransferListener};
use busline_core::{Error, Future, Result};
use busline_hal::delay::DelayNs;
use busline_hal::gpio::OutputPin;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::transaction::Transaction;

/// Columns
pub const WIDTH: usize = 84;
/// Rows
pub const HEIGHT: usize = 48;
/// 8-pixel rows of display RAM
pub const BANKS: usize = HEIGHT / 8;
/// Bytes of display RAM
pub const FRAME_LEN: usize = WIDTH * BANKS;

/// Longest command sequence sent in one transfer
const MAX_COMMANDS: usize = 8;

/// Sender tag of the address phase of a data write
const ADDRESS_PHASE: u32 = 0x8544;

/// Command bytes
pub mod command {
    /// Function set: `| POWER_DOWN | VERTICAL | EXTENDED`
    pub const FUNCTION_SET: u8 = 0x20;
    pub const POWER_DOWN: u8 = 0x04;
    pub const VERTICAL: u8 = 0x02;
    pub const EXTENDED: u8 = 0x01;

    /// Display control (basic set): `| mode bits`
    pub const DISPLAY_CONTROL: u8 = 0x08;
    /// Y address (bank) 0..=5 (basic set)
    pub const SET_Y: u8 = 0x40;
    /// X address 0..=83 (basic set)
    pub const SET_X: u8 = 0x80;

    /// Temperature coefficient 0..=3 (extended set)
    pub const TEMP_CONTROL: u8 = 0x04;
    /// Bias system 0..=7 (extended set)
    pub const BIAS: u8 = 0x10;
    /// Operating voltage 0..=127 (extended set)
    pub const SET_VOP: u8 = 0x80;
}

static BLANK: [u8; FRAME_LEN] = [0; FRAME_LEN];

/// Display modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DisplayMode {
    /// All pixels off
    Blank,
    /// RAM contents shown
    Normal,
    /// All pixels on
    AllOn,
    /// RAM contents inverted
    Inverse,
}

impl DisplayMode {
    /// D and E bits of the display control command
    pub fn bits(self) -> u8 {
        match self {
            DisplayMode::Blank => 0x00,
            DisplayMode::Normal => 0x04,
            DisplayMode::AllOn => 0x01,
            DisplayMode::Inverse => 0x05,
        }
    }
}

/// Panel configuration applied by [`Pcd8544::init`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pcd8544Config {
    /// Operating voltage (contrast), 0..=127
    pub contrast: u8,
    /// Bias system, 0..=7
    pub bias: u8,
    /// Temperature coefficient, 0..=3
    pub temperature_coefficient: u8,
    /// Reset pulse length in microseconds
    pub reset_pulse_us: u32,
}

impl Default for Pcd8544Config {
    fn default() -> Self {
        Self {
            contrast: 0x38,
            bias: 0x04,
            temperature_coefficient: 0,
            reset_pulse_us: 1_000,
        }
    }
}

struct Scratch {
    commands: [u8; MAX_COMMANDS],
}

/// PCD8544 on a shared SPI bus
pub struct Pcd8544<'a, B, CS, DC, RST> {
    bus: &'a B,
    transaction: Transaction<CS>,
    dc: Mutex<CriticalSectionRawMutex, RefCell<DC>>,
    rst: Mutex<CriticalSectionRawMutex, RefCell<RST>>,
    config: Pcd8544Config,
    scratch: Mutex<CriticalSectionRawMutex, RefCell<Scratch>>,
}

impl<'a, B, CS, DC, RST> Pcd8544<'a, B, CS, DC, RST>
where
    B: SpiTransport,
    CS: OutputPin,
    DC: OutputPin,
    RST: OutputPin,
{
    /// Create a driver; the controller is left untouched until [`init`](Self::init)
    pub fn new(bus: &'a B, id: TransferId, cs: CS, dc: DC, mut rst: RST, config: Pcd8544Config) -> Self {
        rst.set_high();
        Self {
            bus,
            transaction: Transaction::new(id, cs),
            dc: Mutex::new(RefCell::new(dc)),
            rst: Mutex::new(RefCell::new(rst)),
            config,
            scratch: Mutex::new(RefCell::new(Scratch {
                commands: [0; MAX_COMMANDS],
            })),
        }
    }

    pub fn config(&self) -> &Pcd8544Config {
        &self.config
    }

    /// Completion future of the last started operation
    pub fn future(&self) -> &Future<Result<()>> {
        self.transaction.future()
    }

    /// Pulse the reset line
    pub fn reset(&self, delay: &mut impl DelayNs) -> Result<()> {
        self.transaction.check_idle()?;
        self.rst.lock(|rst| rst.borrow_mut().set_low());
        delay.delay_us(self.config.reset_pulse_us);
        self.rst.lock(|rst| rst.borrow_mut().set_high());
        Ok(())
    }

    /// Reset the controller and apply the configured contrast, bias and
    /// temperature coefficient, leaving the display in normal mode
    pub fn init(&self, delay: &mut impl DelayNs) -> Result<()> {
        self.reset(delay)?;
        let config = &self.config;
        self.command(&[
            command::FUNCTION_SET | command::EXTENDED,
            command::SET_VOP | (config.contrast & 0x7F),
            command::TEMP_CONTROL | (config.temperature_coefficient & 0x03),
            command::BIAS | (config.bias & 0x07),
            command::FUNCTION_SET,
            command::DISPLAY_CONTROL | DisplayMode::Normal.bits(),
        ])
    }

    /// Start sending raw command bytes
    ///
    /// # Safety
    ///
    /// The driver must not be moved until the future is done.
    pub unsafe fn begin_command(&self, commands: &[u8]) -> Result<()> {
        if commands.is_empty() || commands.len() > MAX_COMMANDS {
            return Err(Error::InvalidArgument);
        }
        self.transaction.check_idle()?;
        let message = self.fill_commands(commands);
        self.set_data_mode(false);
        self.transaction.start(self.bus, &[message])
    }

    /// Send raw command bytes
    pub fn command(&self, commands: &[u8]) -> Result<()> {
        // SAFETY: the commands are copied into the driver, which is
        // borrowed until the transfer has finished.
        unsafe { self.begin_command(commands)? };
        self.wait()
    }

    /// Start writing `data` to display RAM at column `x`, bank `y`
    ///
    /// The address pointer advances horizontally and wraps to the next
    /// bank, so `data` may span several banks.
    ///
    /// # Safety
    ///
    /// `data` must stay valid, and the driver must not be moved, until
    /// [`future`](Self::future) is done.
    pub unsafe fn begin_write(&self, x: u8, y: u8, data: &[u8]) -> Result<()> {
        let (x, y) = (usize::from(x), usize::from(y));
        if x >= WIDTH || y >= BANKS || data.is_empty() || data.len() > FRAME_LEN - (y * WIDTH + x) {
            return Err(Error::InvalidArgument);
        }
        self.transaction.check_idle()?;

        let address = self
            .fill_commands(&[command::SET_Y | y as u8, command::SET_X | x as u8])
            .with_callback()
            .with_sender(ADDRESS_PHASE);
        self.set_data_mode(false);
        self.transaction
            .start(self.bus, &[address, SpiMessage::write(data)])
    }

    /// Write `data` to display RAM at column `x`, bank `y`
    pub fn write(&self, x: u8, y: u8, data: &[u8]) -> Result<()> {
        // SAFETY: `data` is borrowed until the transfer has finished.
        unsafe { self.begin_write(x, y, data)? };
        self.wait()
    }

    /// Set the operating voltage
    pub fn set_contrast(&self, contrast: u8) -> Result<()> {
        self.command(&[
            command::FUNCTION_SET | command::EXTENDED,
            command::SET_VOP | (contrast & 0x7F),
            command::FUNCTION_SET,
        ])
    }

    pub fn set_display_mode(&self, mode: DisplayMode) -> Result<()> {
        self.command(&[command::DISPLAY_CONTROL | mode.bits()])
    }

    /// Clear display RAM
    pub fn clear(&self) -> Result<()> {
        self.write(0, 0, &BLANK)
    }

    /// Replace the whole display RAM
    pub fn write_frame(&self, frame: &[u8; FRAME_LEN]) -> Result<()> {
        self.write(0, 0, frame)
    }

    fn wait(&self) -> Result<()> {
        self.transaction.wait(self.bus, self)
    }

    fn set_data_mode(&self, data: bool) {
        self.dc.lock(|dc| dc.borrow_mut().set_state(data));
    }

    fn fill_commands(&self, commands: &[u8]) -> SpiMessage {
        self.scratch.lock(|s| {
            let mut s = s.borrow_mut();
            let buf = &mut s.commands[..commands.len()];
            buf.copy_from_slice(commands);
            SpiMessage::write(buf)
        })
    }
}

impl<B, CS, DC, RST> TransferListener for Pcd8544<'_, B, CS, DC, RST>
where
    B: SpiTransport,
    CS: OutputPin,
    DC: OutputPin,
    RST: OutputPin,
{
    fn message_complete(&self, info: &TransferInfo, message: &SpiMessage) {
        if info.transfer_id == self.transaction.id() && message.sender() == ADDRESS_PHASE {
            self.set_data_mode(true);
        }
    }

    fn transfer_complete(&self, info: &TransferInfo) -> bool {
        self.transaction.complete(info)
    }
}
