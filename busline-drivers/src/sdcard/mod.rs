//! SD/MMC cards in SPI mode
//!
//! Commands and replies are exchanged one byte at a time through
//! [`SpiTransport::transmit`]; data blocks go through DMA as one bus
//! transfer each (block plus CRC). The card stays selected for the whole
//! operation, so chip select is driven here rather than by the transfer.
//!
//! # Session
//!
//! [`SdCard::init_card`] runs the power-up handshake, detects the card
//! type and reads CID and CSD. Block operations require a successful
//! initialization and address cards by sector: SDHC/SDXC take the sector
//! number, older cards the byte offset.
//!
//! ```ignore
//! let card = SdCard::new(&bus, TransferId(3), cs, timeout, SdCardConfig::default());
//! card.init_card()?;
//! let mut block = [0u8; 512];
//! card.read_single_data_block(0, &mut block)?;
//! ```

mod block;
mod error;
mod init;

use core::cell::RefCell;

use busline_core::spi::{SpiMessage, SpiTransport, TransferId, TransferInfo, TransferListener};
use busline_hal::gpio::OutputPin;
use busline_hal::spi::BaudRate;
use busline_hal::timeout::Timeout;
use busline_protocol::command::cmd;
use busline_protocol::crc::crc16;
use busline_protocol::{Cid, Command, Csd, DataResponse, ReadToken, ResponseKind, R1};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::transaction::Transaction;

pub use error::{Error, Result};

/// Bytes polled for an R1 reply after a command
const RESPONSE_POLLS: usize = 8;

/// Card family detected by [`SdCard::init_card`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CardType {
    /// Not initialized
    Unknown,
    /// MultiMediaCard
    Mmc,
    /// SD version 1.x, standard capacity
    SdscV1,
    /// SD version 2.0+, standard capacity
    SdscV2,
    /// SD version 2.0+, high or extended capacity (block addressed)
    SdhcSdxc,
}

impl CardType {
    /// Whether commands take sector numbers instead of byte offsets
    pub fn is_block_addressed(self) -> bool {
        self == CardType::SdhcSdxc
    }
}

/// Card settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SdCardConfig {
    /// Clock during initialization (100-400 kHz)
    pub low_speed: BaudRate,
    /// Clock for everything else
    pub high_speed: BaudRate,
    /// Enable CRC checking on the card and verify data CRCs
    pub crc: bool,
    /// Power-up (ACMD41/CMD1) loop, in ms
    pub init_timeout_ms: u32,
    /// Wait for a read data token, in ms
    pub read_timeout_ms: u32,
    /// Wait for a data response and write busy, in ms
    pub write_timeout_ms: u32,
    /// Wait for an erase to finish, in ms
    pub erase_timeout_ms: u32,
}

impl Default for SdCardConfig {
    /// 72 MHz APB2: 281 kHz during init, 18 MHz afterwards
    fn default() -> Self {
        Self {
            low_speed: BaudRate::Div256,
            high_speed: BaudRate::Div4,
            crc: false,
            init_timeout_ms: 1_000,
            read_timeout_ms: 100,
            write_timeout_ms: 500,
            erase_timeout_ms: 30_000,
        }
    }
}

/// State established by the last `init_card`
#[derive(Debug, Clone, Copy)]
struct Session {
    card_type: CardType,
    initialized: bool,
    cid: Option<Cid>,
    csd: Option<Csd>,
    sectors: u32,
    erase_block_size: u32,
    /// CRC requested by the user, kept across initializations
    crc_requested: bool,
    /// CRC checking switched on in the card
    crc_active: bool,
}

impl Session {
    fn new(crc_requested: bool) -> Self {
        Self {
            card_type: CardType::Unknown,
            initialized: false,
            cid: None,
            csd: None,
            sectors: 0,
            erase_block_size: 0,
            crc_requested,
            crc_active: false,
        }
    }

    /// Command argument addressing `sector`
    fn address(&self, sector: u32) -> u32 {
        if self.card_type.is_block_addressed() {
            sector
        } else {
            sector.wrapping_mul(busline_protocol::BLOCK_LEN as u32)
        }
    }
}

/// Reply to a command: R1 plus the trailing bytes, if any
#[derive(Debug, Clone, Copy)]
struct Reply {
    r1: R1,
    /// R2 status byte, or the R3/R7 payload
    value: u32,
}

/// SD or MMC card on a shared SPI bus
pub struct SdCard<'a, B, CS, T> {
    bus: &'a B,
    transaction: Transaction<CS>,
    timeout: Mutex<CriticalSectionRawMutex, RefCell<T>>,
    config: SdCardConfig,
    session: Mutex<CriticalSectionRawMutex, RefCell<Session>>,
}

impl<'a, B, CS, T> SdCard<'a, B, CS, T>
where
    B: SpiTransport,
    CS: OutputPin,
    T: Timeout,
{
    /// Create a driver for the card behind `cs`
    ///
    /// Nothing is sent until [`init_card`](Self::init_card).
    pub fn new(bus: &'a B, id: TransferId, cs: CS, timeout: T, config: SdCardConfig) -> Self {
        Self {
            bus,
            transaction: Transaction::with_manual_select(id, cs),
            timeout: Mutex::new(RefCell::new(timeout)),
            config,
            session: Mutex::new(RefCell::new(Session::new(config.crc))),
        }
    }

    pub fn config(&self) -> &SdCardConfig {
        &self.config
    }

    pub fn card_type(&self) -> CardType {
        self.session().card_type
    }

    pub fn is_initialized(&self) -> bool {
        self.session().initialized
    }

    /// Card identification register
    pub fn cid(&self) -> Option<Cid> {
        self.session().cid
    }

    /// Card specific data register
    pub fn csd(&self) -> Option<Csd> {
        self.session().csd
    }

    /// Capacity in 512-byte sectors
    pub fn sectors_count(&self) -> u32 {
        self.session().sectors
    }

    /// Block length used for transfers
    pub fn block_len(&self) -> u32 {
        busline_protocol::BLOCK_LEN as u32
    }

    /// Erasable unit in bytes
    pub fn erase_block_size(&self) -> u32 {
        self.session().erase_block_size
    }

    /// Whether CRC checking is on in the card
    pub fn crc_enabled(&self) -> bool {
        self.session().crc_active
    }

    fn session(&self) -> Session {
        self.session.lock(|s| *s.borrow())
    }

    fn update_session(&self, f: impl FnOnce(&mut Session)) {
        self.session.lock(|s| f(&mut s.borrow_mut()));
    }

    /// Check that an operation on an initialized card may start
    fn begin(&self) -> Result<Session> {
        self.transaction.check_idle()?;
        let session = self.session();
        if !session.initialized {
            return Err(Error::NotInitialized);
        }
        Ok(session)
    }

    /// Run `f` with the card selected; deselect and release MISO after
    fn selected<R>(&self, f: impl FnOnce() -> Result<R>) -> Result<R> {
        self.bus.claim(self.transaction.id())?;
        self.transaction.select(true);
        let result = f();
        self.transaction.select(false);
        let _ = self.exchange(0xFF);
        result
    }

    fn exchange(&self, byte: u8) -> Result<u8> {
        Ok(self.bus.transmit(u16::from(byte))? as u8)
    }

    /// Repeat `step` until it yields a value or `ms` elapse
    fn poll_until<R>(&self, ms: u32, mut step: impl FnMut() -> Result<Option<R>>) -> Result<R> {
        self.timeout.lock(|t| t.borrow_mut().begin(ms));
        let result = loop {
            match step() {
                Ok(Some(value)) => break Ok(value),
                Ok(None) => {}
                Err(e) => break Err(e),
            }
            if self.timeout.lock(|t| t.borrow_mut().expired()) {
                break Err(Error::Timeout);
            }
        };
        self.timeout.lock(|t| t.borrow_mut().end());
        result
    }

    /// Clock 0xFF until the card releases MISO
    fn wait_ready(&self, ms: u32) -> Result<()> {
        self.poll_until(ms, || Ok((self.exchange(0xFF)? == 0xFF).then_some(())))
    }

    /// Send a command and collect its reply without judging R1
    ///
    /// Application commands are prefixed with APP_CMD; if that is refused
    /// its reply is returned instead.
    fn send_command(&self, command: Command) -> Result<Reply> {
        if command.app {
            let prefix = self.send_command(Command::new(cmd::APP_CMD, 0))?;
            if prefix.r1.0 & !R1::IDLE != 0 {
                return Ok(prefix);
            }
        }

        for byte in command.frame() {
            self.exchange(byte)?;
        }
        if command.index == cmd::STOP_TRANSMISSION {
            self.exchange(0xFF)?;
        }

        let mut r1 = None;
        for _ in 0..RESPONSE_POLLS {
            let byte = R1(self.exchange(0xFF)?);
            if byte.is_response() {
                r1 = Some(byte);
                break;
            }
        }
        let Some(r1) = r1 else {
            warn!("sd: no reply to CMD{=u8}", command.index);
            return Err(Error::Timeout);
        };

        let mut reply = Reply { r1, value: 0 };
        match command.response_kind() {
            ResponseKind::R1 => {}
            ResponseKind::R1b => {
                let ms = if command.index == cmd::ERASE {
                    self.config.erase_timeout_ms
                } else {
                    self.config.write_timeout_ms
                };
                self.wait_ready(ms)?;
            }
            ResponseKind::R2 => reply.value = u32::from(self.exchange(0xFF)?),
            ResponseKind::R3 | ResponseKind::R7 => {
                for _ in 0..4 {
                    reply.value = (reply.value << 8) | u32::from(self.exchange(0xFF)?);
                }
            }
        }
        trace!("sd: CMD{=u8} -> {=u8:#x}", command.index, r1.0);
        Ok(reply)
    }

    /// Send a command and fail on any R1 error bit
    fn command(&self, command: Command, allow_idle: bool) -> Result<Reply> {
        let reply = self.send_command(command)?;
        reply.r1.check(allow_idle)?;
        Ok(reply)
    }

    /// Run `messages` as one bus transfer and wait for it
    ///
    /// # Safety
    ///
    /// Every buffer behind `messages` must be alive for the whole call.
    unsafe fn dma(&self, messages: &[SpiMessage]) -> Result<()> {
        self.transaction.start(self.bus, messages)?;
        Ok(self.transaction.wait(self.bus, self)?)
    }

    /// Receive one data block into `buf`
    fn read_data(&self, buf: &mut [u8], verify_crc: bool) -> Result<()> {
        let token = self.poll_until(self.config.read_timeout_ms, || {
            Ok(ReadToken::parse(self.exchange(0xFF)?))
        })?;
        if let ReadToken::Error(e) = token {
            return Err(Error::Card(e));
        }

        let mut crc = [0u8; 2];
        // SAFETY: `buf` and `crc` outlive the call, which waits for the
        // transfer to finish.
        unsafe { self.dma(&[SpiMessage::read(buf), SpiMessage::read(&mut crc)])? };

        if verify_crc {
            let expected = u16::from_be_bytes(crc);
            let actual = crc16(buf);
            if actual != expected {
                warn!("sd: data crc {=u16:#x}, card sent {=u16:#x}", actual, expected);
                return Err(Error::Crc);
            }
        }
        Ok(())
    }

    /// Send one data block behind `token` and wait until it is programmed
    fn write_data(&self, token: u8, data: &[u8]) -> Result<()> {
        let token = [token];
        let crc = crc16(data).to_be_bytes();

        self.exchange(0xFF)?;
        // SAFETY: `token`, `data` and `crc` outlive the call, which waits
        // for the transfer to finish.
        unsafe {
            self.dma(&[
                SpiMessage::write(&token),
                SpiMessage::write(data),
                SpiMessage::write(&crc),
            ])?
        };

        let response = self.poll_until(self.config.write_timeout_ms, || {
            Ok(DataResponse::parse(self.exchange(0xFF)?))
        })?;
        match response {
            DataResponse::Accepted => {}
            DataResponse::CrcError => {
                warn!("sd: card rejected data crc");
                return Err(Error::Crc);
            }
            DataResponse::WriteError => return Err(Error::Write),
        }
        self.wait_ready(self.config.write_timeout_ms)
    }
}

impl<B, CS, T> TransferListener for SdCard<'_, B, CS, T>
where
    B: SpiTransport,
    CS: OutputPin,
    T: Timeout,
{
    fn transfer_complete(&self, info: &TransferInfo) -> bool {
        self.transaction.complete(info)
    }
}

#[cfg(test)]
mod tests;
