//! Block transfers, erase and status

use busline_core::spi::SpiTransport;
use busline_hal::gpio::OutputPin;
use busline_hal::timeout::Timeout;
use busline_protocol::command::{acmd, cmd};
use busline_protocol::token::{START_BLOCK, START_BLOCK_MULTIPLE, STOP_TRAN};
use busline_protocol::{CardStatusError, Command, R2Status, BLOCK_LEN};

use super::{CardType, Error, Result, SdCard, Session};

impl<B, CS, T> SdCard<'_, B, CS, T>
where
    B: SpiTransport,
    CS: OutputPin,
    T: Timeout,
{
    /// Read one sector into `buf` (512 bytes)
    pub fn read_single_data_block(&self, sector: u32, buf: &mut [u8]) -> Result<()> {
        if buf.len() != BLOCK_LEN {
            return Err(Error::InvalidArgument);
        }
        let session = self.begin_blocks(sector, 1)?;
        self.selected(|| {
            let read = Command::new(cmd::READ_SINGLE_BLOCK, session.address(sector));
            self.command(read, false)?;
            self.read_data(buf, session.crc_active)
        })
    }

    /// Read consecutive sectors starting at `sector`
    ///
    /// `buf` holds a whole number of sectors. Reading up to the very last
    /// sector makes some cards report out-of-range on the stop command;
    /// that report is ignored.
    pub fn read_multiple_data_block(&self, sector: u32, buf: &mut [u8]) -> Result<()> {
        let count = block_count(buf.len())?;
        let session = self.begin_blocks(sector, count)?;
        let at_end = sector + count == session.sectors;

        self.selected(|| {
            let read = Command::new(cmd::READ_MULTIPLE_BLOCK, session.address(sector));
            self.command(read, false)?;

            let received = buf
                .chunks_exact_mut(BLOCK_LEN)
                .try_for_each(|block| self.read_data(block, session.crc_active));
            let stopped = self.stop_transmission();

            match (received, stopped) {
                (Err(e), _) => Err(e),
                (Ok(()), Err(Error::Card(CardStatusError::OutOfRange))) if at_end => {
                    debug!("sd: out of range after reading the last sector");
                    Ok(())
                }
                (Ok(()), stopped) => stopped,
            }
        })
    }

    /// Write one sector from `data` (512 bytes)
    pub fn write_single_data_block(&self, sector: u32, data: &[u8]) -> Result<()> {
        if data.len() != BLOCK_LEN {
            return Err(Error::InvalidArgument);
        }
        let session = self.begin_blocks(sector, 1)?;
        self.selected(|| {
            let write = Command::new(cmd::WRITE_BLOCK, session.address(sector));
            self.command(write, false)?;
            self.write_data(START_BLOCK, data)?;
            self.check_status()
        })
    }

    /// Write consecutive sectors starting at `sector`
    ///
    /// SD cards are told the block count first so they can pre-erase.
    pub fn write_multiple_data_block(&self, sector: u32, data: &[u8]) -> Result<()> {
        let count = block_count(data.len())?;
        let session = self.begin_blocks(sector, count)?;

        self.selected(|| {
            if session.card_type != CardType::Mmc {
                self.command(Command::app(acmd::SET_WR_BLK_ERASE_COUNT, count), false)?;
            }
            let write = Command::new(cmd::WRITE_MULTIPLE_BLOCK, session.address(sector));
            self.command(write, false)?;

            let sent = data
                .chunks_exact(BLOCK_LEN)
                .try_for_each(|block| self.write_data(START_BLOCK_MULTIPLE, block));
            let stopped = self.stop_write();
            sent.and(stopped)
        })
    }

    /// Erase sectors `first..=last`
    pub fn erase(&self, first: u32, last: u32) -> Result<()> {
        if first > last {
            return Err(Error::InvalidArgument);
        }
        let session = self.begin_blocks(first, last - first + 1)?;
        let (start, end) = match session.card_type {
            CardType::Mmc => (cmd::ERASE_GROUP_START, cmd::ERASE_GROUP_END),
            _ => (cmd::ERASE_WR_BLK_START, cmd::ERASE_WR_BLK_END),
        };

        self.selected(|| {
            self.command(Command::new(start, session.address(first)), false)?;
            self.command(Command::new(end, session.address(last)), false)?;
            self.command(Command::new(cmd::ERASE, 0), false)?;
            Ok(())
        })
    }

    /// Card status register (CMD13)
    pub fn read_status(&self) -> Result<R2Status> {
        self.begin()?;
        self.selected(|| {
            let reply = self.command(Command::new(cmd::SEND_STATUS, 0), false)?;
            Ok(R2Status(reply.value as u8))
        })
    }

    /// Switch CRC checking on or off
    ///
    /// The setting is applied at once if a card is initialized, and
    /// again by every later `init_card`.
    pub fn set_crc_enabled(&self, enabled: bool) -> Result<()> {
        self.transaction.check_idle()?;
        if self.is_initialized() {
            self.selected(|| {
                self.command(Command::new(cmd::CRC_ON_OFF, u32::from(enabled)), false)?;
                Ok(())
            })?;
        }
        self.update_session(|s| {
            s.crc_requested = enabled;
            if s.initialized {
                s.crc_active = enabled;
            }
        });
        Ok(())
    }

    /// Check the session and that `count` sectors from `sector` exist
    fn begin_blocks(&self, sector: u32, count: u32) -> Result<Session> {
        let session = self.begin()?;
        match sector.checked_add(count) {
            Some(end) if end <= session.sectors => Ok(session),
            _ => Err(Error::InvalidArgument),
        }
    }

    /// End a multiple block read
    fn stop_transmission(&self) -> Result<()> {
        self.command(Command::new(cmd::STOP_TRANSMISSION, 0), false)?;
        self.check_status()
    }

    /// End a multiple block write
    fn stop_write(&self) -> Result<()> {
        self.exchange(STOP_TRAN)?;
        // One byte passes before the card signals busy
        self.exchange(0xFF)?;
        self.wait_ready(self.config.write_timeout_ms)?;
        self.check_status()
    }

    fn check_status(&self) -> Result<()> {
        let reply = self.command(Command::new(cmd::SEND_STATUS, 0), false)?;
        R2Status(reply.value as u8).check()?;
        Ok(())
    }
}

/// Number of whole sectors in a buffer of `len` bytes
fn block_count(len: usize) -> Result<u32> {
    if len == 0 || len % BLOCK_LEN != 0 {
        return Err(Error::InvalidArgument);
    }
    u32::try_from(len / BLOCK_LEN).map_err(|_| Error::InvalidArgument)
}
