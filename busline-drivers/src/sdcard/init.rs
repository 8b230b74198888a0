//! Power-up handshake and card identification

use busline_core::spi::SpiTransport;
use busline_hal::gpio::OutputPin;
use busline_hal::timeout::Timeout;
use busline_protocol::command::{acmd, cmd, ACMD41_HCS, CRC_ON, IF_COND_ARGUMENT};
use busline_protocol::{Cid, Command, Csd, Ocr, BLOCK_LEN, R1};

use super::{CardType, Error, Result, SdCard, Session};

/// Dummy bytes clocked with the card deselected (at least 74 clocks)
const WAKE_BYTES: usize = 10;

impl<B, CS, T> SdCard<'_, B, CS, T>
where
    B: SpiTransport,
    CS: OutputPin,
    T: Timeout,
{
    /// Reset the card and establish a new session
    ///
    /// Runs at the low clock and restores the high clock afterwards,
    /// whatever the outcome. The requested CRC setting is applied once
    /// the card is identified.
    pub fn init_card(&self) -> Result<CardType> {
        self.transaction.check_idle()?;
        self.bus.claim(self.transaction.id())?;
        self.update_session(|s| *s = Session::new(s.crc_requested));
        self.bus.set_baud_rate(self.config.low_speed)?;

        let result = self.init_sequence();

        self.transaction.select(false);
        let _ = self.exchange(0xFF);
        let restored = self.bus.set_baud_rate(self.config.high_speed);

        match result {
            Ok(card_type) => {
                restored?;
                debug!("sd: {} card, {=u32} sectors", card_type, self.sectors_count());
                Ok(card_type)
            }
            Err(e) => {
                warn!("sd: init failed: {}", e);
                Err(e)
            }
        }
    }

    fn init_sequence(&self) -> Result<CardType> {
        self.transaction.select(false);
        for _ in 0..WAKE_BYTES {
            self.exchange(0xFF)?;
        }
        self.transaction.select(true);

        let reset = self.send_command(Command::new(cmd::GO_IDLE_STATE, 0))?;
        if reset.r1.0 != R1::IDLE {
            return Err(Error::UnusableCard);
        }

        let if_cond = self.send_command(Command::new(cmd::SEND_IF_COND, IF_COND_ARGUMENT))?;
        let card_type = if if_cond.r1.is_illegal_command() {
            trace!("sd: CMD8 rejected, version 1 card");
            self.init_v1()?
        } else {
            if_cond.r1.check(true)?;
            if if_cond.value & 0xFFF != IF_COND_ARGUMENT {
                return Err(Error::UnusableCard);
            }
            self.init_v2()?
        };

        self.identify(card_type)?;
        Ok(card_type)
    }

    /// SD 1.x or MMC: never advertise high capacity
    fn init_v1(&self) -> Result<CardType> {
        // Some MMCs do not implement READ_OCR
        let ocr = self.send_command(Command::new(cmd::READ_OCR, 0))?;
        if !ocr.r1.is_illegal_command() {
            ocr.r1.check(true)?;
            if !Ocr(ocr.value).supports_3v3() {
                return Err(Error::UnusableCard);
            }
        }

        let op_cond = Command::app(acmd::SD_SEND_OP_COND, 0);
        let first = self.send_command(op_cond)?;
        if first.r1.is_illegal_command() {
            trace!("sd: ACMD41 rejected, MMC");
            self.wait_powered_up(Command::new(cmd::SEND_OP_COND, 0))?;
            return Ok(CardType::Mmc);
        }

        first.r1.check(true)?;
        if first.r1.is_idle() {
            self.wait_powered_up(op_cond)?;
        }
        Ok(CardType::SdscV1)
    }

    /// SD 2.0+: advertise high capacity, then read CCS
    fn init_v2(&self) -> Result<CardType> {
        self.check_voltage()?;
        self.wait_powered_up(Command::app(acmd::SD_SEND_OP_COND, ACMD41_HCS))?;

        let ocr = Ocr(self.command(Command::new(cmd::READ_OCR, 0), false)?.value);
        if ocr.is_high_capacity() {
            Ok(CardType::SdhcSdxc)
        } else {
            Ok(CardType::SdscV2)
        }
    }

    fn check_voltage(&self) -> Result<()> {
        let reply = self.command(Command::new(cmd::READ_OCR, 0), true)?;
        if !Ocr(reply.value).supports_3v3() {
            return Err(Error::UnusableCard);
        }
        Ok(())
    }

    /// Repeat `command` until the card leaves the idle state
    fn wait_powered_up(&self, command: Command) -> Result<()> {
        self.poll_until(self.config.init_timeout_ms, || {
            let reply = self.command(command, true)?;
            Ok((!reply.r1.is_idle()).then_some(()))
        })
    }

    /// Read CID and CSD, fix the block length and enable CRC if requested
    fn identify(&self, card_type: CardType) -> Result<()> {
        let crc = self.session().crc_requested;

        let cid = Cid::parse(&self.read_register(cmd::SEND_CID, crc)?)?;
        let csd = Csd::parse(&self.read_register(cmd::SEND_CSD, crc)?)?;

        if !card_type.is_block_addressed() {
            self.command(Command::new(cmd::SET_BLOCKLEN, BLOCK_LEN as u32), false)?;
        }

        let sectors = match card_type {
            CardType::Mmc => csd.mmc_sectors(),
            _ => csd.sectors()?,
        };
        let erase_block_size = match card_type {
            CardType::Mmc => csd.mmc_erase_size(),
            _ => csd.sd_erase_size(),
        };

        if crc {
            self.command(Command::new(cmd::CRC_ON_OFF, CRC_ON), false)?;
        }

        self.update_session(|s| {
            s.card_type = card_type;
            s.cid = Some(cid);
            s.csd = Some(csd);
            s.sectors = sectors;
            s.erase_block_size = erase_block_size;
            s.crc_active = crc;
            s.initialized = true;
        });
        Ok(())
    }

    fn read_register(&self, index: u8, verify_crc: bool) -> Result<[u8; 16]> {
        self.command(Command::new(index, 0), false)?;
        let mut raw = [0u8; 16];
        self.read_data(&mut raw, verify_crc)?;
        Ok(raw)
    }
}
