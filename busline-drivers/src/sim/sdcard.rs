//! SD/MMC card model (SPI mode)
//!
//! Parses command frames from MOSI and queues replies on MISO. Capacities
//! are tiny: 1024 sectors for the SDHC variant (CSD v2, C_SIZE 0) and
//! 2048 sectors for the others (CSD v1, C_SIZE 3, C_SIZE_MULT 7).

use std::collections::VecDeque;

use busline_hal_sim::SpiSlave;
use busline_protocol::command::{self, ACMD41_HCS};
use busline_protocol::crc::crc16;
use busline_protocol::registers::seal;
use busline_protocol::token::{START_BLOCK, START_BLOCK_MULTIPLE, STOP_TRAN};
use busline_protocol::{R2Status, BLOCK_LEN, R1};

/// Card family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardKind {
    Mmc,
    SdV1,
    SdV2Sc,
    SdHc,
}

enum Mode {
    Command,
    ReadStream { sector: u32 },
    WriteToken { sector: u32, multi: bool },
    WriteData { sector: u32, multi: bool, buf: Vec<u8> },
}

pub const ACCEPTED: u8 = 0xE5;
pub const CRC_REJECTED: u8 = 0xEB;
pub const WRITE_FAILED: u8 = 0xED;

pub struct SdModel {
    pub kind: CardKind,
    pub storage: Vec<u8>,
    pub sectors: u32,
    frame: Vec<u8>,
    out: VecDeque<u8>,
    mode: Mode,
    idle: bool,
    app: bool,
    pub crc_on: bool,
    /// ACMD41/CMD1 polls answered "idle" before power-up completes
    pub init_polls: u32,
    polls_left: u32,
    powered_up: bool,
    pub out_of_range_pending: bool,
    status: u8,
    erase_start: Option<u32>,
    erase_end: Option<u32>,
    /// Replaces the data response to the next written block
    pub data_response: Option<u8>,
    /// Send wrong CRC16 with read blocks
    pub corrupt_read_crc: bool,
    /// Send a CID with a wrong CRC7
    pub corrupt_cid: bool,
    /// Answer CMD8 with a wrong check pattern
    pub wrong_pattern: bool,
    /// Replaces CSD_STRUCTURE in the CSD image
    pub csd_structure: Option<u8>,
    /// (index, argument) of every accepted frame; app commands have bit 7 set
    pub commands: Vec<(u8, u32)>,
    /// Arguments of every ACMD41
    pub op_cond_args: Vec<u32>,
}

impl SdModel {
    pub fn new(kind: CardKind) -> Self {
        let sectors = if kind == CardKind::SdHc { 1024 } else { 2048 };
        Self {
            kind,
            storage: vec![0; sectors as usize * BLOCK_LEN],
            sectors,
            frame: Vec::new(),
            out: VecDeque::new(),
            mode: Mode::Command,
            idle: true,
            app: false,
            crc_on: false,
            init_polls: 2,
            polls_left: 2,
            powered_up: false,
            out_of_range_pending: false,
            status: 0,
            erase_start: None,
            erase_end: None,
            data_response: None,
            corrupt_read_crc: false,
            corrupt_cid: false,
            wrong_pattern: false,
            csd_structure: None,
            commands: Vec::new(),
            op_cond_args: Vec::new(),
        }
    }

    /// Fill every sector with a recognizable pattern
    pub fn with_pattern(mut self) -> Self {
        for (i, byte) in self.storage.iter_mut().enumerate() {
            *byte = (i / BLOCK_LEN) as u8 ^ (i % 251) as u8;
        }
        self
    }

    pub fn sector(&self, sector: u32) -> &[u8] {
        let start = sector as usize * BLOCK_LEN;
        &self.storage[start..start + BLOCK_LEN]
    }

    /// Indices of the frames received, app commands with bit 7 set
    pub fn indices(&self) -> Vec<u8> {
        self.commands.iter().map(|&(index, _)| index).collect()
    }

    pub fn cid_image() -> [u8; 16] {
        let mut bytes = [0u8; 16];
        bytes[0] = 0x03;
        bytes[1..3].copy_from_slice(b"BL");
        bytes[3..8].copy_from_slice(b"BSIM1");
        bytes[8] = 0x10;
        bytes[9..13].copy_from_slice(&0x1234_5678u32.to_be_bytes());
        // 2024-06
        bytes[13] = 0x01;
        bytes[14] = 0x86;
        seal(bytes)
    }

    pub fn csd_image(kind: CardKind, structure: Option<u8>) -> [u8; 16] {
        let mut raw: u128 = 0;
        let mut put = |lsb: u32, value: u128| raw |= value << lsb;
        put(80, 9); // READ_BL_LEN
        put(22, 9); // WRITE_BL_LEN
        match kind {
            CardKind::SdHc => {
                put(126, 1);
                put(46, 1); // ERASE_BLK_EN
                put(39, 0x7F);
            }
            CardKind::Mmc => {
                put(62, 3);
                put(47, 7);
                put(42, 15); // ERASE_GRP_SIZE
                put(37, 1); // ERASE_GRP_MULT
            }
            CardKind::SdV1 | CardKind::SdV2Sc => {
                put(62, 3);
                put(47, 7);
                put(39, 31); // SECTOR_SIZE
            }
        }
        if let Some(structure) = structure {
            raw = (raw & !(3u128 << 126)) | (u128::from(structure) << 126);
        }
        seal(raw.to_be_bytes())
    }

    fn r1(&self, flags: u8) -> u8 {
        flags | if self.idle { R1::IDLE } else { 0 }
    }

    fn reply(&mut self, flags: u8, trailing: &[u8]) {
        let r1 = self.r1(flags);
        self.out.push_back(0xFF);
        self.out.push_back(r1);
        self.out.extend(trailing.iter().copied());
    }

    fn illegal(&mut self) {
        self.reply(R1::ILLEGAL_COMMAND, &[]);
    }

    fn push_block(&mut self, data: &[u8]) {
        let mut crc = crc16(data);
        if self.corrupt_read_crc {
            crc ^= 0xFFFF;
        }
        self.out.push_back(0xFF);
        self.out.push_back(START_BLOCK);
        self.out.extend(data.iter().copied());
        self.out.extend(crc.to_be_bytes());
    }

    fn address_to_sector(&self, argument: u32) -> u32 {
        if self.kind == CardKind::SdHc {
            argument
        } else {
            argument / BLOCK_LEN as u32
        }
    }

    fn power_poll(&mut self, accepted: bool) {
        if self.powered_up || !accepted {
            return;
        }
        if self.polls_left == 0 {
            self.powered_up = true;
            self.idle = false;
        } else {
            self.polls_left -= 1;
        }
    }

    fn stream(&mut self, sector: u32) {
        if sector >= self.sectors {
            self.out_of_range_pending = true;
            self.out.push_back(0x08);
            return;
        }
        let block = self.sector(sector).to_vec();
        self.push_block(&block);
        self.mode = Mode::ReadStream { sector: sector + 1 };
    }

    fn receive(&mut self, mosi: u8) {
        match &mut self.mode {
            Mode::WriteToken { sector, multi } => {
                let (sector, multi) = (*sector, *multi);
                let start = if multi { START_BLOCK_MULTIPLE } else { START_BLOCK };
                if mosi == start {
                    self.mode = Mode::WriteData {
                        sector,
                        multi,
                        buf: Vec::new(),
                    };
                } else if multi && mosi == STOP_TRAN {
                    self.out.extend([0xFF, 0x00, 0x00]);
                    self.mode = Mode::Command;
                }
            }
            Mode::WriteData { buf, .. } => {
                buf.push(mosi);
                if buf.len() == BLOCK_LEN + 2 {
                    self.finish_block();
                }
            }
            Mode::Command | Mode::ReadStream { .. } => self.parse(mosi),
        }
    }

    fn finish_block(&mut self) {
        let Mode::WriteData { sector, multi, buf } = std::mem::replace(&mut self.mode, Mode::Command) else {
            return;
        };
        let (data, crc) = buf.split_at(BLOCK_LEN);
        let crc_ok = crc16(data) == u16::from_be_bytes([crc[0], crc[1]]);

        let natural = if sector >= self.sectors {
            self.status |= R2Status::OUT_OF_RANGE;
            WRITE_FAILED
        } else if self.crc_on && !crc_ok {
            CRC_REJECTED
        } else {
            ACCEPTED
        };
        let response = self.data_response.take().unwrap_or(natural);
        if response == ACCEPTED && sector < self.sectors {
            let start = sector as usize * BLOCK_LEN;
            self.storage[start..start + BLOCK_LEN].copy_from_slice(data);
        }

        self.out.extend([response, 0x00, 0x00]);
        if multi {
            self.mode = Mode::WriteToken {
                sector: sector + 1,
                multi,
            };
        }
    }

    fn parse(&mut self, mosi: u8) {
        if self.frame.is_empty() && mosi & 0xC0 != 0x40 {
            return;
        }
        self.frame.push(mosi);
        if self.frame.len() < command::CMD_LEN {
            return;
        }
        let mut frame = [0u8; command::CMD_LEN];
        frame.copy_from_slice(&self.frame);
        self.frame.clear();
        self.handle(frame);
    }

    fn handle(&mut self, frame: [u8; command::CMD_LEN]) {
        let index = frame[0] & 0x3F;
        let argument = u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]);

        let check_crc = self.crc_on || index == command::cmd::GO_IDLE_STATE || index == command::cmd::SEND_IF_COND;
        if check_crc && !command::verify(&frame) {
            self.app = false;
            self.reply(R1::COM_CRC_ERROR, &[]);
            return;
        }

        let app = std::mem::take(&mut self.app);
        self.commands
            .push((if app { index | 0x80 } else { index }, argument));

        if app {
            match index {
                command::acmd::SD_SEND_OP_COND => {
                    self.op_cond_args.push(argument);
                    let accepted = self.kind != CardKind::SdHc || argument & ACMD41_HCS != 0;
                    self.power_poll(accepted);
                    self.reply(0, &[]);
                }
                command::acmd::SET_WR_BLK_ERASE_COUNT => self.reply(0, &[]),
                _ => self.illegal(),
            }
            return;
        }

        use command::cmd;
        match index {
            cmd::GO_IDLE_STATE => {
                self.idle = true;
                self.powered_up = false;
                self.polls_left = self.init_polls;
                self.crc_on = false;
                self.mode = Mode::Command;
                self.out.clear();
                self.reply(0, &[]);
            }
            cmd::SEND_IF_COND => match self.kind {
                CardKind::SdV2Sc | CardKind::SdHc => {
                    let pattern = if self.wrong_pattern { 0x55 } else { argument as u8 };
                    self.reply(0, &[0x00, 0x00, (argument >> 8) as u8 & 0x0F, pattern]);
                }
                _ => self.illegal(),
            },
            cmd::READ_OCR => {
                let mut ocr: u32 = 0x00FF_8000;
                if self.powered_up {
                    ocr |= 1 << 31;
                    if self.kind == CardKind::SdHc {
                        ocr |= 1 << 30;
                    }
                }
                self.reply(0, &ocr.to_be_bytes());
            }
            cmd::APP_CMD => {
                if self.kind == CardKind::Mmc {
                    self.illegal();
                } else {
                    self.app = true;
                    self.reply(0, &[]);
                }
            }
            cmd::SEND_OP_COND => {
                if self.kind == CardKind::Mmc {
                    self.power_poll(true);
                    self.reply(0, &[]);
                } else {
                    self.illegal();
                }
            }
            cmd::SEND_CID | cmd::SEND_CSD => {
                let mut image = if index == cmd::SEND_CID {
                    Self::cid_image()
                } else {
                    Self::csd_image(self.kind, self.csd_structure)
                };
                if index == cmd::SEND_CID && self.corrupt_cid {
                    image[15] ^= 0x02;
                }
                self.reply(0, &[]);
                self.push_block(&image);
            }
            cmd::SET_BLOCKLEN => {
                let flags = if argument as usize == BLOCK_LEN { 0 } else { R1::PARAMETER_ERROR };
                self.reply(flags, &[]);
            }
            cmd::CRC_ON_OFF => {
                self.crc_on = argument & 1 != 0;
                self.reply(0, &[]);
            }
            cmd::READ_SINGLE_BLOCK => {
                let sector = self.address_to_sector(argument);
                if sector >= self.sectors {
                    self.reply(R1::ADDRESS_ERROR, &[]);
                } else {
                    self.reply(0, &[]);
                    let block = self.sector(sector).to_vec();
                    self.push_block(&block);
                }
            }
            cmd::READ_MULTIPLE_BLOCK => {
                let sector = self.address_to_sector(argument);
                if sector >= self.sectors {
                    self.reply(R1::ADDRESS_ERROR, &[]);
                } else {
                    self.reply(0, &[]);
                    self.mode = Mode::ReadStream { sector };
                }
            }
            cmd::STOP_TRANSMISSION => {
                self.out.clear();
                self.mode = Mode::Command;
                if std::mem::take(&mut self.out_of_range_pending) {
                    self.status |= R2Status::OUT_OF_RANGE;
                }
                // Stuff byte, R1, then two busy bytes
                let r1 = self.r1(0);
                self.out.extend([0xFF, r1, 0x00, 0x00]);
            }
            cmd::SEND_STATUS => {
                let status = std::mem::take(&mut self.status);
                self.reply(0, &[status]);
            }
            cmd::WRITE_BLOCK | cmd::WRITE_MULTIPLE_BLOCK => {
                let sector = self.address_to_sector(argument);
                if sector >= self.sectors {
                    self.reply(R1::ADDRESS_ERROR, &[]);
                } else {
                    self.reply(0, &[]);
                    self.mode = Mode::WriteToken {
                        sector,
                        multi: index == cmd::WRITE_MULTIPLE_BLOCK,
                    };
                }
            }
            cmd::ERASE_WR_BLK_START | cmd::ERASE_GROUP_START | cmd::ERASE_WR_BLK_END | cmd::ERASE_GROUP_END => {
                let mmc_command = matches!(index, cmd::ERASE_GROUP_START | cmd::ERASE_GROUP_END);
                if mmc_command != (self.kind == CardKind::Mmc) {
                    self.illegal();
                    return;
                }
                let sector = self.address_to_sector(argument);
                if matches!(index, cmd::ERASE_WR_BLK_START | cmd::ERASE_GROUP_START) {
                    self.erase_start = Some(sector);
                } else {
                    self.erase_end = Some(sector);
                }
                self.reply(0, &[]);
            }
            cmd::ERASE => match (self.erase_start.take(), self.erase_end.take()) {
                (Some(first), Some(last)) if first <= last && last < self.sectors => {
                    let range = first as usize * BLOCK_LEN..(last as usize + 1) * BLOCK_LEN;
                    self.storage[range].fill(0xFF);
                    self.reply(0, &[0x00, 0x00]);
                }
                _ => self.reply(R1::ERASE_SEQUENCE_ERROR, &[]),
            },
            _ => self.illegal(),
        }
    }
}

impl SpiSlave for SdModel {
    fn exchange(&mut self, mosi: u8) -> u8 {
        if self.out.is_empty() {
            if let Mode::ReadStream { sector } = self.mode {
                self.stream(sector);
            }
        }
        let miso = self.out.pop_front().unwrap_or(0xFF);
        self.receive(mosi);
        miso
    }

    fn select(&mut self, selected: bool) {
        if !selected {
            self.frame.clear();
            self.out.clear();
        }
    }
}
