//! PCD8544 controller model

use busline_hal_sim::{PinProbe, SpiSlave};

use crate::pcd8544::{command, FRAME_LEN, WIDTH};

/// LCD controller that samples D/C on every byte
pub struct LcdModel {
    dc: PinProbe,
    /// Command bytes, in order
    pub commands: Vec<u8>,
    /// Data bytes, in order
    pub data: Vec<u8>,
    pub ram: [u8; FRAME_LEN],
    pub vop: u8,
    /// Display control D and E bits
    pub mode: u8,
    extended: bool,
    x: usize,
    y: usize,
}

impl LcdModel {
    pub fn new(dc: PinProbe) -> Self {
        Self {
            dc,
            commands: Vec::new(),
            data: Vec::new(),
            ram: [0; FRAME_LEN],
            vop: 0,
            mode: 0,
            extended: false,
            x: 0,
            y: 0,
        }
    }

    fn command(&mut self, byte: u8) {
        self.commands.push(byte);
        if byte & 0xF8 == command::FUNCTION_SET {
            self.extended = byte & command::EXTENDED != 0;
        } else if self.extended {
            if byte & 0x80 != 0 {
                self.vop = byte & 0x7F;
            }
        } else if byte & 0x80 != 0 {
            self.x = usize::from(byte & 0x7F);
        } else if byte & 0xC0 == command::SET_Y {
            self.y = usize::from(byte & 0x07);
        } else if byte & 0xF8 == command::DISPLAY_CONTROL {
            self.mode = byte & 0x05;
        }
    }

    fn write(&mut self, byte: u8) {
        self.data.push(byte);
        let index = self.y * WIDTH + self.x;
        self.ram[index % FRAME_LEN] = byte;
        let next = (index + 1) % FRAME_LEN;
        self.x = next % WIDTH;
        self.y = next / WIDTH;
    }
}

impl SpiSlave for LcdModel {
    fn exchange(&mut self, mosi: u8) -> u8 {
        if self.dc.is_high() {
            self.write(mosi);
        } else {
            self.command(mosi);
        }
        0xFF
    }
}
