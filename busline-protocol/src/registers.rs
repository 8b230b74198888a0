//! Card registers
//!
//! OCR arrives in an R3 reply. CID and CSD are read as 16-byte data blocks,
//! most significant byte first, with a CRC7 in the last byte. Field
//! positions below are bit numbers within the 128-bit register.

use crate::crc::crc7_byte;

/// Register decoding failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegisterError {
    /// Trailing CRC7 does not match the first 15 bytes
    Crc,
    /// CSD structure version not supported
    UnsupportedStructure,
}

/// Extract bits `msb..=lsb` of a 128-bit register
fn field(raw: u128, msb: u32, lsb: u32) -> u32 {
    let width = msb - lsb + 1;
    ((raw >> lsb) & ((1u128 << width) - 1)) as u32
}

fn check_crc(bytes: &[u8; 16]) -> Result<u128, RegisterError> {
    if crc7_byte(&bytes[..15]) != bytes[15] {
        return Err(RegisterError::Crc);
    }
    Ok(u128::from_be_bytes(*bytes))
}

/// Fill in the trailing CRC7 byte of a register image
pub fn seal(mut bytes: [u8; 16]) -> [u8; 16] {
    bytes[15] = crc7_byte(&bytes[..15]);
    bytes
}

/// Operating conditions register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Ocr(pub u32);

impl Ocr {
    /// Power-up routine finished
    pub const BUSY: u32 = 1 << 31;
    /// Card capacity status (high capacity)
    pub const CCS: u32 = 1 << 30;
    /// 3.2-3.3V and 3.3-3.4V window bits
    pub const VDD_3V3: u32 = (1 << 20) | (1 << 21);

    pub fn is_powered_up(self) -> bool {
        self.0 & Self::BUSY != 0
    }

    pub fn is_high_capacity(self) -> bool {
        self.0 & Self::CCS != 0
    }

    /// Supported voltage window, bits 23:15 (2.7V to 3.6V in 100mV steps)
    pub fn voltage_window(self) -> u16 {
        ((self.0 >> 15) & 0x1FF) as u16
    }

    /// Check that the card runs at 3.3V
    pub fn supports_3v3(self) -> bool {
        self.0 & Self::VDD_3V3 != 0
    }
}

/// Card identification register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Cid {
    raw: u128,
}

impl Cid {
    /// Decode and verify a CID image
    pub fn parse(bytes: &[u8; 16]) -> Result<Self, RegisterError> {
        check_crc(bytes).map(|raw| Self { raw })
    }

    pub fn manufacturer_id(&self) -> u8 {
        field(self.raw, 127, 120) as u8
    }

    /// Two ASCII characters
    pub fn oem_id(&self) -> [u8; 2] {
        (field(self.raw, 119, 104) as u16).to_be_bytes()
    }

    /// Five ASCII characters
    pub fn product_name(&self) -> [u8; 5] {
        let bytes = self.raw.to_be_bytes();
        [bytes[3], bytes[4], bytes[5], bytes[6], bytes[7]]
    }

    /// Major and minor revision nibbles
    pub fn revision(&self) -> (u8, u8) {
        let rev = field(self.raw, 63, 56) as u8;
        (rev >> 4, rev & 0x0F)
    }

    pub fn serial(&self) -> u32 {
        field(self.raw, 55, 24)
    }

    /// Manufacturing year and month of an SD card
    ///
    /// SD keeps MDT in [19:8] with years from 2000. MMC cards use
    /// [`mmc_manufacturing_date`](Self::mmc_manufacturing_date).
    pub fn manufacturing_date(&self) -> (u16, u8) {
        let year = 2000 + field(self.raw, 19, 12) as u16;
        let month = field(self.raw, 11, 8) as u8;
        (year, month)
    }

    /// Manufacturing year and month of an MMC card
    ///
    /// MDT sits in [15:8], month in the high nibble, years from 1997.
    pub fn mmc_manufacturing_date(&self) -> (u16, u8) {
        let month = field(self.raw, 15, 12) as u8;
        let year = 1997 + field(self.raw, 11, 8) as u16;
        (year, month)
    }

    pub fn to_bytes(&self) -> [u8; 16] {
        self.raw.to_be_bytes()
    }
}

/// Card-specific data register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Csd {
    raw: u128,
}

impl Csd {
    /// Decode and verify a CSD image
    pub fn parse(bytes: &[u8; 16]) -> Result<Self, RegisterError> {
        check_crc(bytes).map(|raw| Self { raw })
    }

    /// CSD_STRUCTURE [127:126]: 0 for v1.0 (and most MMC), 1 for v2.0
    pub fn structure(&self) -> u8 {
        field(self.raw, 127, 126) as u8
    }

    /// READ_BL_LEN [83:80]
    pub fn read_bl_len(&self) -> u8 {
        field(self.raw, 83, 80) as u8
    }

    /// WRITE_BL_LEN [25:22]
    pub fn write_bl_len(&self) -> u8 {
        field(self.raw, 25, 22) as u8
    }

    /// C_SIZE: [73:62] in v1.0, [69:48] in v2.0
    pub fn c_size(&self) -> u32 {
        match self.structure() {
            1 => field(self.raw, 69, 48),
            _ => field(self.raw, 73, 62),
        }
    }

    /// C_SIZE_MULT [49:47], v1.0 only
    pub fn c_size_mult(&self) -> u8 {
        field(self.raw, 49, 47) as u8
    }

    /// ERASE_BLK_EN [46] (SD)
    pub fn erase_blk_en(&self) -> bool {
        field(self.raw, 46, 46) != 0
    }

    /// SECTOR_SIZE [45:39] (SD), in write blocks minus one
    pub fn sector_size(&self) -> u8 {
        field(self.raw, 45, 39) as u8
    }

    /// ERASE_GRP_SIZE [46:42] (MMC)
    pub fn erase_grp_size(&self) -> u8 {
        field(self.raw, 46, 42) as u8
    }

    /// ERASE_GRP_MULT [41:37] (MMC)
    pub fn erase_grp_mult(&self) -> u8 {
        field(self.raw, 41, 37) as u8
    }

    /// Capacity of an SD card in 512-byte sectors
    pub fn sectors(&self) -> Result<u32, RegisterError> {
        match self.structure() {
            0 => Ok(self.v1_sectors()),
            1 => Ok((self.c_size() + 1).saturating_mul(1024)),
            _ => Err(RegisterError::UnsupportedStructure),
        }
    }

    /// Capacity of an MMC card in 512-byte sectors
    ///
    /// Every MMC CSD_STRUCTURE (1.0, 1.1, 1.2) keeps the v1.0 size fields.
    /// Cards above 2 GB report their size only in EXT_CSD.
    pub fn mmc_sectors(&self) -> u32 {
        self.v1_sectors()
    }

    fn v1_sectors(&self) -> u32 {
        let c_size = field(self.raw, 73, 62);
        let shift = u32::from(self.c_size_mult()) + 2 + u32::from(self.read_bl_len());
        let bytes = (u64::from(c_size) + 1) << shift;
        (bytes >> 9) as u32
    }

    /// Erasable unit of an SD card in bytes
    pub fn sd_erase_size(&self) -> u32 {
        if self.erase_blk_en() {
            512
        } else {
            (u32::from(self.sector_size()) + 1) << self.write_bl_len()
        }
    }

    /// Erasable unit of an MMC card in bytes
    pub fn mmc_erase_size(&self) -> u32 {
        (u32::from(self.erase_grp_size()) + 1) * (u32::from(self.erase_grp_mult()) + 1)
            << self.write_bl_len()
    }

    pub fn to_bytes(&self) -> [u8; 16] {
        self.raw.to_be_bytes()
    }
}
