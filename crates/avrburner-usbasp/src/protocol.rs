//! USBasp protocol constants and types
//!
//! Every USBasp operation is a single vendor control transfer. The function
//! code goes in `bRequest`; `wValue`, `wIndex` and `wLength` carry the
//! address, the page size/flags word and the byte count.

use core::fmt;
use core::str::FromStr;

// USB device identifiers (VOTI / obdev shared PID)
pub const USBASP_VENDOR_ID: u16 = 0x16C0;
pub const USBASP_PRODUCT_ID: u16 = 0x05DC;

/// The firmware exposes a single interface
pub const USBASP_INTERFACE: u8 = 0;

/// Length requested for status replies (TRANSMIT answers with 4 bytes)
pub const STATUS_LENGTH: u16 = 4;

/// Flash write block size used by the firmware's paged write
pub const RW_BLOCK_SIZE: usize = 200;

// Block position flags for paged flash writes
pub const BLOCKFLAG_FIRST: u8 = 0x01;
pub const BLOCKFLAG_LAST: u8 = 0x02;

// Status codes
pub const ENTER_PROG_MODE_OK: u8 = 0;
pub const SET_SCK_OK: u8 = 0;

// Capability bits (byte 0 of GETCAPABILITIES)
pub const CAP_0_TPI: u8 = 0x01;

/// Largest page size the flags word can carry (12 bits)
pub const MAX_PAGE_SIZE: usize = 0xFFF;

/// USBasp function codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Function {
    Connect = 1,
    Disconnect = 2,
    Transmit = 3,
    ReadFlash = 4,
    EnableProg = 5,
    WriteFlash = 6,
    ReadEeprom = 7,
    WriteEeprom = 8,
    SetLongAddress = 9,
    SetIspSck = 10,
    GetCapabilities = 127,
}

impl Function {
    /// Look up a function code
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => Function::Connect,
            2 => Function::Disconnect,
            3 => Function::Transmit,
            4 => Function::ReadFlash,
            5 => Function::EnableProg,
            6 => Function::WriteFlash,
            7 => Function::ReadEeprom,
            8 => Function::WriteEeprom,
            9 => Function::SetLongAddress,
            10 => Function::SetIspSck,
            127 => Function::GetCapabilities,
            _ => return None,
        })
    }
}

/// AVR serial programming instructions sent through [`Function::Transmit`]
///
/// The 32-bit instruction goes out as `wValue` (bytes 0 and 1, little
/// endian) followed by `wIndex` (bytes 2 and 3). The constants here are the
/// `wValue` half; the operand travels in `wIndex`.
pub mod isp {
    pub const CHIP_ERASE: u16 = 0x80AC;
    pub const READ_BSY_BIT: u16 = 0x00F0;
    /// Signature byte index goes in the low byte of `wIndex`
    pub const READ_SIGNATURE: u16 = 0x0030;
    pub const READ_CALIB_BYTE: u16 = 0x0038;

    pub const READ_LOW_FUSE: u16 = 0x0050;
    pub const READ_HIGH_FUSE: u16 = 0x0858;
    pub const READ_EXTEND_FUSE: u16 = 0x0850;
    pub const READ_LOCK_BITS: u16 = 0x0058;

    /// Value to write goes in the high byte of `wIndex`
    pub const WRITE_LOW_FUSE: u16 = 0xA0AC;
    pub const WRITE_HIGH_FUSE: u16 = 0xA8AC;
    pub const WRITE_EXTEND_FUSE: u16 = 0xA4AC;
    pub const WRITE_LOCK_BITS: u16 = 0xE0AC;
}

/// The four instruction bytes as they reach the target
pub fn isp_bytes(instruction: u16, param: u16) -> [u8; 4] {
    let [b0, b1] = instruction.to_le_bytes();
    let [b2, b3] = param.to_le_bytes();
    [b0, b1, b2, b3]
}

/// Pack the `wIndex` word for a paged flash write block
///
/// Low byte: page size bits 0..7. High byte: block flags in the low nibble
/// plus page size bits 8..11 shifted into the high nibble. Large-page parts
/// (ATmega128 and up) rely on the high nibble.
pub fn write_flash_param(page_size: usize, block_flags: u8) -> u16 {
    let page_size = page_size as u16;
    let lsb = page_size & 0xFF;
    let msb = ((block_flags as u16) & 0x0F) + ((page_size & 0xF00) >> 4);
    lsb | (msb << 8)
}

/// ISP clock selection for [`Function::SetIspSck`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum IspSck {
    /// Firmware picks the clock (jumper setting)
    #[default]
    Auto = 0,
    Hz500 = 1,
    Khz1 = 2,
    Khz2 = 3,
    Khz4 = 4,
    Khz8 = 5,
    Khz16 = 6,
    Khz32 = 7,
    Khz93_75 = 8,
    Khz187_5 = 9,
    Khz375 = 10,
    Khz750 = 11,
    Mhz1_5 = 12,
}

impl IspSck {
    /// All clock settings, slowest first after `Auto`
    pub const ALL: [IspSck; 13] = [
        IspSck::Auto,
        IspSck::Hz500,
        IspSck::Khz1,
        IspSck::Khz2,
        IspSck::Khz4,
        IspSck::Khz8,
        IspSck::Khz16,
        IspSck::Khz32,
        IspSck::Khz93_75,
        IspSck::Khz187_5,
        IspSck::Khz375,
        IspSck::Khz750,
        IspSck::Mhz1_5,
    ];

    /// Identifier sent to the firmware
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Option-string spelling
    pub fn label(self) -> &'static str {
        match self {
            IspSck::Auto => "auto",
            IspSck::Hz500 => "500",
            IspSck::Khz1 => "1k",
            IspSck::Khz2 => "2k",
            IspSck::Khz4 => "4k",
            IspSck::Khz8 => "8k",
            IspSck::Khz16 => "16k",
            IspSck::Khz32 => "32k",
            IspSck::Khz93_75 => "93.75k",
            IspSck::Khz187_5 => "187.5k",
            IspSck::Khz375 => "375k",
            IspSck::Khz750 => "750k",
            IspSck::Mhz1_5 => "1.5M",
        }
    }
}

impl fmt::Display for IspSck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for IspSck {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().trim_end_matches(['h', 'H', 'z', 'Z']);
        IspSck::ALL
            .iter()
            .copied()
            .find(|sck| sck.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                let valid: Vec<&str> = IspSck::ALL.iter().map(|s| s.label()).collect();
                format!("invalid ISP clock '{}' (valid: {})", s, valid.join(", "))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_flash_param_small_pages() {
        // ATmega8: 64-byte pages
        assert_eq!(write_flash_param(64, BLOCKFLAG_FIRST), 0x0140);
        assert_eq!(write_flash_param(64, 0), 0x0040);
        assert_eq!(write_flash_param(64, BLOCKFLAG_LAST), 0x0240);
        assert_eq!(write_flash_param(128, BLOCKFLAG_FIRST | BLOCKFLAG_LAST), 0x0380);
    }

    #[test]
    fn test_write_flash_param_large_pages() {
        // 256-byte pages put bit 8 into the high nibble
        assert_eq!(write_flash_param(256, BLOCKFLAG_FIRST), 0x1100);
        assert_eq!(write_flash_param(256, 0), 0x1000);
        assert_eq!(write_flash_param(256, BLOCKFLAG_LAST), 0x1200);
        assert_eq!(write_flash_param(0x200, 0), 0x2000);
        assert_eq!(write_flash_param(0xFFF, BLOCKFLAG_FIRST | BLOCKFLAG_LAST), 0xF3FF);
    }

    #[test]
    fn test_write_flash_param_no_paging() {
        assert_eq!(write_flash_param(0, BLOCKFLAG_FIRST), 0x0100);
    }

    #[test]
    fn test_isp_bytes() {
        assert_eq!(isp_bytes(isp::READ_SIGNATURE, 1), [0x30, 0x00, 0x01, 0x00]);
        assert_eq!(isp_bytes(isp::CHIP_ERASE, 0), [0xAC, 0x80, 0x00, 0x00]);
        assert_eq!(isp_bytes(isp::READ_HIGH_FUSE, 0), [0x58, 0x08, 0x00, 0x00]);
        assert_eq!(
            isp_bytes(isp::WRITE_LOW_FUSE, 0xE2 << 8),
            [0xAC, 0xA0, 0x00, 0xE2]
        );
    }

    #[test]
    fn test_function_codes() {
        assert_eq!(Function::Transmit as u8, 3);
        assert_eq!(Function::GetCapabilities as u8, 127);
        assert_eq!(Function::from_code(6), Some(Function::WriteFlash));
        assert_eq!(Function::from_code(42), None);
    }

    #[test]
    fn test_parse_sck() {
        assert_eq!("auto".parse::<IspSck>().unwrap(), IspSck::Auto);
        assert_eq!("375k".parse::<IspSck>().unwrap(), IspSck::Khz375);
        assert_eq!("375kHz".parse::<IspSck>().unwrap(), IspSck::Khz375);
        assert_eq!("1.5m".parse::<IspSck>().unwrap(), IspSck::Mhz1_5);
        assert_eq!("500".parse::<IspSck>().unwrap().id(), 1);
        assert!("3k".parse::<IspSck>().is_err());
    }
}
