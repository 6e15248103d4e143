//! STK500v2 packet format and command set
//!
//! ```text
//! [MESSAGE_START][sequence][size_hi][size_lo][TOKEN][body...][checksum]
//! ```
//!
//! The checksum is the XOR of every preceding byte. Answers echo the
//! command byte followed by a status byte.

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, Stk500Error};

/// Packet start marker
pub const MESSAGE_START: u8 = 0x1B;
/// Marker between header and body
pub const TOKEN: u8 = 0x0E;
/// Bytes before the body
pub const HEADER_LEN: usize = 5;
/// Header plus checksum
pub const PACKET_OVERHEAD: usize = HEADER_LEN + 1;

/// Command codes
pub mod cmd {
    /// Read the programmer identification
    pub const SIGN_ON: u8 = 0x01;
    /// Load a word address
    pub const LOAD_ADDRESS: u8 = 0x06;
    /// Enter ISP programming mode
    pub const ENTER_PROGMODE_ISP: u8 = 0x10;
    /// Leave ISP programming mode
    pub const LEAVE_PROGMODE_ISP: u8 = 0x11;
    /// Erase the chip
    pub const CHIP_ERASE_ISP: u8 = 0x12;
    /// Program flash
    pub const PROGRAM_FLASH_ISP: u8 = 0x13;
    /// Read flash
    pub const READ_FLASH_ISP: u8 = 0x14;
    /// Program EEPROM
    pub const PROGRAM_EEPROM_ISP: u8 = 0x15;
    /// Read EEPROM
    pub const READ_EEPROM_ISP: u8 = 0x16;
    /// Program a fuse byte
    pub const PROGRAM_FUSE_ISP: u8 = 0x17;
    /// Read a fuse byte
    pub const READ_FUSE_ISP: u8 = 0x18;
    /// Program the lock bits
    pub const PROGRAM_LOCK_ISP: u8 = 0x19;
    /// Read the lock bits
    pub const READ_LOCK_ISP: u8 = 0x1A;
    /// Read one signature byte
    pub const READ_SIGNATURE_ISP: u8 = 0x1B;
    /// Read the oscillator calibration byte
    pub const READ_OSCCAL_ISP: u8 = 0x1C;
}

/// Answer status codes
pub mod status {
    /// Success
    pub const CMD_OK: u8 = 0x00;
    /// Command timed out
    pub const CMD_TOUT: u8 = 0x80;
    /// Target stayed busy
    pub const RDY_BSY_TOUT: u8 = 0x81;
    /// A required parameter was never set
    pub const SET_PARAM_MISSING: u8 = 0x82;
    /// Command failed
    pub const CMD_FAILED: u8 = 0xC0;
    /// Packet checksum rejected by the programmer
    pub const CKSUM_ERROR: u8 = 0xC1;
    /// Unknown command
    pub const CMD_UNKNOWN: u8 = 0xC9;
    /// Answer checksum error
    pub const ANSWER_CKSUM_ERROR: u8 = 0xB0;
}

/// How much of an answer packet is validated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strictness {
    /// Check the start marker only; tolerates noisy lines
    #[default]
    Lenient,
    /// Also check the token, length, checksum, command echo and status
    Strict,
}

impl fmt::Display for Strictness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strictness::Lenient => f.write_str("lenient"),
            Strictness::Strict => f.write_str("strict"),
        }
    }
}

impl FromStr for Strictness {
    type Err = String;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "0" | "no" | "false" | "lenient" => Ok(Strictness::Lenient),
            "1" | "yes" | "true" | "strict" => Ok(Strictness::Strict),
            _ => Err(format!("invalid strictness: {}", s)),
        }
    }
}

/// XOR of all bytes
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// Wrap `body` in a packet
pub fn encode_packet(sequence: u8, body: &[u8]) -> Result<Vec<u8>> {
    let len = u16::try_from(body.len()).map_err(|_| {
        Stk500Error::InvalidParameter(format!("message body of {} bytes too long", body.len()))
    })?;
    let [len_hi, len_lo] = len.to_be_bytes();

    let mut packet = Vec::with_capacity(body.len() + PACKET_OVERHEAD);
    packet.extend_from_slice(&[MESSAGE_START, sequence, len_hi, len_lo, TOKEN]);
    packet.extend_from_slice(body);
    packet.push(checksum(&packet));
    Ok(packet)
}

/// Validate an answer packet and return its `answer_len`-byte body
pub fn decode_packet(packet: &[u8], answer_len: usize, strictness: Strictness) -> Result<&[u8]> {
    let first = packet.first().copied().ok_or(Stk500Error::NoResponse)?;
    if first != MESSAGE_START {
        return Err(Stk500Error::NotInSync {
            expected: MESSAGE_START,
            found: first,
        });
    }

    let expected = answer_len + PACKET_OVERHEAD;
    if packet.len() < expected {
        return Err(Stk500Error::ShortResponse {
            expected,
            received: packet.len(),
        });
    }

    if strictness == Strictness::Strict {
        if packet[4] != TOKEN {
            return Err(Stk500Error::UnexpectedByte {
                offset: 4,
                expected: TOKEN,
                found: packet[4],
            });
        }
        let declared = usize::from(u16::from_be_bytes([packet[2], packet[3]]));
        if declared != answer_len {
            return Err(Stk500Error::LengthMismatch {
                expected: answer_len,
                found: declared,
            });
        }
        let computed = checksum(&packet[..expected - 1]);
        if computed != packet[expected - 1] {
            return Err(Stk500Error::Checksum {
                expected: computed,
                found: packet[expected - 1],
            });
        }
    }

    Ok(&packet[HEADER_LEN..HEADER_LEN + answer_len])
}

/// Check the status byte of an answer
pub fn check_status(command: u8, answer: &[u8]) -> Result<()> {
    match answer.get(1).copied() {
        Some(status::CMD_OK) => Ok(()),
        Some(status) => Err(Stk500Error::Status { command, status }),
        None => Err(Stk500Error::ShortResponse {
            expected: 2,
            received: answer.len(),
        }),
    }
}

/// Check the command echo and status of an answer in strict mode
pub fn check_answer(command: u8, answer: &[u8], strictness: Strictness) -> Result<()> {
    if strictness == Strictness::Lenient {
        return Ok(());
    }
    if let Some(&echo) = answer.first() {
        if echo != command {
            return Err(Stk500Error::UnexpectedByte {
                offset: HEADER_LEN,
                expected: command,
                found: echo,
            });
        }
    }
    check_status(command, answer)
}
