//! STK500 (version 1) protocol constants and framing
//!
//! Commands are a command byte, its arguments and `CRC_EOP`. A reply is
//! `STK_INSYNC`, the payload and `STK_OK`; failures replace `STK_OK` with
//! one of the other response codes.

use crate::error::{Result, Stk500Error};

// Response codes
/// Command succeeded
pub const STK_OK: u8 = 0x10;
/// Command failed
pub const STK_FAILED: u8 = 0x11;
/// Unknown command
pub const STK_UNKNOWN: u8 = 0x12;
/// No target device
pub const STK_NODEVICE: u8 = 0x13;
/// Reply start marker
pub const STK_INSYNC: u8 = 0x14;
/// Command not terminated by `CRC_EOP`
pub const STK_NOSYNC: u8 = 0x15;

/// End-of-packet marker
pub const CRC_EOP: u8 = 0x20;

// Command opcodes
/// Synchronize with the bootloader
pub const CMD_GET_SYNC: u8 = 0x30;
/// Read the programmer identification string
pub const CMD_GET_SIGN_ON: u8 = 0x31;
/// Read a parameter
pub const CMD_GET_PARAMETER: u8 = 0x41;
/// Enter programming mode
pub const CMD_ENTER_PROGMODE: u8 = 0x50;
/// Leave programming mode
pub const CMD_LEAVE_PROGMODE: u8 = 0x51;
/// Load a word address
pub const CMD_LOAD_ADDRESS: u8 = 0x55;
/// Program a page
pub const CMD_PROG_PAGE: u8 = 0x64;
/// Read a page
pub const CMD_READ_PAGE: u8 = 0x74;
/// Read the 3-byte signature
pub const CMD_READ_SIGN: u8 = 0x75;
/// Jump to the application (bootloader extension)
pub const CMD_START_USERAPP: u8 = 0xFF;

/// Length of the sign-on string
pub const SIGN_ON_LEN: usize = 7;

/// Readable parameters
pub mod param {
    /// Hardware version
    pub const HW_VER: u8 = 0x80;
    /// Software major version
    pub const SW_MAJOR: u8 = 0x81;
    /// Software minor version
    pub const SW_MINOR: u8 = 0x82;
    /// Page size, high byte
    pub const PAGESIZE_MSB: u8 = 0x83;
    /// Page size, low byte
    pub const PAGESIZE_LSB: u8 = 0x84;
}

/// Build a command frame
pub fn encode(command: u8, args: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(args.len() + 2);
    frame.push(command);
    frame.extend_from_slice(args);
    frame.push(CRC_EOP);
    frame
}

/// Number of reply bytes for a payload of `payload_len`
pub const fn response_len(payload_len: usize) -> usize {
    payload_len + 2
}

/// Validate a reply and return its payload
pub fn decode(command: u8, response: &[u8], payload_len: usize) -> Result<&[u8]> {
    let first = response.first().copied().ok_or(Stk500Error::NoResponse)?;
    if first != STK_INSYNC {
        return Err(Stk500Error::NotInSync {
            expected: STK_INSYNC,
            found: first,
        });
    }

    // Failure codes can arrive in place of a payload
    if payload_len > 0 && response.len() == 2 && is_failure(response[1]) {
        return Err(Stk500Error::Status {
            command,
            status: response[1],
        });
    }

    let expected = response_len(payload_len);
    if response.len() < expected {
        return Err(Stk500Error::ShortResponse {
            expected,
            received: response.len(),
        });
    }

    let status = response[payload_len + 1];
    if status != STK_OK {
        return Err(Stk500Error::Status { command, status });
    }

    Ok(&response[1..=payload_len])
}

fn is_failure(code: u8) -> bool {
    matches!(code, STK_FAILED | STK_UNKNOWN | STK_NODEVICE | STK_NOSYNC)
}

/// Arguments of `CMD_LOAD_ADDRESS` for a byte address
pub fn load_address_args(byte_address: u32) -> Result<[u8; 2]> {
    let word = avrburner_core::memory::word_address(byte_address);
    let word = u16::try_from(word).map_err(|_| {
        Stk500Error::InvalidParameter(format!(
            "address 0x{:X} is beyond the 16-bit word range",
            byte_address
        ))
    })?;
    Ok(word.to_le_bytes())
}

/// Arguments of `CMD_READ_PAGE`/`CMD_PROG_PAGE` without the data
pub fn page_args(size: usize, tag: u8) -> Result<[u8; 3]> {
    let size = u16::try_from(size)
        .map_err(|_| Stk500Error::InvalidParameter(format!("page size {} too large", size)))?;
    let [hi, lo] = size.to_be_bytes();
    Ok([hi, lo, tag])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode() {
        assert_eq!(encode(CMD_GET_SYNC, &[]), vec![0x30, 0x20]);
        assert_eq!(
            encode(CMD_LOAD_ADDRESS, &[0x00, 0x01]),
            vec![0x55, 0x00, 0x01, 0x20]
        );
    }

    #[test]
    fn test_opcodes_distinct() {
        let mut opcodes = vec![
            CMD_GET_SYNC,
            CMD_GET_SIGN_ON,
            CMD_GET_PARAMETER,
            CMD_ENTER_PROGMODE,
            CMD_LEAVE_PROGMODE,
            CMD_LOAD_ADDRESS,
            CMD_PROG_PAGE,
            CMD_READ_PAGE,
            CMD_READ_SIGN,
            CMD_START_USERAPP,
        ];
        let count = opcodes.len();
        opcodes.sort_unstable();
        opcodes.dedup();
        assert_eq!(opcodes.len(), count);
    }

    #[test]
    fn test_decode_payload() {
        let rx = [STK_INSYNC, 0x1E, 0x95, 0x0F, STK_OK];
        assert_eq!(decode(CMD_READ_SIGN, &rx, 3).unwrap(), &[0x1E, 0x95, 0x0F]);
        assert_eq!(decode(CMD_GET_SYNC, &[STK_INSYNC, STK_OK], 0).unwrap(), &[] as &[u8]);
    }

    #[test]
    fn test_decode_not_in_sync() {
        assert!(matches!(
            decode(CMD_GET_SYNC, &[STK_NOSYNC, STK_OK], 0),
            Err(Stk500Error::NotInSync {
                expected: STK_INSYNC,
                found: STK_NOSYNC
            })
        ));
    }

    #[test]
    fn test_decode_bad_status() {
        assert!(matches!(
            decode(CMD_GET_SYNC, &[STK_INSYNC, 0x00], 0),
            Err(Stk500Error::Status {
                command: CMD_GET_SYNC,
                status: 0x00
            })
        ));
        assert!(matches!(
            decode(CMD_READ_SIGN, &[STK_INSYNC, STK_NODEVICE], 3),
            Err(Stk500Error::Status {
                status: STK_NODEVICE,
                ..
            })
        ));
    }

    #[test]
    fn test_decode_short() {
        assert!(matches!(
            decode(CMD_READ_SIGN, &[STK_INSYNC, 0x1E, 0x95], 3),
            Err(Stk500Error::ShortResponse {
                expected: 5,
                received: 3
            })
        ));
    }

    #[test]
    fn test_address_and_page_args() {
        // Byte address 0x0100 is word 0x0080, sent low byte first
        assert_eq!(load_address_args(0x0100).unwrap(), [0x80, 0x00]);
        assert_eq!(load_address_args(0x1_FFFE).unwrap(), [0xFF, 0xFF]);
        assert!(load_address_args(0x2_0000).is_err());
        assert_eq!(page_args(200, b'F').unwrap(), [0x00, 0xC8, b'F']);
        assert_eq!(page_args(0x0180, b'E').unwrap(), [0x01, 0x80, b'E']);
    }
}
