//! Error types for the STK500 programmers

use avrburner_core::error::Error as CoreError;
use thiserror::Error;

/// STK500-specific errors
#[derive(Debug, Error)]
pub enum Stk500Error {
    /// Serial port error
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error during communication
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The serial line is not open
    #[error("serial line is not open")]
    NotOpen,

    /// Nothing arrived before the timeout
    #[error("no response from bootloader")]
    NoResponse,

    /// The first response byte was not the sync marker
    #[error("bootloader not in sync: expected 0x{expected:02X}, got 0x{found:02X}")]
    NotInSync {
        /// Expected marker
        expected: u8,
        /// Byte received
        found: u8,
    },

    /// The response ended before the expected length
    #[error("short response: expected {expected} bytes, got {received}")]
    ShortResponse {
        /// Bytes expected
        expected: usize,
        /// Bytes received
        received: usize,
    },

    /// A framing byte had the wrong value
    #[error("unexpected byte at offset {offset}: expected 0x{expected:02X}, got 0x{found:02X}")]
    UnexpectedByte {
        /// Offset in the response
        offset: usize,
        /// Expected value
        expected: u8,
        /// Value received
        found: u8,
    },

    /// The length field disagrees with the expected answer size
    #[error("length mismatch: expected {expected}, packet says {found}")]
    LengthMismatch {
        /// Expected body length
        expected: usize,
        /// Body length in the packet header
        found: usize,
    },

    /// The device reported a failure status for a command
    #[error("command 0x{command:02X} failed with status 0x{status:02X}")]
    Status {
        /// Command byte
        command: u8,
        /// Status byte returned
        status: u8,
    },

    /// Packet checksum mismatch
    #[error("checksum mismatch: expected 0x{expected:02X}, got 0x{found:02X}")]
    Checksum {
        /// Computed checksum
        expected: u8,
        /// Checksum byte received
        found: u8,
    },

    /// Invalid parameter
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for STK500 operations
pub type Result<T> = core::result::Result<T, Stk500Error>;

impl From<Stk500Error> for CoreError {
    fn from(e: Stk500Error) -> Self {
        match e {
            Stk500Error::Serial(_) | Stk500Error::Io(_) => CoreError::Transport(e.to_string()),
            Stk500Error::NotOpen => CoreError::NotConnected,
            Stk500Error::NoResponse => CoreError::NoResponse,
            Stk500Error::NotInSync { expected, found } => CoreError::Sync { expected, found },
            Stk500Error::InvalidParameter(msg) => CoreError::InvalidParameter(msg),
            Stk500Error::ShortResponse { .. }
            | Stk500Error::UnexpectedByte { .. }
            | Stk500Error::LengthMismatch { .. }
            | Stk500Error::Status { .. }
            | Stk500Error::Checksum { .. } => CoreError::InvalidResponse(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_mapping() {
        assert_eq!(CoreError::from(Stk500Error::NoResponse), CoreError::NoResponse);
        assert_eq!(
            CoreError::from(Stk500Error::NotInSync {
                expected: 0x14,
                found: 0x15
            }),
            CoreError::Sync {
                expected: 0x14,
                found: 0x15
            }
        );
        assert!(matches!(
            CoreError::from(Stk500Error::Status {
                command: 0x50,
                status: 0x13
            }),
            CoreError::InvalidResponse(_)
        ));
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        assert!(matches!(
            CoreError::from(Stk500Error::from(io)),
            CoreError::Transport(_)
        ));
    }
}
