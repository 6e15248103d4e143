//! Error types for avrburner-core
//!
//! Every programmer back-end converts its own error type into [`Error`] at
//! the [`Programmer`](crate::programmer::Programmer) boundary, so callers see
//! one taxonomy regardless of the hardware variant.

use thiserror::Error;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    // Link errors
    /// Physical link failure (USB transfer or serial I/O). The connection
    /// must be closed and reopened.
    #[error("transport error: {0}")]
    Transport(String),

    // Protocol errors
    /// Nothing was received within the read/write timeout
    #[error("no response from programmer")]
    NoResponse,
    /// The first response byte was not the expected synchronization marker
    #[error("programmer not in sync: expected 0x{expected:02X}, got 0x{found:02X}")]
    Sync {
        /// Expected marker byte
        expected: u8,
        /// Byte actually received
        found: u8,
    },
    /// The response was framed incorrectly or was too short
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    // Session errors
    /// The device refused to enter programming mode
    #[error("failed to enter programming mode (status 0x{0:02X})")]
    EnterProgMode(u8),
    /// The operation is not implemented by this programmer variant
    #[error("{0} is not supported by this programmer")]
    NotSupported(&'static str),
    /// An operation was attempted before `open()` succeeded
    #[error("programmer is not connected")]
    NotConnected,

    // Caller errors
    /// Invalid parameter passed to an operation
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl Error {
    /// Whether the connection is still usable after this error.
    ///
    /// Only `NotSupported` and `InvalidParameter` leave the link in a known
    /// state; everything else requires `close()` before retrying.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotSupported(_) | Self::InvalidParameter(_))
    }
}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
