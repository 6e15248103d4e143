//! Error types for the USBasp programmer

use avrburner_core::error::Error as CoreError;
use thiserror::Error;

/// USBasp-specific errors
#[derive(Debug, Error)]
pub enum UsbaspError {
    /// No device with the configured identifiers is attached
    #[error("USBasp not found (VID:{vendor_id:04X} PID:{product_id:04X})")]
    DeviceNotFound {
        /// Vendor ID searched for
        vendor_id: u16,
        /// Product ID searched for
        product_id: u16,
    },

    /// Failed to open the USB device
    #[error("failed to open USBasp: {0}")]
    OpenFailed(String),

    /// Failed to claim the interface
    #[error("failed to claim interface: {0}")]
    ClaimFailed(String),

    /// Control transfer failed
    #[error("USB control transfer failed: {0}")]
    TransferFailed(String),

    /// The device handle is not open
    #[error("USBasp is not open")]
    NotOpen,

    /// The device answered with fewer bytes than the request needs
    #[error("short reply to function {function}: expected {expected} bytes, got {received}")]
    ShortResponse {
        /// Function code of the request
        function: u8,
        /// Bytes needed
        expected: usize,
        /// Bytes received
        received: usize,
    },

    /// ENABLEPROG was answered with a non-zero status
    #[error("failed to enter programming mode (status 0x{0:02X})")]
    EnterProgMode(u8),

    /// SETISPSCK was answered with a non-zero status
    #[error("failed to set ISP clock (status 0x{0:02X})")]
    SetSck(u8),

    /// Invalid parameter
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for USBasp operations
pub type Result<T> = core::result::Result<T, UsbaspError>;

impl From<UsbaspError> for CoreError {
    fn from(e: UsbaspError) -> Self {
        match e {
            UsbaspError::NotOpen => CoreError::NotConnected,
            UsbaspError::EnterProgMode(status) => CoreError::EnterProgMode(status),
            UsbaspError::ShortResponse { .. } | UsbaspError::SetSck(_) => {
                CoreError::InvalidResponse(e.to_string())
            }
            UsbaspError::InvalidParameter(msg) => CoreError::InvalidParameter(msg),
            UsbaspError::DeviceNotFound { .. }
            | UsbaspError::OpenFailed(_)
            | UsbaspError::ClaimFailed(_)
            | UsbaspError::TransferFailed(_) => CoreError::Transport(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_mapping() {
        assert_eq!(
            CoreError::from(UsbaspError::EnterProgMode(1)),
            CoreError::EnterProgMode(1)
        );
        assert_eq!(CoreError::from(UsbaspError::NotOpen), CoreError::NotConnected);
        assert!(matches!(
            CoreError::from(UsbaspError::TransferFailed("pipe".into())),
            CoreError::Transport(msg) if msg.contains("pipe")
        ));
        assert_eq!(
            UsbaspError::DeviceNotFound {
                vendor_id: 0x16C0,
                product_id: 0x05DC
            }
            .to_string(),
            "USBasp not found (VID:16C0 PID:05DC)"
        );
    }
}
