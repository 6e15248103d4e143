//! avrburner-usbasp - USBasp USB programmer support
//!
//! This crate drives USBasp programmers (VID:16C0 PID:05DC by default)
//! through USB vendor control transfers.
//!
//! # Protocol Overview
//!
//! Each operation is one control transfer: the function code is the request
//! number and up to three 16-bit parameters travel in `wValue`, `wIndex` and
//! `wLength`. Low-level AVR ISP instructions (signature, fuses, erase, busy
//! poll) are sent through the generic TRANSMIT function; the target's answer
//! is byte 3 of the reply. Flash pages are streamed in 200-byte blocks tagged
//! with FIRST/LAST flags.
//!
//! # Example
//!
//! ```no_run
//! use avrburner_core::programmer::Programmer;
//! use avrburner_usbasp::{Usbasp, UsbaspConfig};
//!
//! let mut usbasp = Usbasp::new(UsbaspConfig::default());
//! usbasp.open(true)?;
//! println!("Signature: {}", usbasp.read_signature()?);
//! usbasp.close();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Configuration Options
//!
//! - `vid=0x16C0`, `pid=0x05DC`: USB identifiers
//! - `sck=auto|500|1k|2k|4k|8k|16k|32k|93.75k|187.5k|375k|750k|1.5M`: ISP clock

mod device;
mod error;
pub mod protocol;
mod transport;

pub use device::{parse_options, Usbasp, UsbaspConfig, DEFAULT_ERASE_DELAY};
pub use error::{Result, UsbaspError};
pub use protocol::IspSck;
pub use transport::{list_devices, NusbTransport, UsbControl, UsbaspDeviceInfo};
