//! avrburner-stk500 - STK500 and STK500v2 serial bootloader support
//!
//! This crate talks to AVR bootloaders over a serial line: the original
//! STK500 protocol used by Arduino-style boards ([`Stk500`]) and the
//! packetized STK500v2 protocol ([`Stk500v2`]).
//!
//! # Line Discipline
//!
//! Opening the port raises DTR, which resets most boards into their
//! bootloader, and waits for the configured reset pulse. A background thread
//! then collects incoming bytes into a 4096-byte buffer; each command waits
//! on a condition variable until its full reply has arrived or the timeout
//! expires. Only one command is outstanding at a time, and stale input is
//! discarded before each command.
//!
//! # Example
//!
//! ```no_run
//! use avrburner_core::programmer::{Programmer, ProgrammerConfig};
//! use avrburner_stk500::{SerialConfig, Stk500};
//!
//! let serial = SerialConfig::new("/dev/ttyUSB0", 115200)?;
//! let mut stk = Stk500::new(serial, ProgrammerConfig::default());
//! stk.open(true)?;
//! println!("Signature: {}", stk.read_signature()?);
//! stk.close();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Configuration Options
//!
//! - `dev=/dev/ttyUSB0` (or `port=`): serial device, required
//! - `baud=115200`: 19200, 38400, 57600 or 115200
//! - `reset=150`: reset pulse in milliseconds
//! - `timeout=1500`: per-command timeout in milliseconds
//! - `strict=1`: validate STK500v2 answers fully

mod error;
mod line;
mod link;
mod receiver;
#[cfg(test)]
mod testing;
pub mod v1;
pub mod v2;

pub use error::{Result, Stk500Error};
pub use line::{SerialConfig, SerialLine, SerialPortLine, DEFAULT_BAUD, POLL_INTERVAL};
pub use receiver::RX_BUFFER_SIZE;
pub use v1::Stk500;
pub use v2::{Stk500v2, Strictness};

use avrburner_core::programmer::ProgrammerConfig;

/// Parsed programmer options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stk500Options {
    /// Port and baud rate
    pub serial: SerialConfig,
    /// Reset pulse and timeout
    pub config: ProgrammerConfig,
    /// STK500v2 answer validation
    pub strictness: Strictness,
}

impl Stk500Options {
    /// Build an STK500 programmer from these options
    pub fn stk500(&self) -> Stk500 {
        Stk500::new(self.serial.clone(), self.config)
    }

    /// Build an STK500v2 programmer from these options
    pub fn stk500v2(&self) -> Stk500v2 {
        Stk500v2::new(self.serial.clone(), self.config, self.strictness)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Stk500Error::InvalidParameter(format!("{}: {}", key, value)))
}

/// Parse options from key=value pairs
pub fn parse_options(options: &[(&str, &str)]) -> Result<Stk500Options> {
    let mut port = None;
    let mut baud = DEFAULT_BAUD;
    let mut config = ProgrammerConfig::default();
    let mut strictness = Strictness::default();

    for (key, value) in options {
        match *key {
            "dev" | "port" => port = Some(value.to_string()),
            "baud" => baud = parse_number(key, value)?,
            "reset" => config = config.with_reset_pulse_ms(parse_number(key, value)?),
            "timeout" => config = config.with_timeout_ms(parse_number(key, value)?),
            "strict" => strictness = value.parse().map_err(Stk500Error::InvalidParameter)?,
            _ => {
                return Err(Stk500Error::InvalidParameter(format!(
                    "unknown option: {}",
                    key
                )))
            }
        }
    }

    let port = port.ok_or_else(|| {
        Stk500Error::InvalidParameter("missing serial port (use dev=/dev/ttyUSB0)".into())
    })?;

    Ok(Stk500Options {
        serial: SerialConfig::new(port, baud)?,
        config,
        strictness,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_options_defaults() {
        let opts = parse_options(&[("dev", "/dev/ttyACM0")]).unwrap();
        assert_eq!(opts.serial.port, "/dev/ttyACM0");
        assert_eq!(opts.serial.baud, 115200);
        assert_eq!(opts.config, ProgrammerConfig::default());
        assert_eq!(opts.strictness, Strictness::Lenient);
    }

    #[test]
    fn test_parse_options_all() {
        let opts = parse_options(&[
            ("port", "COM3"),
            ("baud", "57600"),
            ("reset", "50"),
            ("timeout", "500"),
            ("strict", "1"),
        ])
        .unwrap();
        assert_eq!(opts.serial.port, "COM3");
        assert_eq!(opts.serial.baud, 57600);
        assert_eq!(opts.config.reset_pulse, Duration::from_millis(50));
        assert_eq!(opts.config.timeout, Duration::from_millis(500));
        assert_eq!(opts.strictness, Strictness::Strict);
    }

    #[test]
    fn test_parse_options_errors() {
        assert!(parse_options(&[]).is_err());
        assert!(parse_options(&[("dev", "/dev/ttyUSB0"), ("baud", "9600")]).is_err());
        assert!(parse_options(&[("dev", "/dev/ttyUSB0"), ("reset", "soon")]).is_err());
        assert!(parse_options(&[("dev", "/dev/ttyUSB0"), ("parity", "even")]).is_err());
    }
}
