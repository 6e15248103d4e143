//! Serial line abstraction
//!
//! The programmers only need a handful of line operations: open/close, the
//! DTR reset signal, discarding stale buffers, writing a frame, and an
//! independent reader handle for the receive thread.

use std::io::{Read, Write};
use std::time::Duration;

use avrburner_core::programmer::is_supported_baud;
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::error::{Result, Stk500Error};

/// How often the receive thread wakes up to check for shutdown
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Default baud rate for bootloaders
pub const DEFAULT_BAUD: u32 = 115200;

/// Write timeout on the main port handle
const WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Serial port and baud rate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Device path (e.g., "/dev/ttyUSB0" or "COM3")
    pub port: String,
    /// Baud rate
    pub baud: u32,
}

impl SerialConfig {
    /// Create a serial configuration, rejecting unsupported baud rates
    pub fn new(port: impl Into<String>, baud: u32) -> Result<Self> {
        if !is_supported_baud(baud) {
            return Err(Stk500Error::InvalidParameter(format!(
                "unsupported baud rate {} (use 19200, 38400, 57600 or 115200)",
                baud
            )));
        }
        Ok(Self {
            port: port.into(),
            baud,
        })
    }
}

/// Byte-level serial line
pub trait SerialLine {
    /// Open the physical port
    fn open(&mut self) -> Result<()>;

    /// Close the port; safe to call when not open
    fn close(&mut self);

    /// Whether the port is open
    fn is_open(&self) -> bool;

    /// Drive the DTR line (wired to the target's reset on most boards)
    fn set_dtr(&mut self, level: bool) -> Result<()>;

    /// Discard unread input and unsent output
    fn clear_buffers(&mut self) -> Result<()>;

    /// Write a complete frame
    fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Independent reader for the receive thread
    ///
    /// Reads must return `TimedOut` or `WouldBlock` at least every
    /// [`POLL_INTERVAL`] when idle, and `Ok(0)` once the line is gone.
    fn reader(&mut self) -> Result<Box<dyn Read + Send>>;
}

/// Reader half of a cloned port handle
struct PortReader(Box<dyn SerialPort>);

impl Read for PortReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf)
    }
}

/// `serialport`-backed line
pub struct SerialPortLine {
    config: SerialConfig,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialPortLine {
    /// Create a closed line
    pub fn new(config: SerialConfig) -> Self {
        Self { config, port: None }
    }

    /// Serial configuration
    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or(Stk500Error::NotOpen)
    }
}

impl SerialLine for SerialPortLine {
    fn open(&mut self) -> Result<()> {
        let port = serialport::new(&self.config.port, self.config.baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(WRITE_TIMEOUT)
            .open()?;

        log::info!(
            "Opened serial port {} at {} baud",
            self.config.port,
            self.config.baud
        );

        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            log::debug!("Closed serial port {}", self.config.port);
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn set_dtr(&mut self, level: bool) -> Result<()> {
        self.port()?.write_data_terminal_ready(level)?;
        Ok(())
    }

    fn clear_buffers(&mut self) -> Result<()> {
        self.port()?.clear(ClearBuffer::All)?;
        Ok(())
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port()?;
        port.write_all(data)?;
        port.flush()?;
        Ok(())
    }

    fn reader(&mut self) -> Result<Box<dyn Read + Send>> {
        let mut clone = self.port()?.try_clone()?;
        clone.set_timeout(POLL_INTERVAL)?;
        Ok(Box::new(PortReader(clone)))
    }
}
