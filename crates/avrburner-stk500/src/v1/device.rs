//! STK500 programmer

use avrburner_core::chip::Signature;
use avrburner_core::error::{Error as CoreError, Result as CoreResult};
use avrburner_core::memory::MemSource;
use avrburner_core::programmer::{Capabilities, PageAccess, Programmer, ProgrammerConfig};

use super::protocol::*;
use crate::error::{Result, Stk500Error};
use crate::line::{SerialConfig, SerialLine, SerialPortLine};
use crate::link::Link;

/// STK500 (version 1) bootloader, as found on Arduino-style boards
pub struct Stk500<L: SerialLine = SerialPortLine> {
    link: Link<L>,
    connected: bool,
    prog_mode: bool,
}

impl Stk500<SerialPortLine> {
    /// Create a closed programmer on a serial port
    pub fn new(serial: SerialConfig, config: ProgrammerConfig) -> Self {
        Self::with_line(SerialPortLine::new(serial), config)
    }
}

impl<L: SerialLine> Stk500<L> {
    /// Create a closed programmer on a custom serial line
    pub fn with_line(line: L, config: ProgrammerConfig) -> Self {
        Self {
            link: Link::new(line, config),
            connected: false,
            prog_mode: false,
        }
    }

    /// Timing configuration
    pub fn config(&self) -> &ProgrammerConfig {
        self.link.config()
    }

    /// Borrow the serial line
    pub fn line(&self) -> &L {
        self.link.line()
    }

    /// Whether the bootloader is in programming mode
    pub fn in_prog_mode(&self) -> bool {
        self.prog_mode
    }

    /// Send one command and return its payload
    fn command(&mut self, command: u8, args: &[u8], payload_len: usize) -> Result<Vec<u8>> {
        log::debug!("STK500 command 0x{:02X}", command);
        let frame = encode(command, args);
        let response = self.link.exchange(&frame, response_len(payload_len))?;
        decode(command, &response, payload_len).map(<[u8]>::to_vec)
    }

    /// Synchronize with the bootloader
    pub fn get_sync(&mut self) -> Result<()> {
        self.command(CMD_GET_SYNC, &[], 0)?;
        Ok(())
    }

    /// Read one of the [`param`] values
    pub fn get_parameter(&mut self, parameter: u8) -> Result<u8> {
        let payload = self.command(CMD_GET_PARAMETER, &[parameter], 1)?;
        Ok(payload[0])
    }

    /// Leave the bootloader and run the application
    pub fn start_user_app(&mut self) -> Result<()> {
        self.command(CMD_START_USERAPP, &[], 0)?;
        self.prog_mode = false;
        Ok(())
    }

    fn connect(&mut self, enter_prog_mode: bool) -> CoreResult<()> {
        self.link.open()?;
        if enter_prog_mode {
            self.get_sync()?;
            match self.command(CMD_ENTER_PROGMODE, &[], 0) {
                Ok(_) => self.prog_mode = true,
                Err(Stk500Error::Status { status, .. }) => {
                    return Err(CoreError::EnterProgMode(status))
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn teardown(&mut self) {
        if self.link.is_open() && self.prog_mode {
            if let Err(e) = self.command(CMD_LEAVE_PROGMODE, &[], 0) {
                log::warn!("STK500 leave programming mode failed: {}", e);
            }
        }
        self.link.close();
        self.prog_mode = false;
        self.connected = false;
    }
}

impl<L: SerialLine> PageAccess for Stk500<L> {
    fn load_address(&mut self, address: u32) -> CoreResult<()> {
        let args = load_address_args(address)?;
        self.command(CMD_LOAD_ADDRESS, &args, 0)?;
        Ok(())
    }

    fn read_page(&mut self, source: MemSource, buf: &mut [u8]) -> CoreResult<()> {
        let args = page_args(buf.len(), source.tag())?;
        let payload = self.command(CMD_READ_PAGE, &args, buf.len())?;
        buf.copy_from_slice(&payload);
        Ok(())
    }

    fn write_page(&mut self, source: MemSource, data: &[u8]) -> CoreResult<()> {
        let mut args = page_args(data.len(), source.tag())?.to_vec();
        args.extend_from_slice(data);
        self.command(CMD_PROG_PAGE, &args, 0)?;
        Ok(())
    }
}

impl<L: SerialLine> Programmer for Stk500<L> {
    fn name(&self) -> &'static str {
        "stk500"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::READ_SIGNATURE | Capabilities::DEVICE_NAME | Capabilities::PAGE_SIZE
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn open(&mut self, enter_prog_mode: bool) -> CoreResult<()> {
        if self.link.is_open() {
            self.teardown();
        }

        if let Err(e) = self.connect(enter_prog_mode) {
            self.teardown();
            return Err(e);
        }

        self.connected = true;
        log::info!("STK500 bootloader connected");
        Ok(())
    }

    fn close(&mut self) {
        self.teardown();
    }

    fn read_signature(&mut self) -> CoreResult<Signature> {
        let payload = self.command(CMD_READ_SIGN, &[], 3)?;
        Ok(Signature::from_bytes([payload[0], payload[1], payload[2]]))
    }

    fn device_name(&mut self) -> CoreResult<String> {
        let payload = self.command(CMD_GET_SIGN_ON, &[], SIGN_ON_LEN)?;
        Ok(String::from_utf8_lossy(&payload).trim_end_matches('\0').to_string())
    }

    fn page_size(&mut self) -> CoreResult<usize> {
        let msb = self.get_parameter(param::PAGESIZE_MSB)?;
        let lsb = self.get_parameter(param::PAGESIZE_LSB)?;
        Ok(usize::from(u16::from_be_bytes([msb, lsb])))
    }
}

impl<L: SerialLine> Drop for Stk500<L> {
    fn drop(&mut self) {
        self.teardown();
    }
}
