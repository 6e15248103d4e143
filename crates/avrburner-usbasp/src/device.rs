//! USBasp device implementation
//!
//! This module provides the `Usbasp` struct that drives a USBasp through
//! vendor control transfers. Memory pages go through READFLASH/WRITEFLASH and
//! their EEPROM counterparts; everything else is a raw ISP instruction sent
//! with TRANSMIT.

use std::time::Duration;

use avrburner_core::chip::Signature;
use avrburner_core::error::Result as CoreResult;
use avrburner_core::memory::{self, MemSource};
use avrburner_core::programmer::{Capabilities, Fuse, PageAccess, Programmer, Progress};

use crate::error::{Result, UsbaspError};
use crate::protocol::*;
use crate::transport::{NusbTransport, UsbControl};

/// Time the target needs to complete a chip erase
pub const DEFAULT_ERASE_DELAY: Duration = Duration::from_millis(1000);

/// Configuration options for a USBasp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbaspConfig {
    /// USB vendor ID
    pub vendor_id: u16,
    /// USB product ID
    pub product_id: u16,
    /// ISP clock to select at open (None leaves the firmware default)
    pub sck: Option<IspSck>,
    /// Wait after issuing a chip erase
    pub erase_delay: Duration,
}

impl Default for UsbaspConfig {
    fn default() -> Self {
        Self {
            vendor_id: USBASP_VENDOR_ID,
            product_id: USBASP_PRODUCT_ID,
            sck: None,
            erase_delay: DEFAULT_ERASE_DELAY,
        }
    }
}

fn parse_u16(key: &str, value: &str) -> Result<u16> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|_| UsbaspError::InvalidParameter(format!("{}: {}", key, value)))
}

/// Parse options from key=value pairs
///
/// Recognised keys: `vid`, `pid` (hex with `0x` or decimal) and `sck`
/// (an [`IspSck`] label such as `375k`).
pub fn parse_options(options: &[(&str, &str)]) -> Result<UsbaspConfig> {
    let mut config = UsbaspConfig::default();

    for (key, value) in options {
        match *key {
            "vid" => config.vendor_id = parse_u16(key, value)?,
            "pid" => config.product_id = parse_u16(key, value)?,
            "sck" => {
                config.sck = Some(value.parse().map_err(UsbaspError::InvalidParameter)?);
            }
            _ => {
                return Err(UsbaspError::InvalidParameter(format!(
                    "unknown option: {}",
                    key
                )))
            }
        }
    }

    Ok(config)
}

/// USBasp programmer
pub struct Usbasp<T: UsbControl = NusbTransport> {
    transport: T,
    config: UsbaspConfig,
    connected: bool,
    /// Byte address set by the last `load_address`
    address: u32,
    /// Firmware switched to 32-bit addressing by SETLONGADDRESS
    long_address: bool,
    /// Capability byte 0 reported at open, if the firmware answered
    capabilities: Option<u8>,
}

impl Usbasp<NusbTransport> {
    /// Create a closed USBasp handle using `nusb`
    pub fn new(config: UsbaspConfig) -> Self {
        let transport = NusbTransport::new(config.vendor_id, config.product_id);
        Self::with_transport(transport, config)
    }
}

impl<T: UsbControl> Usbasp<T> {
    /// Create a closed USBasp handle on a custom control channel
    pub fn with_transport(transport: T, config: UsbaspConfig) -> Self {
        Self {
            transport,
            config,
            connected: false,
            address: 0,
            long_address: false,
            capabilities: None,
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &UsbaspConfig {
        &self.config
    }

    /// Whether the firmware reported TPI support at open
    pub fn supports_tpi(&self) -> bool {
        self.capabilities.is_some_and(|caps| caps & CAP_0_TPI != 0)
    }

    /// Borrow the control channel
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Status request: function code in, up to [`STATUS_LENGTH`] bytes back
    fn request(&mut self, function: Function, value: u16, index: u16) -> Result<Vec<u8>> {
        self.transport
            .control_in(function as u8, value, index, STATUS_LENGTH)
    }

    /// Send one ISP instruction and return the target's answer byte
    fn transmit(&mut self, instruction: u16, param: u16) -> Result<u8> {
        log::trace!("ISP {:02X?}", isp_bytes(instruction, param));
        let rx = self.request(Function::Transmit, instruction, param)?;
        rx.get(3).copied().ok_or(UsbaspError::ShortResponse {
            function: Function::Transmit as u8,
            expected: 4,
            received: rx.len(),
        })
    }

    fn status_byte(function: Function, rx: &[u8]) -> Result<u8> {
        rx.first().copied().ok_or(UsbaspError::ShortResponse {
            function: function as u8,
            expected: 1,
            received: 0,
        })
    }

    /// Select the ISP clock
    pub fn set_sck(&mut self, sck: IspSck) -> Result<()> {
        let rx = self.request(Function::SetIspSck, sck.id() as u16, 0)?;
        let status = Self::status_byte(Function::SetIspSck, &rx)?;
        if status != SET_SCK_OK {
            return Err(UsbaspError::SetSck(status));
        }
        log::debug!("ISP clock set to {}", sck);
        Ok(())
    }

    /// Poll the target's RDY/BSY bit
    ///
    /// Returns `true` when bit 0 of the answer byte is clear: the part sets
    /// it while a programming cycle is still running. Not called
    /// automatically before erase or program instructions.
    pub fn is_chip_ready(&mut self) -> Result<bool> {
        let busy = self.transmit(isp::READ_BSY_BIT, 0)?;
        Ok(busy & 0x01 == 0)
    }

    /// Query GETCAPABILITIES; old firmware does not implement it
    fn read_capabilities(&mut self) -> Option<u8> {
        match self.request(Function::GetCapabilities, 0, 0) {
            Ok(rx) if !rx.is_empty() => {
                log::debug!("USBasp capabilities: {:02X?}", rx);
                Some(rx[0])
            }
            Ok(_) => None,
            Err(e) => {
                log::debug!("USBasp capabilities query not supported: {}", e);
                None
            }
        }
    }

    /// Tell the firmware the full 32-bit address
    ///
    /// Once used, the firmware ignores the 16-bit address in page requests
    /// until the next CONNECT, so every later address goes through here too.
    fn set_long_address(&mut self, address: u32) -> Result<()> {
        let value = (address & 0xFFFF) as u16;
        let index = (address >> 16) as u16;
        self.request(Function::SetLongAddress, value, index)?;
        self.long_address = true;
        Ok(())
    }

    fn select_address(&mut self, address: u32) -> Result<()> {
        if self.long_address || address > 0xFFFF {
            self.set_long_address(address)?;
        }
        self.address = address;
        Ok(())
    }

    fn connect(&mut self, enter_prog_mode: bool) -> Result<()> {
        self.transport.open()?;
        self.request(Function::Connect, 0, 0)?;
        self.long_address = false;

        self.capabilities = self.read_capabilities();
        if self.supports_tpi() {
            log::info!("USBasp firmware supports TPI");
        }

        if let Some(sck) = self.config.sck {
            self.set_sck(sck)?;
        }

        if enter_prog_mode {
            let rx = self.request(Function::EnableProg, 0, 0)?;
            let status = Self::status_byte(Function::EnableProg, &rx)?;
            if status != ENTER_PROG_MODE_OK {
                return Err(UsbaspError::EnterProgMode(status));
            }
        }

        Ok(())
    }

    /// Paged flash write with block-position flags
    fn write_flash_blocks(
        &mut self,
        start: u32,
        page_size: usize,
        data: &[u8],
        progress: &mut dyn Progress,
    ) -> Result<()> {
        if page_size > MAX_PAGE_SIZE {
            return Err(UsbaspError::InvalidParameter(format!(
                "page size {} exceeds {}",
                page_size, MAX_PAGE_SIZE
            )));
        }

        progress.writing(data.len());

        let mut block_flags = BLOCKFLAG_FIRST;
        let mut bytes_written = 0usize;

        for block in data.chunks(RW_BLOCK_SIZE) {
            if bytes_written + block.len() == data.len() {
                block_flags |= BLOCKFLAG_LAST;
            }

            let address = u32::try_from(bytes_written)
                .ok()
                .and_then(|offset| start.checked_add(offset))
                .ok_or_else(|| {
                    UsbaspError::InvalidParameter(format!(
                        "flash write at 0x{:X} runs past the 32-bit address space",
                        start
                    ))
                })?;

            self.select_address(address)?;
            let param = write_flash_param(page_size, block_flags);
            self.transport.control_out(
                Function::WriteFlash as u8,
                address as u16,
                param,
                block,
            )?;

            block_flags = 0;
            bytes_written += block.len();
            progress.write_progress(bytes_written);
        }

        Ok(())
    }

    fn teardown(&mut self) {
        if self.transport.is_open() {
            if let Err(e) = self.request(Function::Disconnect, 0, 0) {
                log::warn!("USBasp disconnect failed: {}", e);
            }
            self.transport.close();
        }
        self.connected = false;
    }
}

impl<T: UsbControl> PageAccess for Usbasp<T> {
    fn load_address(&mut self, address: u32) -> CoreResult<()> {
        Ok(self.select_address(address)?)
    }

    fn read_page(&mut self, source: MemSource, buf: &mut [u8]) -> CoreResult<()> {
        let function = match source {
            MemSource::Flash => Function::ReadFlash,
            MemSource::Eeprom => Function::ReadEeprom,
        };
        let data = self.transport.control_in(
            function as u8,
            self.address as u16,
            0,
            buf.len() as u16,
        )?;
        if data.len() < buf.len() {
            return Err(UsbaspError::ShortResponse {
                function: function as u8,
                expected: buf.len(),
                received: data.len(),
            }
            .into());
        }
        buf.copy_from_slice(&data[..buf.len()]);
        Ok(())
    }

    fn write_page(&mut self, source: MemSource, data: &[u8]) -> CoreResult<()> {
        let function = match source {
            MemSource::Flash => Function::WriteFlash,
            MemSource::Eeprom => Function::WriteEeprom,
        };
        self.transport
            .control_out(function as u8, self.address as u16, 0, data)?;
        Ok(())
    }
}

impl<T: UsbControl> Programmer for Usbasp<T> {
    fn name(&self) -> &'static str {
        "usbasp"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::READ_SIGNATURE
            | Capabilities::CHIP_ERASE
            | Capabilities::FUSES
            | Capabilities::LOCK
            | Capabilities::CALIBRATION
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn open(&mut self, enter_prog_mode: bool) -> CoreResult<()> {
        if self.transport.is_open() {
            self.teardown();
        }

        if let Err(e) = self.connect(enter_prog_mode) {
            self.teardown();
            return Err(e.into());
        }

        self.connected = true;
        log::info!(
            "USBasp connected{}",
            if enter_prog_mode {
                " in programming mode"
            } else {
                ""
            }
        );
        Ok(())
    }

    fn close(&mut self) {
        self.teardown();
    }

    fn read_signature(&mut self) -> CoreResult<Signature> {
        let mut bytes = [0u8; 3];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = self.transmit(isp::READ_SIGNATURE, i as u16)?;
        }
        Ok(Signature::from_bytes(bytes))
    }

    fn chip_erase(&mut self) -> CoreResult<()> {
        self.transmit(isp::CHIP_ERASE, 0)?;
        std::thread::sleep(self.config.erase_delay);
        Ok(())
    }

    fn write_memory(
        &mut self,
        source: MemSource,
        start: u32,
        page_size: usize,
        data: &[u8],
        progress: &mut dyn Progress,
    ) -> CoreResult<()> {
        match source {
            MemSource::Eeprom => memory::write_chunked(self, source, start, page_size, data, progress),
            MemSource::Flash => Ok(self.write_flash_blocks(start, page_size, data, progress)?),
        }
    }

    fn read_fuse(&mut self, fuse: Fuse) -> CoreResult<u8> {
        let instruction = match fuse {
            Fuse::Low => isp::READ_LOW_FUSE,
            Fuse::High => isp::READ_HIGH_FUSE,
            Fuse::Extended => isp::READ_EXTEND_FUSE,
            Fuse::Lock => isp::READ_LOCK_BITS,
        };
        Ok(self.transmit(instruction, 0)?)
    }

    fn write_fuse(&mut self, fuse: Fuse, value: u8) -> CoreResult<()> {
        let instruction = match fuse {
            Fuse::Low => isp::WRITE_LOW_FUSE,
            Fuse::High => isp::WRITE_HIGH_FUSE,
            Fuse::Extended => isp::WRITE_EXTEND_FUSE,
            Fuse::Lock => isp::WRITE_LOCK_BITS,
        };
        self.transmit(instruction, (value as u16) << 8)?;
        Ok(())
    }

    fn read_calibration_byte(&mut self) -> CoreResult<u8> {
        Ok(self.transmit(isp::READ_CALIB_BYTE, 0)?)
    }
}

impl<T: UsbControl> Drop for Usbasp<T> {
    fn drop(&mut self) {
        self.teardown();
    }
}
