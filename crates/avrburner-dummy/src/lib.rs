//! avrburner-dummy - In-memory AVR emulator for testing
//!
//! This crate provides a programmer that emulates an AVR part in memory:
//! flash, EEPROM, fuses, lock bits and the signature. It's useful for
//! testing and development without real hardware.

use avrburner_core::chip::Signature;
use avrburner_core::error::{Error, Result};
use avrburner_core::memory::{MemSource, ERASED_VALUE};
use avrburner_core::programmer::{Capabilities, Fuse, PageAccess, Programmer};

/// Configuration for the emulated part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DummyConfig {
    /// Device signature
    pub signature: Signature,
    /// Flash size in bytes
    pub flash_size: usize,
    /// EEPROM size in bytes
    pub eeprom_size: usize,
    /// Flash page size in bytes
    pub page_size: usize,
    /// Fuse values after reset: low, high, extended
    pub fuses: [u8; 3],
    /// Lock bits after reset
    pub lock: u8,
    /// Oscillator calibration byte
    pub calibration: u8,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            signature: Signature::new(0x1E950F), // ATmega328P
            flash_size: 32 * 1024,
            eeprom_size: 1024,
            page_size: 128,
            fuses: [0x62, 0xD9, 0xFF],
            lock: 0xFF,
            calibration: 0x9A,
        }
    }
}

fn parse_number(key: &str, value: &str) -> Result<u32> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|_| Error::InvalidParameter(format!("{}: {}", key, value)))
}

/// Parse options from key=value pairs
///
/// Recognised keys: `signature`, `flash`, `eeprom` and `page`.
pub fn parse_options(options: &[(&str, &str)]) -> Result<DummyConfig> {
    let mut config = DummyConfig::default();

    for (key, value) in options {
        match *key {
            "signature" => config.signature = Signature::new(parse_number(key, value)?),
            "flash" => config.flash_size = parse_number(key, value)? as usize,
            "eeprom" => config.eeprom_size = parse_number(key, value)? as usize,
            "page" => config.page_size = parse_number(key, value)? as usize,
            _ => {
                return Err(Error::InvalidParameter(format!(
                    "unknown option: {}",
                    key
                )))
            }
        }
    }

    Ok(config)
}

/// Emulated AVR programmer
pub struct DummyAvr {
    config: DummyConfig,
    flash: Vec<u8>,
    eeprom: Vec<u8>,
    fuses: [u8; 3],
    lock: u8,
    address: usize,
    connected: bool,
}

impl DummyAvr {
    /// Create an erased part with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        Self {
            flash: vec![ERASED_VALUE; config.flash_size],
            eeprom: vec![ERASED_VALUE; config.eeprom_size],
            fuses: config.fuses,
            lock: config.lock,
            address: 0,
            connected: false,
            config,
        }
    }

    /// Create a part whose flash starts with `initial_data`
    pub fn with_flash(config: DummyConfig, initial_data: &[u8]) -> Self {
        let mut avr = Self::new(config);
        let len = initial_data.len().min(avr.flash.len());
        avr.flash[..len].copy_from_slice(&initial_data[..len]);
        avr
    }

    /// Flash contents
    pub fn flash(&self) -> &[u8] {
        &self.flash
    }

    /// EEPROM contents
    pub fn eeprom(&self) -> &[u8] {
        &self.eeprom
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    fn memory(&mut self, source: MemSource, len: usize) -> Result<&mut [u8]> {
        self.ensure_connected()?;
        let address = self.address;
        let memory = match source {
            MemSource::Flash => &mut self.flash,
            MemSource::Eeprom => &mut self.eeprom,
        };
        let size = memory.len();
        memory.get_mut(address..address + len).ok_or_else(|| {
            Error::InvalidParameter(format!(
                "{} bytes at 0x{:X} exceed {} size 0x{:X}",
                len,
                address,
                source.name(),
                size
            ))
        })
    }
}

impl Default for DummyAvr {
    fn default() -> Self {
        Self::new(DummyConfig::default())
    }
}

impl PageAccess for DummyAvr {
    fn load_address(&mut self, address: u32) -> Result<()> {
        self.ensure_connected()?;
        self.address = address as usize;
        Ok(())
    }

    fn read_page(&mut self, source: MemSource, buf: &mut [u8]) -> Result<()> {
        let len = buf.len();
        buf.copy_from_slice(self.memory(source, len)?);
        Ok(())
    }

    fn write_page(&mut self, source: MemSource, data: &[u8]) -> Result<()> {
        let memory = self.memory(source, data.len())?;
        match source {
            // Programming flash can only clear bits
            MemSource::Flash => memory
                .iter_mut()
                .zip(data)
                .for_each(|(cell, &byte)| *cell &= byte),
            MemSource::Eeprom => memory.copy_from_slice(data),
        }
        Ok(())
    }
}

impl Programmer for DummyAvr {
    fn name(&self) -> &'static str {
        "dummy"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn open(&mut self, enter_prog_mode: bool) -> Result<()> {
        log::debug!(
            "Dummy AVR {} open (programming mode: {})",
            self.config.signature,
            enter_prog_mode
        );
        self.connected = true;
        self.address = 0;
        Ok(())
    }

    fn close(&mut self) {
        self.connected = false;
    }

    fn read_signature(&mut self) -> Result<Signature> {
        self.ensure_connected()?;
        Ok(self.config.signature)
    }

    fn chip_erase(&mut self) -> Result<()> {
        self.ensure_connected()?;
        self.flash.fill(ERASED_VALUE);
        self.eeprom.fill(ERASED_VALUE);
        self.lock = self.config.lock;
        Ok(())
    }

    fn read_fuse(&mut self, fuse: Fuse) -> Result<u8> {
        self.ensure_connected()?;
        Ok(match fuse {
            Fuse::Low => self.fuses[0],
            Fuse::High => self.fuses[1],
            Fuse::Extended => self.fuses[2],
            Fuse::Lock => self.lock,
        })
    }

    fn write_fuse(&mut self, fuse: Fuse, value: u8) -> Result<()> {
        self.ensure_connected()?;
        match fuse {
            Fuse::Low => self.fuses[0] = value,
            Fuse::High => self.fuses[1] = value,
            Fuse::Extended => self.fuses[2] = value,
            // Lock bits can only be cleared until the next chip erase
            Fuse::Lock => self.lock &= value,
        }
        Ok(())
    }

    fn read_calibration_byte(&mut self) -> Result<u8> {
        self.ensure_connected()?;
        Ok(self.config.calibration)
    }

    fn device_name(&mut self) -> Result<String> {
        Ok("avrburner dummy".to_string())
    }

    fn page_size(&mut self) -> Result<usize> {
        Ok(self.config.page_size)
    }
}
