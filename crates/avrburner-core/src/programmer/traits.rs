//! Programmer trait definitions

use crate::chip::Signature;
use crate::error::{Error, Result};
use crate::memory::{self, MemSource};
use crate::programmer::Progress;
use bitflags::bitflags;

bitflags! {
    /// Programmer capability flags
    ///
    /// Callers should check these before issuing an optional operation
    /// rather than relying on the `NotSupported` error.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        /// Can read the 3-byte device signature
        const READ_SIGNATURE = 1 << 0;
        /// Can bulk-erase the device
        const CHIP_ERASE     = 1 << 1;
        /// Can read low/high/extended fuses
        const READ_FUSES     = 1 << 2;
        /// Can write low/high/extended fuses
        const WRITE_FUSES    = 1 << 3;
        /// Can read the lock bits
        const READ_LOCK      = 1 << 4;
        /// Can write the lock bits
        const WRITE_LOCK     = 1 << 5;
        /// Can read the oscillator calibration byte
        const CALIBRATION    = 1 << 6;
        /// Can report the programmer/bootloader name
        const DEVICE_NAME    = 1 << 7;
        /// Can report the target page size
        const PAGE_SIZE      = 1 << 8;

        /// Shorthand for full fuse access
        const FUSES = Self::READ_FUSES.bits() | Self::WRITE_FUSES.bits();
        /// Shorthand for full lock bit access
        const LOCK = Self::READ_LOCK.bits() | Self::WRITE_LOCK.bits();
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities::READ_SIGNATURE
    }
}

/// Single-byte configuration registers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fuse {
    /// Low fuse byte
    Low,
    /// High fuse byte
    High,
    /// Extended fuse byte
    Extended,
    /// Lock bits
    Lock,
}

impl Fuse {
    /// All fuse kinds, in the order they are usually displayed
    pub const ALL: [Fuse; 4] = [Fuse::Low, Fuse::High, Fuse::Extended, Fuse::Lock];

    /// Human-readable name
    pub fn name(self) -> &'static str {
        match self {
            Fuse::Low => "low fuse",
            Fuse::High => "high fuse",
            Fuse::Extended => "extended fuse",
            Fuse::Lock => "lock bits",
        }
    }

    /// Capability needed to read this byte
    pub fn read_capability(self) -> Capabilities {
        match self {
            Fuse::Lock => Capabilities::READ_LOCK,
            _ => Capabilities::READ_FUSES,
        }
    }

    /// Capability needed to write this byte
    pub fn write_capability(self) -> Capabilities {
        match self {
            Fuse::Lock => Capabilities::WRITE_LOCK,
            _ => Capabilities::WRITE_FUSES,
        }
    }

    fn read_op(self) -> &'static str {
        match self {
            Fuse::Low => "reading the low fuse",
            Fuse::High => "reading the high fuse",
            Fuse::Extended => "reading the extended fuse",
            Fuse::Lock => "reading the lock bits",
        }
    }

    fn write_op(self) -> &'static str {
        match self {
            Fuse::Low => "writing the low fuse",
            Fuse::High => "writing the high fuse",
            Fuse::Extended => "writing the extended fuse",
            Fuse::Lock => "writing the lock bits",
        }
    }
}

impl core::fmt::Display for Fuse {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-chunk memory primitives
///
/// These are the only memory operations a programmer has to provide; the
/// chunked transfers in [`memory`](crate::memory) are built on top of them.
/// Addresses are always byte addresses here. Protocols that address 16-bit
/// words convert internally.
pub trait PageAccess {
    /// Set the device's current address
    fn load_address(&mut self, address: u32) -> Result<()>;

    /// Read `buf.len()` bytes starting at the current address
    fn read_page(&mut self, source: MemSource, buf: &mut [u8]) -> Result<()>;

    /// Write `data` starting at the current address
    fn write_page(&mut self, source: MemSource, data: &[u8]) -> Result<()>;
}

/// AVR programmer
///
/// One implementation exists per hardware variant. An instance is
/// single-owner: callers serialize all operations on it, and it is opened,
/// used for a bounded sequence of operations and closed.
///
/// Optional operations default to [`Error::NotSupported`]; check
/// [`capabilities()`](Programmer::capabilities) before calling them.
pub trait Programmer: PageAccess {
    /// Short name of the programmer variant
    fn name(&self) -> &'static str;

    /// Operations this programmer implements
    fn capabilities(&self) -> Capabilities;

    /// Whether `open()` completed successfully and `close()` has not run
    fn is_connected(&self) -> bool;

    /// Establish the physical connection
    ///
    /// With `enter_prog_mode` the device is also put into programming mode.
    /// `is_connected()` only becomes true on full success.
    fn open(&mut self, enter_prog_mode: bool) -> Result<()>;

    /// Release the connection
    ///
    /// Idempotent and infallible: teardown errors are logged, never returned,
    /// so they cannot mask the error that caused the caller to close.
    fn close(&mut self);

    /// Read the 24-bit device signature
    fn read_signature(&mut self) -> Result<Signature>;

    /// Bulk-erase the device
    fn chip_erase(&mut self) -> Result<()> {
        Err(Error::NotSupported("chip erase"))
    }

    /// Read up to `max_size` bytes starting at `start`
    ///
    /// With `break_on_erased`, reading stops at the first chunk that is
    /// entirely `0xFF` and only the bytes before it are returned.
    fn read_memory(
        &mut self,
        source: MemSource,
        start: u32,
        max_size: usize,
        break_on_erased: bool,
        progress: &mut dyn Progress,
    ) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(max_size);
        self.read_memory_into(source, start, max_size, break_on_erased, &mut data, progress)?;
        Ok(data)
    }

    /// Like [`read_memory`](Programmer::read_memory), appending to `out`
    ///
    /// On failure `out` holds every chunk completed before the error.
    fn read_memory_into(
        &mut self,
        source: MemSource,
        start: u32,
        max_size: usize,
        break_on_erased: bool,
        out: &mut Vec<u8>,
        progress: &mut dyn Progress,
    ) -> Result<()> {
        memory::read_chunked_into(self, source, start, max_size, break_on_erased, out, progress)
    }

    /// Write `data` starting at `start`, one `page_size` chunk at a time
    fn write_memory(
        &mut self,
        source: MemSource,
        start: u32,
        page_size: usize,
        data: &[u8],
        progress: &mut dyn Progress,
    ) -> Result<()> {
        memory::write_chunked(self, source, start, page_size, data, progress)
    }

    /// Read a fuse byte or the lock bits
    fn read_fuse(&mut self, fuse: Fuse) -> Result<u8> {
        Err(Error::NotSupported(fuse.read_op()))
    }

    /// Write a fuse byte or the lock bits
    fn write_fuse(&mut self, fuse: Fuse, _value: u8) -> Result<()> {
        Err(Error::NotSupported(fuse.write_op()))
    }

    /// Read the oscillator calibration byte
    fn read_calibration_byte(&mut self) -> Result<u8> {
        Err(Error::NotSupported("reading the calibration byte"))
    }

    /// Name reported by the programmer or bootloader
    fn device_name(&mut self) -> Result<String> {
        Err(Error::NotSupported("device name query"))
    }

    /// Flash page size reported by the programmer or bootloader
    fn page_size(&mut self) -> Result<usize> {
        Err(Error::NotSupported("page size query"))
    }
}

impl<P: PageAccess + ?Sized> PageAccess for Box<P> {
    fn load_address(&mut self, address: u32) -> Result<()> {
        (**self).load_address(address)
    }

    fn read_page(&mut self, source: MemSource, buf: &mut [u8]) -> Result<()> {
        (**self).read_page(source, buf)
    }

    fn write_page(&mut self, source: MemSource, data: &[u8]) -> Result<()> {
        (**self).write_page(source, data)
    }
}

// Forward every method so that overrides in the boxed type are kept
impl<P: Programmer + ?Sized> Programmer for Box<P> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn capabilities(&self) -> Capabilities {
        (**self).capabilities()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn open(&mut self, enter_prog_mode: bool) -> Result<()> {
        (**self).open(enter_prog_mode)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn read_signature(&mut self) -> Result<Signature> {
        (**self).read_signature()
    }

    fn chip_erase(&mut self) -> Result<()> {
        (**self).chip_erase()
    }

    fn read_memory_into(
        &mut self,
        source: MemSource,
        start: u32,
        max_size: usize,
        break_on_erased: bool,
        out: &mut Vec<u8>,
        progress: &mut dyn Progress,
    ) -> Result<()> {
        (**self).read_memory_into(source, start, max_size, break_on_erased, out, progress)
    }

    fn write_memory(
        &mut self,
        source: MemSource,
        start: u32,
        page_size: usize,
        data: &[u8],
        progress: &mut dyn Progress,
    ) -> Result<()> {
        (**self).write_memory(source, start, page_size, data, progress)
    }

    fn read_fuse(&mut self, fuse: Fuse) -> Result<u8> {
        (**self).read_fuse(fuse)
    }

    fn write_fuse(&mut self, fuse: Fuse, value: u8) -> Result<()> {
        (**self).write_fuse(fuse, value)
    }

    fn read_calibration_byte(&mut self) -> Result<u8> {
        (**self).read_calibration_byte()
    }

    fn device_name(&mut self) -> Result<String> {
        (**self).device_name()
    }

    fn page_size(&mut self) -> Result<usize> {
        (**self).page_size()
    }
}

/// Information about a programmer
#[derive(Debug, Clone)]
pub struct ProgrammerInfo {
    /// Name of the programmer
    pub name: &'static str,
    /// Alternative names/aliases
    pub aliases: &'static [&'static str],
    /// Description
    pub description: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::programmer::NoProgress;

    /// Minimal programmer that only implements the required methods
    struct Bare {
        connected: bool,
    }

    impl PageAccess for Bare {
        fn load_address(&mut self, _address: u32) -> Result<()> {
            Ok(())
        }

        fn read_page(&mut self, _source: MemSource, buf: &mut [u8]) -> Result<()> {
            buf.fill(0xAA);
            Ok(())
        }

        fn write_page(&mut self, _source: MemSource, _data: &[u8]) -> Result<()> {
            Ok(())
        }
    }

    impl Programmer for Bare {
        fn name(&self) -> &'static str {
            "bare"
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::default()
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn open(&mut self, _enter_prog_mode: bool) -> Result<()> {
            self.connected = true;
            Ok(())
        }

        fn close(&mut self) {
            self.connected = false;
        }

        fn read_signature(&mut self) -> Result<Signature> {
            Ok(Signature::new(0x1E950F))
        }
    }

    #[test]
    fn test_optional_ops_not_supported() {
        let mut p = Bare { connected: false };
        assert_eq!(p.chip_erase(), Err(Error::NotSupported("chip erase")));
        assert!(matches!(p.read_fuse(Fuse::High), Err(Error::NotSupported(_))));
        assert!(matches!(p.write_fuse(Fuse::Lock, 0), Err(Error::NotSupported(_))));
        assert!(matches!(p.read_calibration_byte(), Err(Error::NotSupported(_))));
        assert!(matches!(p.device_name(), Err(Error::NotSupported(_))));
        assert!(matches!(p.page_size(), Err(Error::NotSupported(_))));
    }

    #[test]
    fn test_boxed_programmer_uses_default_chunking() {
        let mut p: Box<dyn Programmer> = Box::new(Bare { connected: false });
        p.open(true).unwrap();
        assert!(p.is_connected());
        let data = p
            .read_memory(MemSource::Flash, 0, 450, false, &mut NoProgress)
            .unwrap();
        assert_eq!(data.len(), 450);
        assert!(data.iter().all(|&b| b == 0xAA));
        p.close();
        p.close();
        assert!(!p.is_connected());
    }

    #[test]
    fn test_fuse_capabilities() {
        assert_eq!(Fuse::Lock.read_capability(), Capabilities::READ_LOCK);
        assert_eq!(Fuse::Extended.write_capability(), Capabilities::WRITE_FUSES);
        assert!(Capabilities::FUSES.contains(Capabilities::READ_FUSES));
    }
}
