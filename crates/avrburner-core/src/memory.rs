//! Memory addressing and chunked transfers
//!
//! All programmers move memory in chunks: reads use fixed blocks of at most
//! [`BLOCK_SIZE`] bytes, writes use the target's page size. Each chunk is a
//! `load_address` followed by a `read_page`/`write_page` on the
//! [`PageAccess`] primitives.

use crate::error::{Error, Result};
use crate::programmer::{PageAccess, Progress};

/// Fixed transfer block size used for reads
pub const BLOCK_SIZE: usize = 200;

/// The erased value for flash and EEPROM (all bits set)
pub const ERASED_VALUE: u8 = 0xFF;

/// Memory region of the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemSource {
    /// Program flash
    Flash,
    /// Data EEPROM
    Eeprom,
}

impl MemSource {
    /// Memory-type tag used by the STK500 page commands
    pub fn tag(self) -> u8 {
        match self {
            MemSource::Flash => b'F',
            MemSource::Eeprom => b'E',
        }
    }

    /// Human-readable name
    pub fn name(self) -> &'static str {
        match self {
            MemSource::Flash => "flash",
            MemSource::Eeprom => "EEPROM",
        }
    }
}

impl core::fmt::Display for MemSource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Convert a byte address to the 16-bit word address used by the AVR
/// instruction set
#[inline]
pub const fn word_address(byte_address: u32) -> u32 {
    byte_address >> 1
}

/// Whether a block reads as erased
#[inline]
pub fn is_erased(data: &[u8]) -> bool {
    data.iter().all(|&b| b == ERASED_VALUE)
}

/// Number of chunks a transfer of `len` bytes splits into
#[inline]
pub fn chunk_count(len: usize, chunk_size: usize) -> usize {
    if chunk_size == 0 {
        0
    } else {
        len.div_ceil(chunk_size)
    }
}

/// Byte address `offset` bytes past `start`
fn offset_address(start: u32, offset: usize) -> Result<u32> {
    u32::try_from(offset)
        .ok()
        .and_then(|offset| start.checked_add(offset))
        .ok_or_else(|| {
            Error::InvalidParameter(format!(
                "address 0x{:X} + 0x{:X} is beyond the 32-bit address space",
                start, offset
            ))
        })
}

/// Read up to `max_size` bytes in [`BLOCK_SIZE`] chunks
pub fn read_chunked<P: PageAccess + ?Sized>(
    dev: &mut P,
    source: MemSource,
    start: u32,
    max_size: usize,
    break_on_erased: bool,
    progress: &mut dyn Progress,
) -> Result<Vec<u8>> {
    let mut data = Vec::with_capacity(max_size);
    read_chunked_into(dev, source, start, max_size, break_on_erased, &mut data, progress)?;
    Ok(data)
}

/// Read up to `max_size` bytes in [`BLOCK_SIZE`] chunks, appending to `out`
///
/// Only whole chunks are appended, so after an error `out` ends at the last
/// completed chunk. With `break_on_erased` the read stops at the first chunk
/// that is entirely [`ERASED_VALUE`]; that chunk is not appended.
pub fn read_chunked_into<P: PageAccess + ?Sized>(
    dev: &mut P,
    source: MemSource,
    start: u32,
    max_size: usize,
    break_on_erased: bool,
    out: &mut Vec<u8>,
    progress: &mut dyn Progress,
) -> Result<()> {
    progress.reading(max_size);

    let mut block = [0u8; BLOCK_SIZE];
    let mut bytes_read = 0usize;

    while bytes_read < max_size {
        let chunk_size = core::cmp::min(BLOCK_SIZE, max_size - bytes_read);
        let chunk = &mut block[..chunk_size];
        let address = offset_address(start, bytes_read)?;

        dev.load_address(address)?;
        dev.read_page(source, chunk)?;

        if break_on_erased && is_erased(chunk) {
            log::debug!(
                "Erased {} block at 0x{:05X}, stopping after {} bytes",
                source,
                address,
                bytes_read
            );
            break;
        }

        out.extend_from_slice(chunk);
        bytes_read += chunk_size;
        progress.read_progress(bytes_read);
    }

    Ok(())
}

/// Write `data` in `page_size` chunks
///
/// No read-back verification is done here; see [`verify`].
pub fn write_chunked<P: PageAccess + ?Sized>(
    dev: &mut P,
    source: MemSource,
    start: u32,
    page_size: usize,
    data: &[u8],
    progress: &mut dyn Progress,
) -> Result<()> {
    if page_size == 0 {
        return Err(Error::InvalidParameter("page size must be non-zero".into()));
    }

    progress.writing(data.len());

    let mut bytes_written = 0usize;

    for chunk in data.chunks(page_size) {
        let address = offset_address(start, bytes_written)?;
        dev.load_address(address)?;
        dev.write_page(source, chunk)?;

        bytes_written += chunk.len();
        progress.write_progress(bytes_written);
    }

    Ok(())
}

/// First difference found by [`verify`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mismatch {
    /// Offset of the first differing byte
    pub offset: usize,
    /// Expected byte at that offset
    pub expected: u8,
    /// Byte read back, `None` if the read-back data ended early
    pub found: Option<u8>,
    /// Total number of differing (or missing) bytes
    pub count: usize,
}

/// Compare read-back data with the expected image
pub fn verify(expected: &[u8], actual: &[u8]) -> Option<Mismatch> {
    let mut first: Option<(usize, u8, Option<u8>)> = None;
    let mut count = 0usize;

    for (i, &want) in expected.iter().enumerate() {
        let got = actual.get(i).copied();
        if got != Some(want) {
            if first.is_none() {
                first = Some((i, want, got));
            }
            count += 1;
        }
    }

    first.map(|(offset, expected, found)| Mismatch {
        offset,
        expected,
        found,
        count,
    })
}

/// One contiguous block of a memory image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryBlock {
    /// Byte address of the first byte
    pub start: u32,
    /// Block contents
    pub data: Vec<u8>,
}

impl MemoryBlock {
    /// Create a block
    ///
    /// The block must fit in the 32-bit address space; it may end exactly
    /// at 2^32.
    pub fn new(start: u32, data: Vec<u8>) -> Result<Self> {
        let block = Self { start, data };
        if block.end() > ADDRESS_SPACE {
            return Err(Error::InvalidParameter(format!(
                "{} bytes at 0x{:X} run past the 32-bit address space",
                block.data.len(),
                start
            )));
        }
        Ok(block)
    }

    /// One past the last address covered by the block
    pub fn end(&self) -> u64 {
        u64::from(self.start) + self.data.len() as u64
    }
}

/// Size of the byte address space
const ADDRESS_SPACE: u64 = 1 << 32;

/// A sparse memory image: ordered blocks of data at given addresses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryImage {
    blocks: Vec<MemoryBlock>,
}

impl MemoryImage {
    /// Create an empty image
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a block, keeping the blocks ordered by start address
    ///
    /// Overlapping blocks are rejected.
    pub fn add_block(&mut self, block: MemoryBlock) -> Result<()> {
        let start = u64::from(block.start);
        let overlaps = self
            .blocks
            .iter()
            .any(|b| start < b.end() && u64::from(b.start) < block.end());
        if overlaps {
            return Err(Error::InvalidParameter(format!(
                "block at 0x{:05X} overlaps an existing block",
                block.start
            )));
        }
        let pos = self.blocks.partition_point(|b| b.start < block.start);
        self.blocks.insert(pos, block);
        Ok(())
    }

    /// Blocks in address order
    pub fn blocks(&self) -> &[MemoryBlock] {
        &self.blocks
    }

    /// Address of the first block
    pub fn start(&self) -> Option<u32> {
        self.blocks.first().map(|b| b.start)
    }

    /// Total number of data bytes over all blocks
    pub fn data_len(&self) -> usize {
        self.blocks.iter().map(|b| b.data.len()).sum()
    }

    /// Flatten into one buffer covering the first to the last block
    ///
    /// The buffer starts at [`start`](Self::start). Gaps between blocks are
    /// filled with [`ERASED_VALUE`], the contents of an erased part.
    pub fn flatten(&self) -> Vec<u8> {
        let Some(base) = self.start() else {
            return Vec::new();
        };
        let end = self.blocks.iter().map(|b| b.end()).max().unwrap_or(0);
        let mut buf = vec![ERASED_VALUE; (end - u64::from(base)) as usize];
        for block in &self.blocks {
            let offset = (block.start - base) as usize;
            buf[offset..offset + block.data.len()].copy_from_slice(&block.data);
        }
        buf
    }
}
