//! Read, write and verify commands

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use avrburner_core::chip::ChipProfile;
use avrburner_core::memory::{self, MemSource, MemoryBlock, MemoryImage};
use avrburner_core::programmer::Programmer;

use super::progress::IndicatifProgress;
use crate::cli::ImageArg;

/// Read file contents into a Vec
fn read_file(path: &Path) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let mut file = File::open(path)?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    println!("Read {} bytes from {:?}", data.len(), path);
    Ok(data)
}

/// Size of `source` on `chip`
fn memory_size(chip: &ChipProfile, source: MemSource) -> usize {
    match source {
        MemSource::Flash => chip.flash_size,
        MemSource::Eeprom => chip.eeprom_size,
    }
}

/// Bytes to read: `--size`, else what remains of the chip's memory
pub fn read_size(
    size: Option<u32>,
    chip: Option<&ChipProfile>,
    source: MemSource,
    start: u32,
) -> Result<usize, Box<dyn std::error::Error>> {
    match (size, chip) {
        (Some(size), _) => Ok(size as usize),
        (None, Some(chip)) => Ok(memory_size(chip, source).saturating_sub(start as usize)),
        (None, None) => Err("no read size: pass --size or select a chip with --chip".into()),
    }
}

/// Page size for writes: `--page-size`, else the chip's page size
pub fn write_page_size(
    page_size: Option<u32>,
    chip: Option<&ChipProfile>,
) -> Result<usize, Box<dyn std::error::Error>> {
    let size = match (page_size, chip) {
        (Some(size), _) => size as usize,
        (None, Some(chip)) => chip.page_size,
        (None, None) => {
            return Err("no page size: pass --page-size or select a chip with --chip".into())
        }
    };
    if size == 0 {
        return Err("page size must be non-zero".into());
    }
    Ok(size)
}

/// Refuse images that run past the end of the chip's memory
fn check_fits(
    chip: Option<&ChipProfile>,
    source: MemSource,
    start: u32,
    len: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(chip) = chip {
        let size = memory_size(chip, source);
        if start as usize + len > size {
            return Err(format!(
                "{} bytes at 0x{:X} exceed {} {} size ({} bytes)",
                len,
                start,
                chip.name,
                source.name(),
                size
            )
            .into());
        }
    }
    Ok(())
}

/// Run the read command
pub fn run_read(
    programmer: &mut dyn Programmer,
    chip: Option<&ChipProfile>,
    output: &Path,
    source: MemSource,
    start: u32,
    size: Option<u32>,
    stop_on_erased: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let size = read_size(size, chip, source, start)?;
    println!("Reading {} bytes of {} from 0x{:X}...", size, source.name(), start);

    let mut progress = IndicatifProgress::new();
    let data = programmer.read_memory(source, start, size, stop_on_erased, &mut progress)?;
    progress.finish();

    if data.len() < size {
        println!(
            "Stopped at erased memory after {} bytes (0x{:X})",
            data.len(),
            start as usize + data.len()
        );
    }

    let mut file = File::create(output)?;
    file.write_all(&data)?;
    println!("Wrote {} bytes to {:?}", data.len(), output);

    Ok(())
}

/// Load every input into one image; inputs without an address go at `start`
pub fn load_image(inputs: &[ImageArg], start: u32) -> Result<MemoryImage, Box<dyn std::error::Error>> {
    let mut image = MemoryImage::new();
    for input in inputs {
        let data = read_file(&input.path)?;
        if data.is_empty() {
            return Err(format!("{:?} is empty", input.path).into());
        }
        image.add_block(MemoryBlock::new(input.address.unwrap_or(start), data)?)?;
    }
    Ok(image)
}

/// Run the write command
pub fn run_write(
    programmer: &mut dyn Programmer,
    chip: Option<&ChipProfile>,
    image: &MemoryImage,
    source: MemSource,
    page_size: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let page_size = write_page_size(page_size, chip)?;
    for block in image.blocks() {
        check_fits(chip, source, block.start, block.data.len())?;
    }

    let mut progress = IndicatifProgress::new();
    for block in image.blocks() {
        println!(
            "Writing {} bytes of {} at 0x{:X} in {} pages of {} bytes...",
            block.data.len(),
            source.name(),
            block.start,
            memory::chunk_count(block.data.len(), page_size),
            page_size
        );
        programmer.write_memory(source, block.start, page_size, &block.data, &mut progress)?;
        progress.finish();
    }

    println!("Write complete ({} bytes)", image.data_len());
    Ok(())
}

/// Run the verify command; bytes between blocks must read erased
pub fn run_verify(
    programmer: &mut dyn Programmer,
    chip: Option<&ChipProfile>,
    image: &MemoryImage,
    source: MemSource,
) -> Result<(), Box<dyn std::error::Error>> {
    let Some(start) = image.start() else {
        return Err("nothing to verify".into());
    };
    let expected = image.flatten();
    check_fits(chip, source, start, expected.len())?;
    println!(
        "Verifying {} bytes of {} from 0x{:X}...",
        expected.len(),
        source.name(),
        start
    );

    let mut progress = IndicatifProgress::new();
    let actual = programmer.read_memory(source, start, expected.len(), false, &mut progress)?;
    progress.finish();

    match memory::verify(&expected, &actual) {
        None => {
            println!("Verification passed!");
            Ok(())
        }
        Some(mismatch) => {
            let found = match mismatch.found {
                Some(byte) => format!("0x{:02X}", byte),
                None => "nothing".to_string(),
            };
            Err(format!(
                "Verification failed at 0x{:X}: expected 0x{:02X}, read {} ({} bytes differ)",
                start as usize + mismatch.offset,
                mismatch.expected,
                found,
                mismatch.count
            )
            .into())
        }
    }
}
