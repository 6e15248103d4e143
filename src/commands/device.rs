//! Device-level commands: detect, info, erase, fuses and lock bits

use avrburner_core::chip::{ChipCatalog, ChipProfile};
use avrburner_core::error::Result as CoreResult;
use avrburner_core::programmer::{Capabilities, Fuse, Programmer};

use super::session::describe;

/// Whether the selected chip has `fuse` (any fuse is assumed without a chip)
fn chip_has(chip: Option<&ChipProfile>, fuse: Fuse) -> bool {
    let Some(chip) = chip else {
        return true;
    };
    match fuse {
        Fuse::Low => chip.has_low_fuse,
        Fuse::High => chip.has_high_fuse,
        Fuse::Extended => chip.has_ext_fuse,
        Fuse::Lock => chip.has_lock_bits,
    }
}

fn require(
    programmer: &dyn Programmer,
    capability: Capabilities,
    operation: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if programmer.capabilities().contains(capability) {
        Ok(())
    } else {
        Err(format!("the {} programmer does not support {}", programmer.name(), operation).into())
    }
}

/// Read the signature and name the chip
pub fn run_detect(
    programmer: &mut dyn Programmer,
    catalog: &ChipCatalog,
) -> Result<(), Box<dyn std::error::Error>> {
    require(programmer, Capabilities::READ_SIGNATURE, "signature reads")?;
    let signature = programmer.read_signature()?;
    println!("Signature: {}{}", signature, describe(catalog, signature));

    if let Some(chip) = catalog.find_by_signature(signature) {
        println!(
            "Flash: {} bytes, EEPROM: {} bytes, page: {} bytes",
            chip.flash_size, chip.eeprom_size, chip.page_size
        );
    }
    Ok(())
}

/// Show what the programmer reports about itself and the target
pub fn run_info(
    programmer: &mut dyn Programmer,
    chip: Option<&ChipProfile>,
    catalog: &ChipCatalog,
) -> Result<(), Box<dyn std::error::Error>> {
    let caps = programmer.capabilities();
    println!("Programmer: {}", programmer.name());
    let names: Vec<&str> = caps.iter_names().map(|(name, _)| name).collect();
    println!("Capabilities: {}", names.join(", "));

    if caps.contains(Capabilities::DEVICE_NAME) {
        println!("Device name: {}", programmer.device_name()?);
    }
    if caps.contains(Capabilities::PAGE_SIZE) {
        println!("Page size: {} bytes", programmer.page_size()?);
    }
    if caps.contains(Capabilities::READ_SIGNATURE) {
        let signature = programmer.read_signature()?;
        println!("Signature: {}{}", signature, describe(catalog, signature));
    }
    if let Some(chip) = chip {
        println!(
            "Chip: {} ({} pins), flash {} bytes, EEPROM {} bytes, page {} bytes",
            chip.name, chip.pin_count, chip.flash_size, chip.eeprom_size, chip.page_size
        );
    }
    Ok(())
}

/// Bulk-erase the chip
pub fn run_erase(programmer: &mut dyn Programmer) -> Result<(), Box<dyn std::error::Error>> {
    require(programmer, Capabilities::CHIP_ERASE, "chip erase")?;
    println!("Erasing chip...");
    programmer.chip_erase()?;
    println!("Erase complete");
    Ok(())
}

/// Print every fuse, the lock bits and the calibration byte
pub fn run_fuses(
    programmer: &mut dyn Programmer,
    chip: Option<&ChipProfile>,
) -> Result<(), Box<dyn std::error::Error>> {
    let caps = programmer.capabilities();
    if !caps.intersects(Capabilities::READ_FUSES | Capabilities::READ_LOCK) {
        return Err(format!("the {} programmer cannot read fuses", programmer.name()).into());
    }

    for fuse in Fuse::ALL {
        if !chip_has(chip, fuse) || !caps.contains(fuse.read_capability()) {
            continue;
        }
        let label = format!("{}:", fuse.name());
        print_byte(&label, programmer.read_fuse(fuse))?;
    }

    if caps.contains(Capabilities::CALIBRATION) && chip.map_or(true, |c| c.has_calib_byte) {
        print_byte("calibration:", programmer.read_calibration_byte())?;
    }
    Ok(())
}

/// Print one configuration byte; errors that leave the link usable are shown
/// in place of the value
fn print_byte(label: &str, value: CoreResult<u8>) -> Result<(), Box<dyn std::error::Error>> {
    match value {
        Ok(value) => println!("{:<14} 0x{:02X}", label, value),
        Err(e) if e.is_recoverable() => println!("{:<14} {}", label, e),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Write one fuse byte and read it back
pub fn run_write_fuse(
    programmer: &mut dyn Programmer,
    chip: Option<&ChipProfile>,
    fuse: Fuse,
    value: u8,
) -> Result<(), Box<dyn std::error::Error>> {
    if !chip_has(chip, fuse) {
        let name = chip.map(|c| c.name.as_str()).unwrap_or_default();
        return Err(format!("{} has no {}", name, fuse.name()).into());
    }
    require(programmer, fuse.write_capability(), fuse.name())?;

    println!("Writing 0x{:02X} to the {}...", value, fuse.name());
    programmer.write_fuse(fuse, value)?;

    if programmer.capabilities().contains(fuse.read_capability()) {
        let back = programmer.read_fuse(fuse)?;
        if back != value {
            return Err(format!(
                "{} reads back 0x{:02X} after writing 0x{:02X}",
                fuse.name(),
                back,
                value
            )
            .into());
        }
    }
    println!("Done");
    Ok(())
}

/// Read the lock bits, or write them when `set` is given
pub fn run_lock(
    programmer: &mut dyn Programmer,
    chip: Option<&ChipProfile>,
    set: Option<u8>,
) -> Result<(), Box<dyn std::error::Error>> {
    match set {
        Some(value) => run_write_fuse(programmer, chip, Fuse::Lock, value),
        None => {
            require(programmer, Capabilities::READ_LOCK, "reading lock bits")?;
            println!("Lock bits: 0x{:02X}", programmer.read_fuse(Fuse::Lock)?);
            Ok(())
        }
    }
}

/// Check that an STK500 bootloader answers GET_SYNC
#[cfg(feature = "stk500")]
pub fn run_sync(mut stk: avrburner_stk500::Stk500) -> Result<(), Box<dyn std::error::Error>> {
    stk.open(false)?;
    let result = stk.get_sync();
    stk.close();
    result?;
    println!("Bootloader is in sync");
    Ok(())
}

/// Leave an STK500 bootloader and start the application
#[cfg(feature = "stk500")]
pub fn run_start_app(mut stk: avrburner_stk500::Stk500) -> Result<(), Box<dyn std::error::Error>> {
    stk.open(false)?;
    let result = stk.get_sync().and_then(|()| stk.start_user_app());
    stk.close();
    result?;
    println!("Application started");
    Ok(())
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use avrburner_dummy::DummyAvr;

    #[test]
    fn test_write_fuse_reads_back() {
        let mut avr = DummyAvr::default();
        avr.open(true).unwrap();
        run_write_fuse(&mut avr, None, Fuse::High, 0xDE).unwrap();
        assert_eq!(avr.read_fuse(Fuse::High).unwrap(), 0xDE);

        // Lock bits only clear, so raising them fails the read-back
        run_lock(&mut avr, None, Some(0xFC)).unwrap();
        assert!(run_lock(&mut avr, None, Some(0xFF)).is_err());
    }

    #[test]
    fn test_missing_fuse_rejected() {
        let mut catalog = ChipCatalog::new();
        catalog.load_str(crate::BUILTIN_CHIPS).unwrap();
        let tiny13 = catalog.find_by_name("ATtiny13A").unwrap();

        let mut avr = DummyAvr::default();
        avr.open(true).unwrap();
        assert!(run_write_fuse(&mut avr, Some(tiny13), Fuse::Extended, 0xFF).is_err());
        run_fuses(&mut avr, Some(tiny13)).unwrap();
    }

    #[test]
    fn test_print_byte_keeps_going_on_unsupported() {
        use avrburner_core::Error;

        assert!(print_byte("low fuse:", Ok(0x62)).is_ok());
        assert!(print_byte("low fuse:", Err(Error::NotSupported("reading fuses"))).is_ok());
        assert!(print_byte("low fuse:", Err(Error::NoResponse)).is_err());
    }

    #[test]
    fn test_erase() {
        let mut avr = DummyAvr::with_flash(Default::default(), &[0u8; 16]);
        avr.open(true).unwrap();
        run_erase(&mut avr).unwrap();
        assert!(avr.flash().iter().all(|&b| b == 0xFF));
    }
}
