//! List commands implementation

use avrburner_core::chip::ChipCatalog;

use crate::programmers;

/// List all supported programmers
pub fn list_programmers() {
    println!("Supported programmers:");
    println!();
    for p in programmers::available_programmers() {
        println!("  {:10} - {}", p.name, p.description);
        if !p.aliases.is_empty() {
            println!("  {:10}   aliases: {}", "", p.aliases.join(", "));
        }
    }
}

/// List all chips in the catalog
pub fn list_chips(catalog: &ChipCatalog) {
    println!("Known chips:");
    println!();
    println!(
        "{:<12} {:>10} {:>10} {:>8} {:>10}",
        "Name", "Flash", "EEPROM", "Page", "Signature"
    );
    println!("{}", "-".repeat(54));

    for chip in catalog.chips() {
        println!(
            "{:<12} {:>10} {:>10} {:>8} {:>10}",
            chip.name,
            format_size(chip.flash_size),
            format_size(chip.eeprom_size),
            chip.page_size,
            chip.signature.to_string()
        );
    }
}

/// List attached USBasp programmers
#[cfg(feature = "usbasp")]
pub fn list_devices() -> Result<(), Box<dyn std::error::Error>> {
    use avrburner_usbasp::protocol::{USBASP_PRODUCT_ID, USBASP_VENDOR_ID};

    let devices = avrburner_usbasp::list_devices(USBASP_VENDOR_ID, USBASP_PRODUCT_ID)?;
    if devices.is_empty() {
        println!(
            "No USBasp found ({:04X}:{:04X})",
            USBASP_VENDOR_ID, USBASP_PRODUCT_ID
        );
        return Ok(());
    }

    println!("Connected USBasp programmers:");
    println!();
    for device in &devices {
        println!("  {}", describe_device(device));
    }
    Ok(())
}

#[cfg(not(feature = "usbasp"))]
pub fn list_devices() -> Result<(), Box<dyn std::error::Error>> {
    Err("this build has no USBasp support (enable the 'usbasp' feature)".into())
}

#[cfg(feature = "usbasp")]
fn describe_device(device: &avrburner_usbasp::UsbaspDeviceInfo) -> String {
    let mut line = format!("bus {} address {:03}", device.bus_id, device.address);
    if let Some(product) = &device.product {
        line.push_str(&format!(": {}", product));
    }
    if let Some(serial) = &device.serial {
        line.push_str(&format!(" (serial {})", serial));
    }
    line
}

fn format_size(bytes: usize) -> String {
    if bytes >= 1024 && bytes % 1024 == 0 {
        format!("{} KiB", bytes / 1024)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(32 * 1024), "32 KiB");
        assert_eq!(format_size(512), "512 B");
    }

    #[cfg(feature = "usbasp")]
    #[test]
    fn test_describe_device() {
        let mut device = avrburner_usbasp::UsbaspDeviceInfo {
            bus_id: "1".into(),
            address: 7,
            product: Some("USBasp".into()),
            serial: None,
        };
        assert_eq!(describe_device(&device), "bus 1 address 007: USBasp");

        device.product = None;
        device.serial = Some("0001".into());
        assert_eq!(describe_device(&device), "bus 1 address 007 (serial 0001)");
    }
}
