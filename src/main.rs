//! avrburner - An AVR in-circuit programmer
//!
//! Reads, writes and verifies flash and EEPROM, and reads and writes fuses
//! and lock bits, through a USBasp or an STK500-compatible serial bootloader.
//!
//! # Architecture
//!
//! Every programmer implements the `Programmer` trait from `avrburner-core`,
//! which provides chunked memory transfers on top of three page primitives.
//! The commands here are written against that trait only, so they work the
//! same way with any programmer compiled in.

mod cli;
mod commands;
mod programmers;

use std::path::Path;

use avrburner_core::chip::ChipCatalog;
use clap::Parser;
use cli::{Cli, Commands};
use commands::{device, memory, session};

/// Chip catalog compiled into the binary
pub(crate) const BUILTIN_CHIPS: &str = include_str!("../chips/avr.ron");

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let catalog = match load_chip_catalog(cli.chips.as_deref()) {
        Ok(catalog) => catalog,
        Err(e) => {
            eprintln!("Failed to load chip catalog: {}", e);
            std::process::exit(1);
        }
    };
    log::debug!("Loaded {} chip definitions", catalog.len());

    let result = run(cli.command, &catalog);

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

fn run(command: Commands, catalog: &ChipCatalog) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::ListProgrammers => {
            commands::list_programmers();
            Ok(())
        }
        Commands::ListChips => {
            commands::list_chips(catalog);
            Ok(())
        }
        Commands::ListDevices => commands::list_devices(),
        Commands::Detect { target } => {
            let mut session = session::open(&target, catalog)?;
            device::run_detect(&mut *session, catalog)
        }
        Commands::Read {
            target,
            output,
            memory: source,
            start,
            size,
            stop_on_erased,
        } => {
            let mut session = session::open(&target, catalog)?;
            let chip = session.chip().cloned();
            memory::run_read(
                &mut *session,
                chip.as_ref(),
                &output,
                source.into(),
                start,
                size,
                stop_on_erased,
            )
        }
        Commands::Write {
            target,
            inputs,
            memory: source,
            start,
            page_size,
        } => {
            let image = memory::load_image(&inputs, start)?;
            let mut session = session::open(&target, catalog)?;
            let chip = session.chip().cloned();
            memory::run_write(&mut *session, chip.as_ref(), &image, source.into(), page_size)
        }
        Commands::Verify {
            target,
            inputs,
            memory: source,
            start,
        } => {
            let image = memory::load_image(&inputs, start)?;
            let mut session = session::open(&target, catalog)?;
            let chip = session.chip().cloned();
            memory::run_verify(&mut *session, chip.as_ref(), &image, source.into())
        }
        Commands::Erase { target } => {
            let mut session = session::open(&target, catalog)?;
            device::run_erase(&mut *session)
        }
        Commands::Fuses { target } => {
            let mut session = session::open(&target, catalog)?;
            let chip = session.chip().cloned();
            device::run_fuses(&mut *session, chip.as_ref())
        }
        Commands::WriteFuse {
            target,
            fuse,
            value,
        } => {
            let mut session = session::open(&target, catalog)?;
            let chip = session.chip().cloned();
            device::run_write_fuse(&mut *session, chip.as_ref(), fuse.into(), value)
        }
        Commands::Lock { target, set } => {
            let mut session = session::open(&target, catalog)?;
            let chip = session.chip().cloned();
            device::run_lock(&mut *session, chip.as_ref(), set)
        }
        Commands::Info { target } => {
            let mut session = session::open(&target, catalog)?;
            let chip = session.chip().cloned();
            device::run_info(&mut *session, chip.as_ref(), catalog)
        }
        #[cfg(feature = "stk500")]
        Commands::Sync { programmer } => {
            device::run_sync(programmers::create_stk500(&programmer, "sync")?)
        }
        #[cfg(feature = "stk500")]
        Commands::StartApp { programmer } => {
            device::run_start_app(programmers::create_stk500(&programmer, "start-app")?)
        }
        #[cfg(not(feature = "stk500"))]
        Commands::Sync { .. } | Commands::StartApp { .. } => {
            Err("this build has no STK500 support (enable the 'stk500' feature)".into())
        }
    }
}

/// Load the chip catalog from a file, or the built-in one
fn load_chip_catalog(path: Option<&Path>) -> Result<ChipCatalog, Box<dyn std::error::Error>> {
    let mut catalog = ChipCatalog::new();
    match path {
        Some(path) => {
            catalog.load_file(path)?;
        }
        None => {
            catalog.load_str(BUILTIN_CHIPS)?;
        }
    }
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_loads() {
        let catalog = load_chip_catalog(None).unwrap();
        assert!(catalog.len() >= 10);
        let mega = catalog.find_by_name("atmega2560").unwrap();
        assert_eq!(mega.flash_size, 256 * 1024);
        assert_eq!(mega.page_size, 256);
        assert!(!catalog.find_by_name("ATmega8").unwrap().has_ext_fuse);
    }
}
