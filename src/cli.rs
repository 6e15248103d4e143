//! CLI argument parsing

use crate::programmers;
use avrburner_core::memory::MemSource;
use avrburner_core::programmer::Fuse;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
pub fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse a fuse value; bare digits are hex, as fuse values are always written
pub fn parse_hex_u8(s: &str) -> Result<u8, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u8::from_str_radix(digits, 16).map_err(|e| format!("Invalid byte value: {}", e))
}

/// An image file, optionally placed at `PATH@ADDRESS`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageArg {
    pub path: PathBuf,
    pub address: Option<u32>,
}

/// Parse `PATH` or `PATH@ADDRESS`
pub fn parse_image_arg(s: &str) -> Result<ImageArg, String> {
    match s.rsplit_once('@') {
        Some((path, address)) if !path.is_empty() => Ok(ImageArg {
            path: path.into(),
            address: Some(parse_hex_u32(address)?),
        }),
        _ => Ok(ImageArg {
            path: s.into(),
            address: None,
        }),
    }
}

/// Generate dynamic help text for the programmer argument
fn programmer_help() -> String {
    format!(
        "Programmer to use [available: {}]",
        programmers::programmer_names_short()
    )
}

#[derive(Parser)]
#[command(name = "avrburner")]
#[command(author, version, about = "AVR in-circuit programmer", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Chip catalog file (RON); the built-in catalog is used otherwise
    #[arg(long, global = true)]
    pub chips: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Memory selection
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MemoryArg {
    /// Program memory
    #[default]
    Flash,
    /// Data EEPROM
    Eeprom,
}

impl From<MemoryArg> for MemSource {
    fn from(arg: MemoryArg) -> Self {
        match arg {
            MemoryArg::Flash => MemSource::Flash,
            MemoryArg::Eeprom => MemSource::Eeprom,
        }
    }
}

/// Configuration byte selection
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FuseArg {
    /// Low fuse
    Low,
    /// High fuse
    High,
    /// Extended fuse
    #[value(alias = "extended")]
    Ext,
}

impl From<FuseArg> for Fuse {
    fn from(arg: FuseArg) -> Self {
        match arg {
            FuseArg::Low => Fuse::Low,
            FuseArg::High => Fuse::High,
            FuseArg::Ext => Fuse::Extended,
        }
    }
}

/// Programmer and target selection shared by every device command
#[derive(clap::Args, Debug, Clone)]
pub struct TargetArgs {
    /// Programmer to use
    #[arg(short, long, help = programmer_help())]
    pub programmer: String,

    /// Expected chip name (from the catalog); enables signature checks and sizes
    #[arg(short, long)]
    pub chip: Option<String>,

    /// Continue when the signature does not match --chip
    #[arg(long)]
    pub force: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List supported programmers
    ListProgrammers,

    /// List chips in the catalog
    ListChips,

    /// List connected USBasp programmers
    ListDevices,

    /// Read the device signature and identify the chip
    Detect {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Read memory contents to a file
    Read {
        #[command(flatten)]
        target: TargetArgs,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Memory to read
        #[arg(short, long, value_enum, default_value_t = MemoryArg::Flash)]
        memory: MemoryArg,

        /// Start address (hex, e.g., 0x100)
        #[arg(long, value_parser = parse_hex_u32, default_value = "0")]
        start: u32,

        /// Number of bytes to read (defaults to the chip's memory size)
        #[arg(long, value_parser = parse_hex_u32)]
        size: Option<u32>,

        /// Stop at the first 200-byte block that is entirely erased
        #[arg(long)]
        stop_on_erased: bool,
    },

    /// Write binary files to memory
    Write {
        #[command(flatten)]
        target: TargetArgs,

        /// Input file, as PATH or PATH@ADDRESS (repeatable)
        #[arg(short = 'i', long = "input", value_parser = parse_image_arg, required = true)]
        inputs: Vec<ImageArg>,

        /// Memory to write
        #[arg(short, long, value_enum, default_value_t = MemoryArg::Flash)]
        memory: MemoryArg,

        /// Start address for inputs without @ADDRESS (hex, e.g., 0x100)
        #[arg(long, value_parser = parse_hex_u32, default_value = "0")]
        start: u32,

        /// Page size (defaults to the chip's page size)
        #[arg(long, value_parser = parse_hex_u32)]
        page_size: Option<u32>,
    },

    /// Verify memory contents against binary files
    Verify {
        #[command(flatten)]
        target: TargetArgs,

        /// Input file, as PATH or PATH@ADDRESS (repeatable); gaps must read erased
        #[arg(short = 'i', long = "input", value_parser = parse_image_arg, required = true)]
        inputs: Vec<ImageArg>,

        /// Memory to verify
        #[arg(short, long, value_enum, default_value_t = MemoryArg::Flash)]
        memory: MemoryArg,

        /// Start address for inputs without @ADDRESS (hex, e.g., 0x100)
        #[arg(long, value_parser = parse_hex_u32, default_value = "0")]
        start: u32,
    },

    /// Erase the chip
    Erase {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Read fuses, lock bits and the calibration byte
    Fuses {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Write one fuse byte
    WriteFuse {
        #[command(flatten)]
        target: TargetArgs,

        /// Fuse to write
        #[arg(value_enum)]
        fuse: FuseArg,

        /// New value (hex, e.g., D9)
        #[arg(value_parser = parse_hex_u8)]
        value: u8,
    },

    /// Read the lock bits, or write them with --set
    Lock {
        #[command(flatten)]
        target: TargetArgs,

        /// New lock bits value (hex)
        #[arg(long, value_parser = parse_hex_u8)]
        set: Option<u8>,
    },

    /// Show programmer and chip information
    Info {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Check that an STK500 bootloader answers
    Sync {
        /// Programmer to use (stk500 only)
        #[arg(short, long)]
        programmer: String,
    },

    /// Leave an STK500 bootloader and start the application
    StartApp {
        /// Programmer to use (stk500 only)
        #[arg(short, long)]
        programmer: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_numbers() {
        assert_eq!(parse_hex_u32("0x100"), Ok(0x100));
        assert_eq!(parse_hex_u32("256"), Ok(256));
        assert!(parse_hex_u32("0xZZ").is_err());
        assert_eq!(parse_hex_u8("D9"), Ok(0xD9));
        assert_eq!(parse_hex_u8("0xff"), Ok(0xFF));
        assert!(parse_hex_u8("100").is_err());
    }

    #[test]
    fn test_parse_write_inputs() {
        let cli = Cli::parse_from([
            "avrburner",
            "write",
            "-p",
            "dummy",
            "-i",
            "app.bin",
            "-i",
            "boot.bin@0x7000",
        ]);
        match cli.command {
            Commands::Write { inputs, .. } => {
                assert_eq!(inputs.len(), 2);
                assert_eq!(inputs[0].address, None);
                assert_eq!(inputs[1].path, PathBuf::from("boot.bin"));
                assert_eq!(inputs[1].address, Some(0x7000));
            }
            _ => panic!("wrong subcommand"),
        }
        assert!(parse_image_arg("x.bin@zz").is_err());
    }

    #[test]
    fn test_parse_verify_and_list_devices() {
        let cli = Cli::parse_from(["avrburner", "verify", "-p", "usbasp", "-i", "app.bin@0x40"]);
        match cli.command {
            Commands::Verify { inputs, start, .. } => {
                assert_eq!(inputs[0].address, Some(0x40));
                assert_eq!(start, 0);
            }
            _ => panic!("wrong subcommand"),
        }

        let cli = Cli::parse_from(["avrburner", "list-devices"]);
        assert!(matches!(cli.command, Commands::ListDevices));
    }

    #[test]
    fn test_parse_write_fuse() {
        let cli = Cli::parse_from([
            "avrburner",
            "write-fuse",
            "-p",
            "dummy",
            "extended",
            "FD",
        ]);
        match cli.command {
            Commands::WriteFuse { fuse, value, .. } => {
                assert_eq!(Fuse::from(fuse), Fuse::Extended);
                assert_eq!(value, 0xFD);
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn test_parse_read_defaults() {
        let cli = Cli::parse_from(["avrburner", "-v", "read", "-p", "dummy", "-o", "out.bin"]);
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Read {
                memory,
                start,
                size,
                stop_on_erased,
                ..
            } => {
                assert_eq!(memory, MemoryArg::Flash);
                assert_eq!(start, 0);
                assert_eq!(size, None);
                assert!(!stop_on_erased);
            }
            _ => panic!("wrong subcommand"),
        }
    }
}
