//! Chip profiles and signature correlation
//!
//! A [`ChipProfile`] describes one AVR part: memory sizes, flash page size,
//! the 3-byte device signature and which configuration bytes it has. Profiles
//! are read-only to the programmers; they are loaded from RON files by
//! [`ChipCatalog`].

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 24-bit AVR device signature
///
/// The three signature bytes are stored most-significant first, so
/// `0x1E950F` is the ATmega328P (`1E 95 0F`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(u32);

impl Signature {
    /// Create a signature from a raw value, masking to 24 bits
    pub const fn new(value: u32) -> Self {
        Self(value & 0x00FF_FFFF)
    }

    /// Compose a signature from its three bytes, most significant first
    pub const fn from_bytes(bytes: [u8; 3]) -> Self {
        Self(((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | (bytes[2] as u32))
    }

    /// Raw 24-bit value
    pub const fn value(self) -> u32 {
        self.0
    }

    /// The three signature bytes, most significant first
    pub const fn bytes(self) -> [u8; 3] {
        [(self.0 >> 16) as u8, (self.0 >> 8) as u8, self.0 as u8]
    }

    /// Unprogrammed or absent chips read back as all-zero or all-one bytes
    pub fn is_blank(self) -> bool {
        self.0 == 0 || self.0 == 0x00FF_FFFF
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:06X}", self.0)
    }
}

impl From<u32> for Signature {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

/// Description of one AVR part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChipProfile {
    /// Part name (e.g. "ATmega328P")
    pub name: String,
    /// Flash size in bytes
    pub flash_size: usize,
    /// EEPROM size in bytes
    pub eeprom_size: usize,
    /// Flash page size in bytes
    pub page_size: usize,
    /// Device signature
    pub signature: Signature,
    /// Part has a low fuse byte
    #[serde(default)]
    pub has_low_fuse: bool,
    /// Part has a high fuse byte
    #[serde(default)]
    pub has_high_fuse: bool,
    /// Part has an extended fuse byte
    #[serde(default)]
    pub has_ext_fuse: bool,
    /// Part has lock bits
    #[serde(default)]
    pub has_lock_bits: bool,
    /// Part has an oscillator calibration byte
    #[serde(default)]
    pub has_calib_byte: bool,
    /// Package pin count
    #[serde(default)]
    pub pin_count: u16,
}

impl ChipProfile {
    /// Compare a signature read from the device against this profile
    pub fn check_signature(&self, read: Signature) -> SignatureCheck {
        SignatureCheck {
            expected: self.signature,
            signature: read,
            matched: read == self.signature,
        }
    }
}

/// Outcome of comparing a device signature with the selected profile
///
/// A mismatch is not an error at this layer; the caller decides whether to
/// look the signature up in a catalog and carry on, or abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureCheck {
    /// Signature of the selected profile
    pub expected: Signature,
    /// Signature read from the device
    pub signature: Signature,
    /// Whether the two are equal
    pub matched: bool,
}

/// Errors from loading or extending a [`ChipCatalog`]
#[derive(Debug, Error)]
pub enum ChipDbError {
    /// The catalog file could not be read
    #[error("cannot read chip catalog: {0}")]
    Io(#[from] io::Error),

    /// The catalog is not a valid RON list of profiles
    #[error("malformed chip catalog: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// A profile declares a zero flash page size
    #[error("{chip}: flash page size must be non-zero")]
    ZeroPageSize {
        /// Offending profile
        chip: String,
    },

    /// Two profiles share a name (compared case-insensitively)
    #[error("{chip}: chip name listed twice")]
    DuplicateName {
        /// Offending profile
        chip: String,
    },

    /// Two profiles share a device signature
    #[error("{chip}: signature {signature} already belongs to {owner}")]
    DuplicateSignature {
        /// Offending profile
        chip: String,
        /// Shared signature
        signature: Signature,
        /// Profile already holding the signature
        owner: String,
    },
}

/// A flat list of chip profiles
#[derive(Debug, Clone, Default)]
pub struct ChipCatalog {
    chips: Vec<ChipProfile>,
}

impl ChipCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a RON list of profiles and add them to the catalog
    ///
    /// Returns the number of profiles added.
    pub fn load_str(&mut self, source: &str) -> Result<usize, ChipDbError> {
        let chips: Vec<ChipProfile> = ron::from_str(source)?;
        let count = chips.len();
        for chip in chips {
            self.add(chip)?;
        }
        Ok(count)
    }

    /// Load a RON file containing a list of profiles
    pub fn load_file(&mut self, path: &Path) -> Result<usize, ChipDbError> {
        let source = fs::read_to_string(path)?;
        let count = self.load_str(&source)?;
        log::debug!("Loaded {} chips from {}", count, path.display());
        Ok(count)
    }

    /// Add a profile, rejecting duplicate names and signatures
    pub fn add(&mut self, chip: ChipProfile) -> Result<(), ChipDbError> {
        if chip.page_size == 0 {
            return Err(ChipDbError::ZeroPageSize { chip: chip.name });
        }
        if self.find_by_name(&chip.name).is_some() {
            return Err(ChipDbError::DuplicateName { chip: chip.name });
        }
        if let Some(owner) = self.find_by_signature(chip.signature) {
            return Err(ChipDbError::DuplicateSignature {
                signature: chip.signature,
                owner: owner.name.clone(),
                chip: chip.name,
            });
        }
        self.chips.push(chip);
        Ok(())
    }

    /// Look up a profile by name (case-insensitive)
    pub fn find_by_name(&self, name: &str) -> Option<&ChipProfile> {
        self.chips.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Look up the profile matching a device signature
    pub fn find_by_signature(&self, signature: Signature) -> Option<&ChipProfile> {
        self.chips.iter().find(|c| c.signature == signature)
    }

    /// All profiles, in load order
    pub fn chips(&self) -> &[ChipProfile] {
        &self.chips
    }

    /// Number of profiles
    pub fn len(&self) -> usize {
        self.chips.len()
    }

    /// Whether the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.chips.is_empty()
    }
}
