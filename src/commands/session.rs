//! Opening a programmer and checking the target
//!
//! Every device command runs inside one [`Session`]: the programmer is
//! opened in programming mode, the signature is checked against `--chip`
//! when one was given, and the programmer is closed when the session drops.

use std::ops::{Deref, DerefMut};

use avrburner_core::chip::{ChipCatalog, ChipProfile, Signature};
use avrburner_core::programmer::{Capabilities, Programmer};

use crate::cli::TargetArgs;
use crate::programmers;

/// An open programmer plus the selected chip profile
pub struct Session {
    programmer: Box<dyn Programmer>,
    chip: Option<ChipProfile>,
}

impl Session {
    /// Open `programmer` on an already built programmer
    pub fn start(
        mut programmer: Box<dyn Programmer>,
        chip: Option<ChipProfile>,
        force: bool,
        catalog: &ChipCatalog,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        log::info!("Opening {} programmer...", programmer.name());
        programmer.open(true)?;

        // From here on, dropping the session closes the programmer
        let mut session = Self { programmer, chip };
        session.check_signature(force, catalog)?;
        Ok(session)
    }

    /// The chip selected with `--chip`, if any
    pub fn chip(&self) -> Option<&ChipProfile> {
        self.chip.as_ref()
    }

    fn check_signature(
        &mut self,
        force: bool,
        catalog: &ChipCatalog,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let Some(chip) = &self.chip else {
            return Ok(());
        };
        if !self
            .programmer
            .capabilities()
            .contains(Capabilities::READ_SIGNATURE)
        {
            return Ok(());
        }

        let check = chip.check_signature(self.programmer.read_signature()?);
        if check.matched {
            log::info!("Signature {} matches {}", check.signature, chip.name);
            return Ok(());
        }

        let message = format!(
            "signature mismatch: expected {} ({}), read {}{}",
            check.expected,
            chip.name,
            check.signature,
            describe(catalog, check.signature)
        );
        if force {
            log::warn!("{}; continuing because of --force", message);
            Ok(())
        } else {
            Err(message.into())
        }
    }
}

/// " (ATtiny85)" when the catalog knows the signature
pub fn describe(catalog: &ChipCatalog, signature: Signature) -> String {
    match catalog.find_by_signature(signature) {
        Some(chip) => format!(" ({})", chip.name),
        None if signature.is_blank() => " (no chip connected?)".to_string(),
        None => String::new(),
    }
}

/// Resolve `--chip` against the catalog
pub fn resolve_chip(
    catalog: &ChipCatalog,
    name: Option<&str>,
) -> Result<Option<ChipProfile>, Box<dyn std::error::Error>> {
    match name {
        None => Ok(None),
        Some(name) => catalog
            .find_by_name(name)
            .cloned()
            .map(Some)
            .ok_or_else(|| format!("unknown chip: {} (see 'avrburner list-chips')", name).into()),
    }
}

/// Build the programmer named in `target`, open it and check the chip
pub fn open(
    target: &TargetArgs,
    catalog: &ChipCatalog,
) -> Result<Session, Box<dyn std::error::Error>> {
    let chip = resolve_chip(catalog, target.chip.as_deref())?;
    let programmer = programmers::create_programmer(&target.programmer)?;
    Session::start(programmer, chip, target.force, catalog)
}

impl Deref for Session {
    type Target = dyn Programmer;

    fn deref(&self) -> &Self::Target {
        self.programmer.as_ref()
    }
}

impl DerefMut for Session {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.programmer.as_mut()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.programmer.close();
        log::debug!("Closed {} programmer", self.programmer.name());
    }
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use avrburner_dummy::{DummyAvr, DummyConfig};

    fn catalog() -> ChipCatalog {
        let mut catalog = ChipCatalog::new();
        catalog.load_str(crate::BUILTIN_CHIPS).unwrap();
        catalog
    }

    #[test]
    fn test_matching_signature() {
        let catalog = catalog();
        let chip = resolve_chip(&catalog, Some("atmega328p")).unwrap();
        let session =
            Session::start(Box::new(DummyAvr::default()), chip, false, &catalog).unwrap();
        assert!(session.is_connected());
        assert_eq!(session.chip().unwrap().name, "ATmega328P");
    }

    #[test]
    fn test_mismatch_names_actual_chip() {
        let catalog = catalog();
        let chip = resolve_chip(&catalog, Some("ATmega328P")).unwrap();
        let tiny = DummyAvr::new(DummyConfig {
            signature: Signature::new(0x1E930B),
            ..DummyConfig::default()
        });
        let err = match Session::start(Box::new(tiny), chip.clone(), false, &catalog) {
            Err(e) => e.to_string(),
            Ok(_) => panic!("mismatch accepted"),
        };
        assert!(err.contains("ATtiny85"), "{}", err);

        let tiny = DummyAvr::new(DummyConfig {
            signature: Signature::new(0x1E930B),
            ..DummyConfig::default()
        });
        assert!(Session::start(Box::new(tiny), chip, true, &catalog).is_ok());
    }

    #[test]
    fn test_unknown_chip() {
        assert!(resolve_chip(&catalog(), Some("Z80")).is_err());
        assert!(resolve_chip(&catalog(), None).unwrap().is_none());
    }
}
