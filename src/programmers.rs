//! Programmer registration and dispatch
//!
//! This module provides a centralized registry for all programmers, with support
//! for feature-gated inclusion and dynamic help text generation.

use avrburner_core::programmer::{Programmer, ProgrammerInfo};
use thiserror::Error;

/// Errors from selecting or configuring a programmer
#[derive(Debug, Error)]
pub enum ProgrammerError {
    /// The name matches no compiled-in programmer
    #[error("unknown programmer: {name}\n\n{help}\nUse 'avrburner list-programmers' for more details")]
    Unknown {
        /// Name given on the command line
        name: String,
        /// Available programmers
        help: String,
    },

    /// Invalid `key=value` options
    #[error("invalid {name} parameters: {message}")]
    Options {
        /// Canonical programmer name
        name: &'static str,
        /// Parser message
        message: String,
    },

    /// The operation exists only on another programmer
    #[error("{operation} is only available with the {required} programmer")]
    WrongProgrammer {
        /// Operation requested
        operation: &'static str,
        /// Programmer that implements it
        required: &'static str,
    },
}

/// Get information about all available programmers (enabled at compile time)
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_programmers() -> Vec<ProgrammerInfo> {
    let mut programmers = Vec::new();

    #[cfg(feature = "dummy")]
    programmers.push(ProgrammerInfo {
        name: "dummy",
        aliases: &[],
        description: "In-memory AVR emulator for testing (signature=,flash=,eeprom=,page=)",
    });

    #[cfg(feature = "usbasp")]
    programmers.push(ProgrammerInfo {
        name: "usbasp",
        aliases: &[],
        description: "USBasp USB ISP programmer (VID:16C0 PID:05DC) (vid=,pid=,sck=)",
    });

    #[cfg(feature = "stk500")]
    programmers.push(ProgrammerInfo {
        name: "stk500",
        aliases: &["stk500v1", "arduino"],
        description: "STK500 serial bootloader (dev=<port>,baud=,reset=,timeout=)",
    });

    #[cfg(feature = "stk500")]
    programmers.push(ProgrammerInfo {
        name: "stk500v2",
        aliases: &["avrisp2", "wiring"],
        description: "STK500v2 serial bootloader (dev=<port>,baud=,reset=,timeout=,strict=)",
    });

    programmers
}

/// Generate help text listing all available programmers
pub fn programmer_help() -> String {
    let programmers = available_programmers();

    if programmers.is_empty() {
        return "No programmers available (recompile with programmer features enabled)".to_string();
    }

    let mut help = String::from("Available programmers:\n");
    for p in &programmers {
        help.push_str(&format!("  {:10} - {}\n", p.name, p.description));
    }
    help
}

/// Generate a short list of programmer names for CLI help
pub fn programmer_names_short() -> String {
    let programmers = available_programmers();
    let names: Vec<&str> = programmers.iter().map(|p| p.name).collect();
    names.join(", ")
}

/// Resolve a name or alias to the canonical programmer name
pub fn find_programmer(name: &str) -> Option<&'static str> {
    available_programmers()
        .into_iter()
        .find(|p| p.name == name || p.aliases.contains(&name))
        .map(|p| p.name)
}

/// Parse a programmer string into name and options
///
/// Format: "name" or "name:option1=value1,option2=value2"
pub fn parse_programmer_string(s: &str) -> (&str, Vec<(&str, &str)>) {
    if let Some((name, opts)) = s.split_once(':') {
        let options: Vec<_> = opts
            .split(',')
            .filter_map(|opt| opt.split_once('='))
            .collect();
        (name, options)
    } else {
        (s, Vec::new())
    }
}

fn unknown_programmer(name: &str) -> ProgrammerError {
    ProgrammerError::Unknown {
        name: name.to_string(),
        help: programmer_help(),
    }
}

/// Build the programmer described by `programmer`
///
/// The programmer string can be just the name (e.g., "usbasp") or include
/// parameters (e.g., "stk500:dev=/dev/ttyUSB0,baud=57600"). The returned
/// programmer is not yet open.
#[allow(unused_variables)]
pub fn create_programmer(programmer: &str) -> Result<Box<dyn Programmer>, ProgrammerError> {
    let (name, options) = parse_programmer_string(programmer);
    let canonical = find_programmer(name).ok_or_else(|| unknown_programmer(name))?;

    match canonical {
        #[cfg(feature = "dummy")]
        "dummy" => {
            let config = avrburner_dummy::parse_options(&options).map_err(|e| {
                ProgrammerError::Options {
                    name: "dummy",
                    message: e.to_string(),
                }
            })?;
            Ok(Box::new(avrburner_dummy::DummyAvr::new(config)))
        }

        #[cfg(feature = "usbasp")]
        "usbasp" => {
            let config = avrburner_usbasp::parse_options(&options).map_err(|e| {
                ProgrammerError::Options {
                    name: "usbasp",
                    message: e.to_string(),
                }
            })?;
            Ok(Box::new(avrburner_usbasp::Usbasp::new(config)))
        }

        #[cfg(feature = "stk500")]
        "stk500" => Ok(Box::new(stk500_options("stk500", &options)?.stk500())),

        #[cfg(feature = "stk500")]
        "stk500v2" => Ok(Box::new(stk500_options("stk500v2", &options)?.stk500v2())),

        _ => Err(unknown_programmer(name)),
    }
}

#[cfg(feature = "stk500")]
fn stk500_options(
    name: &'static str,
    options: &[(&str, &str)],
) -> Result<avrburner_stk500::Stk500Options, ProgrammerError> {
    avrburner_stk500::parse_options(options).map_err(|e| ProgrammerError::Options {
        name,
        message: e.to_string(),
    })
}

/// Build an STK500 (version 1) programmer for its protocol-specific commands
#[cfg(feature = "stk500")]
pub fn create_stk500(
    programmer: &str,
    operation: &'static str,
) -> Result<avrburner_stk500::Stk500, ProgrammerError> {
    let (name, options) = parse_programmer_string(programmer);
    match find_programmer(name) {
        Some("stk500") => Ok(stk500_options("stk500", &options)?.stk500()),
        Some(_) => Err(ProgrammerError::WrongProgrammer {
            operation,
            required: "stk500",
        }),
        None => Err(unknown_programmer(name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_programmer_string() {
        assert_eq!(parse_programmer_string("usbasp"), ("usbasp", vec![]));
        assert_eq!(
            parse_programmer_string("stk500:dev=/dev/ttyUSB0,baud=57600"),
            ("stk500", vec![("dev", "/dev/ttyUSB0"), ("baud", "57600")])
        );
    }

    #[test]
    fn test_unknown_programmer() {
        assert!(find_programmer("ch341a").is_none());
        assert!(matches!(
            create_programmer("ch341a"),
            Err(ProgrammerError::Unknown { .. })
        ));
    }

    #[cfg(feature = "stk500")]
    #[test]
    fn test_aliases() {
        assert_eq!(find_programmer("arduino"), Some("stk500"));
        assert_eq!(find_programmer("avrisp2"), Some("stk500v2"));
    }

    #[cfg(feature = "stk500")]
    #[test]
    fn test_stk500_requires_port() {
        assert!(matches!(
            create_programmer("stk500"),
            Err(ProgrammerError::Options { name: "stk500", .. })
        ));
        let prog = create_programmer("stk500v2:dev=/dev/null,strict=1").unwrap();
        assert_eq!(prog.name(), "stk500v2");
        assert!(!prog.is_connected());
    }

    #[cfg(all(feature = "stk500", feature = "dummy"))]
    #[test]
    fn test_stk500_only_commands() {
        assert!(matches!(
            create_stk500("dummy", "sync"),
            Err(ProgrammerError::WrongProgrammer {
                required: "stk500",
                ..
            })
        ));
        assert!(create_stk500("arduino:dev=/dev/null", "sync").is_ok());
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_create_dummy() {
        let prog = create_programmer("dummy:signature=0x1E930B").unwrap();
        assert_eq!(prog.name(), "dummy");
        assert!(create_programmer("dummy:colour=blue").is_err());
    }
}
