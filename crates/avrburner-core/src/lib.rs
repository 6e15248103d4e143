//! avrburner-core - Core library for AVR in-circuit programming
//!
//! This crate provides the pieces shared by every programmer back-end:
//! the [`Programmer`](programmer::Programmer) trait, the chunked memory
//! transfer algorithm, chip profiles and the error taxonomy.
//!
//! Concrete programmers live in their own crates (`avrburner-usbasp`,
//! `avrburner-stk500`, `avrburner-dummy`) and only provide the per-chunk
//! primitives plus the fuse and signature commands of their protocol.
//!
//! # Example
//!
//! ```ignore
//! use avrburner_core::memory::MemSource;
//! use avrburner_core::programmer::{NoProgress, Programmer};
//!
//! fn dump_flash<P: Programmer>(prog: &mut P, size: usize) -> avrburner_core::Result<Vec<u8>> {
//!     prog.open(true)?;
//!     let signature = prog.read_signature()?;
//!     println!("Signature: {}", signature);
//!     let data = prog.read_memory(MemSource::Flash, 0, size, false, &mut NoProgress);
//!     prog.close();
//!     data
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod chip;
pub mod error;
pub mod memory;
pub mod programmer;

pub use error::{Error, Result};
