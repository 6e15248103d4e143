//! CLI command implementations
//!
//! Device commands run against an open [`session::Session`], which derefs to
//! the programmer. The STK500-only commands (`sync`, `start-app`) build the
//! bootloader driver directly.

pub mod device;
mod list;
pub mod memory;
pub mod progress;
pub mod session;

pub use list::{list_chips, list_devices, list_programmers};
