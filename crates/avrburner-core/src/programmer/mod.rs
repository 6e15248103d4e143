//! Programmer traits and abstractions
//!
//! This module defines the traits that all programmers implement, the
//! configuration they share and the progress reporting interface.

mod config;
mod progress;
mod traits;

pub use config::*;
pub use progress::*;
pub use traits::*;
