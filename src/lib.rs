//! `dexsprite` command-line front end.
//!
//! The library half exists so the CLI definitions and wiring can be tested;
//! the binary in `main.rs` only parses arguments and maps errors to exit
//! codes.

pub mod app;
pub mod cli;
pub mod error;
pub mod logging;

pub use crate::app::run_app;
