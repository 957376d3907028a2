//! kernel-gen library exports.
//!
//! Builds Linux kernel binary packages through Portage, and enumerates
//! kernel modules and firmware installed by other packages. The binary in
//! `main.rs` is a thin CLI over these modules; they are public so the
//! integration tests in `tests/` can drive them with a scripted runner.

pub mod commands;
pub mod common;
pub mod config;
pub mod error;
pub mod generator;
pub mod kernel;
pub mod portage;
pub mod preflight;
pub mod process;
pub mod timing;
pub mod ui;
pub mod vdb;

pub use error::{Error, Result};
