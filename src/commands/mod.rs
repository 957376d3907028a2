//! CLI command handlers.
//!
//! Each submodule handles a specific CLI command:
//! - `build` - Build (and optionally install) a kernel binary package
//! - `list` - List out-of-tree modules and firmware
//! - `preflight` - Run preflight checks

pub mod build;
pub mod list;
mod preflight;

pub use build::{cmd_build, BuildArgs};
pub use list::{cmd_list, ListArgs};
pub use preflight::cmd_preflight;
