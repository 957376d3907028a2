//! Shared utilities across kernel-gen modules.

pub mod cwd;
pub mod files;
pub mod temp;

pub use cwd::CwdGuard;
pub use files::{copy_file_with_dirs, copy_tree};
pub use temp::{cleanup_work_dir, prepare_work_dir, WorkDir};
