//! Temporary work directories that clean up after themselves.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PathContext, Result};

/// Prepare a work directory, removing it if it exists and creating it fresh.
pub fn prepare_work_dir(parent_dir: &Path, name: &str) -> Result<PathBuf> {
    let work_dir = parent_dir.join(name);

    // Leftovers from an interrupted run
    if work_dir.exists() {
        fs::remove_dir_all(&work_dir).with_path(&work_dir)?;
    }
    fs::create_dir_all(&work_dir).with_path(&work_dir)?;

    Ok(work_dir)
}

/// Remove a work directory, ignoring errors (idempotent).
pub fn cleanup_work_dir(path: &Path) {
    let _ = fs::remove_dir_all(path);
}

/// A freshly created directory that is removed when dropped, whether the
/// work done inside it succeeded or not.
#[derive(Debug)]
pub struct WorkDir {
    path: PathBuf,
}

impl WorkDir {
    pub fn create(parent_dir: &Path, name: &str) -> Result<Self> {
        Ok(Self {
            path: prepare_work_dir(parent_dir, name)?,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        cleanup_work_dir(&self.path);
    }
}
