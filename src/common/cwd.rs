//! Scoped change of the process working directory.

use std::env;
use std::path::{Path, PathBuf};

use crate::error::{PathContext, Result};

/// Changes the working directory and restores the previous one on drop.
///
/// The working directory is process-wide state: only one guard should be
/// live at a time, and nothing else may rely on the cwd while it is.
#[derive(Debug)]
#[must_use = "the previous directory is restored when the guard is dropped"]
pub struct CwdGuard {
    previous: PathBuf,
}

impl CwdGuard {
    pub fn enter(dir: &Path) -> Result<Self> {
        let previous = env::current_dir().with_path(Path::new("."))?;
        env::set_current_dir(dir).with_path(dir)?;
        Ok(Self { previous })
    }
}

impl Drop for CwdGuard {
    fn drop(&mut self) {
        if let Err(e) = env::set_current_dir(&self.previous) {
            tracing::warn!(
                dir = %self.previous.display(),
                error = %e,
                "failed to restore working directory"
            );
        }
    }
}
