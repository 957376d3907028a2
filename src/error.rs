//! Error taxonomy for kernel package generation.
//!
//! Every variant is fatal to the current build. Nothing is retried; callers
//! propagate with `?` and let scoped guards (package scaffold, staging
//! directories, working directory) clean up on the way out.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Kernel not configured, version mismatch, or a required option missing.
    #[error("{0}")]
    Configuration(String),

    /// No usable kernel source directory.
    #[error("{0}")]
    Discovery(String),

    /// An external program exited unsuccessfully.
    #[error("{message}")]
    ExternalTool {
        program: String,
        code: Option<i32>,
        message: String,
    },

    /// An external program succeeded but its output could not be understood.
    #[error("Unexpected output from {command}:\n{output}")]
    UnexpectedOutput { command: String, output: String },

    /// The requested overlay is not known to the package manager.
    #[error("Unknown overlay: {0}")]
    Overlay(String),

    #[error("Failed to execute '{program}'. Is it installed? ({source})")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    pub fn discovery(msg: impl Into<String>) -> Self {
        Error::Discovery(msg.into())
    }
}

/// Attach the offending path to an `io::Error`.
pub trait PathContext<T> {
    fn with_path(self, path: &Path) -> Result<T>;
}

impl<T> PathContext<T> for io::Result<T> {
    fn with_path(self, path: &Path) -> Result<T> {
        self.map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
