//! Configuration for kernel-gen.
//!
//! Read from environment variables. `main` loads a `.env` file with dotenvy
//! first, so values there behave like exported variables. Command-line flags
//! take precedence over everything here.

use std::path::PathBuf;

/// Default directory for debug dumps when TMPDIR is unset.
pub const DEFAULT_TMPDIR: &str = "/tmp";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Installation root (ROOT). `None` lets the package manager decide.
    pub root: Option<PathBuf>,
    /// Kernel source directory (KERNEL_GEN_SOURCE).
    pub source: Option<PathBuf>,
    /// Initramfs source directory (KERNEL_GEN_INITRAMFS).
    pub initramfs: Option<PathBuf>,
    /// Overlay receiving the temporary ebuild (KERNEL_GEN_OVERLAY).
    pub overlay: Option<String>,
    /// Where debug listings go (TMPDIR).
    pub tmpdir: PathBuf,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            root: non_empty("ROOT").map(PathBuf::from),
            source: non_empty("KERNEL_GEN_SOURCE").map(PathBuf::from),
            initramfs: non_empty("KERNEL_GEN_INITRAMFS").map(PathBuf::from),
            overlay: non_empty("KERNEL_GEN_OVERLAY"),
            tmpdir: non_empty("TMPDIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TMPDIR)),
        }
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        let show = |p: &Option<PathBuf>| {
            p.as_ref()
                .map_or_else(|| "(unset)".to_string(), |p| p.display().to_string())
        };
        println!("Configuration:");
        println!("  ROOT: {}", show(&self.root));
        println!("  KERNEL_GEN_SOURCE: {}", show(&self.source));
        println!("  KERNEL_GEN_INITRAMFS: {}", show(&self.initramfs));
        println!(
            "  KERNEL_GEN_OVERLAY: {}",
            self.overlay.as_deref().unwrap_or("(highest priority)")
        );
        println!("  TMPDIR: {}", self.tmpdir.display());
    }
}
