//! Initramfs assembly.
//!
//! Everything is staged in `<PORTAGE_TMPDIR>/initramfs-<release>`:
//!
//! 1. in-tree modules from `make modules_install`, minus [`EXCLUDED_MODULE_DIRS`]
//! 2. firmware installed by other packages
//! 3. the output of the source tree's `build` hook if it has an executable
//!    one, otherwise a copy of the source tree
//!
//! The staged tree is archived with `find . -print0 | cpio | <compressor>`.
//!
//! # Hook contract
//!
//! The hook runs with the staging directory as its working directory and
//! receives `ARCH` (kernel architecture), `PORTAGE_ARCH`, `CROSS_COMPILE`
//! (only when cross compiling) and `ROOT` (when one was given). It populates
//! the current directory with whatever the initramfs should contain.
//!
//! The process working directory is also moved into the staging directory
//! for the duration of the assembly, and restored afterwards on every path.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::common::files::walk_error;
use crate::common::{copy_file_with_dirs, copy_tree, CwdGuard, WorkDir};
use crate::error::{Error, PathContext, Result};
use crate::kernel::{Compressor, KernelMake};
use crate::process::{self, Cmd, Runner};
use crate::timing::Timer;
use crate::ui::Ui;
use crate::vdb::OutOfTreeEnumerator;

/// Module subdirectories (below `lib*/modules/<version>/kernel/`) left out
/// of the initramfs.
pub const EXCLUDED_MODULE_DIRS: &[&str] = &[
    "arch/x86/kvm",
    "drivers/bluetooth",
    "drivers/media",
    "net/bluetooth",
    "net/netfilter",
    "sound",
    "vhost",
];

/// Name of the optional build hook inside the initramfs source directory.
pub const BUILD_HOOK: &str = "build";

const FIRMWARE_DIR: &str = "lib/firmware";
const CPIO_ARGS: &[&str] = &["--create", "--format=newc", "--null", "--owner=0:0"];

/// Assembles one initramfs archive.
pub struct InitramfsBuilder<'a> {
    pub runner: &'a dyn Runner,
    pub ui: &'a Ui,
    pub make: &'a KernelMake<'a>,
    /// Installation root, for out-of-tree firmware.
    pub root: &'a Path,
    /// Initramfs source directory.
    pub source: &'a Path,
    /// Parent of the staging directory.
    pub work_parent: &'a Path,
    pub release: &'a str,
    pub compressor: Option<&'static Compressor>,
    /// Environment for the build hook.
    pub hook_env: BTreeMap<String, String>,
    /// Where to dump a listing of the staged tree, if anywhere.
    pub listing: Option<PathBuf>,
}

impl InitramfsBuilder<'_> {
    /// Build the archive at `archive`. The staging directory is gone when
    /// this returns, successfully or not.
    pub fn build(&self, archive: &Path) -> Result<()> {
        self.ui.info("Generating initramfs");
        let _indent = self.ui.indented();
        let timer = Timer::start("Initramfs");

        // Declared before the guard so the working directory is restored
        // before the staging directory is removed.
        let work = WorkDir::create(self.work_parent, &format!("initramfs-{}", self.release))?;
        let staging = work.path();
        let _cwd = CwdGuard::enter(staging)?;

        self.ui.info("Adding kernel modules");
        self.make.modules_install(staging)?;
        remove_excluded_modules(staging)?;

        self.ui.info("Adding out-of-tree firmware");
        copy_out_of_tree_firmware(self.root, staging)?;

        self.add_sources(staging)?;

        self.ui.info("Collecting file names");
        let files = collect_files(staging)?;
        tracing::debug!(count = files.len(), "staged initramfs files");

        if let Some(ref listing) = self.listing {
            self.ui.info(format!(
                "Dumping contents of generated initramfs to {}",
                listing.display()
            ));
            write_listing(self.runner, staging, &files, listing)?;
        }

        self.ui.info("Creating archive");
        write_archive(self.runner, staging, self.compressor, archive)?;
        tracing::debug!(
            archive = %archive.display(),
            bytes = process::sink_len(archive)?,
            "initramfs archive written"
        );

        self.ui.info("Cleaning up initramfs");
        timer.finish(self.ui);
        Ok(())
    }

    fn add_sources(&self, staging: &Path) -> Result<()> {
        let hook = self.source.join(BUILD_HOOK);
        if is_executable(&hook) {
            self.ui.info("Invoking initramfs custom build script");
            let _indent = self.ui.indented();
            Cmd::new(hook.to_string_lossy())
                .envs(&self.hook_env)
                .dir(staging)
                .error_msg("Initramfs build script failed")
                .run_interactive(self.runner)?;
            return Ok(());
        }

        self.ui.info("Adding source files");
        for entry in fs::read_dir(self.source).with_path(self.source)? {
            let entry = entry.with_path(self.source)?;
            copy_tree(&entry.path(), &staging.join(entry.file_name()))?;
        }
        Ok(())
    }
}

/// `rm -rf lib*/modules/*/kernel/{EXCLUDED_MODULE_DIRS}`
pub fn remove_excluded_modules(staging: &Path) -> Result<()> {
    for lib in subdirs(staging)? {
        let is_lib = lib
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("lib"));
        let modules = lib.join("modules");
        if !is_lib || !modules.is_dir() {
            continue;
        }
        for version in subdirs(&modules)? {
            let kernel = version.join("kernel");
            for excluded in EXCLUDED_MODULE_DIRS {
                let dir = kernel.join(excluded);
                match fs::remove_dir_all(&dir) {
                    Ok(()) => tracing::debug!(dir = %dir.display(), "excluded from initramfs"),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(source) => return Err(Error::Io { path: dir, source }),
                }
            }
        }
    }
    Ok(())
}

fn subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir).with_path(dir)? {
        let entry = entry.with_path(dir)?;
        if entry.file_type().with_path(&entry.path())?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Copy firmware installed by non-kernel packages from `root` into the
/// staging tree.
pub fn copy_out_of_tree_firmware(root: &Path, staging: &Path) -> Result<usize> {
    let src = root.join(FIRMWARE_DIR);
    let dst = staging.join(FIRMWARE_DIR);
    let mut copied = 0;
    for file in OutOfTreeEnumerator::new(root, true, false).files() {
        let file = file?;
        copy_file_with_dirs(&src.join(&file), &dst.join(&file))?;
        copied += 1;
    }
    Ok(copied)
}

/// Every non-directory entry below `staging`, relative to it, sorted.
pub fn collect_files(staging: &Path) -> Result<Vec<String>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(staging).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| walk_error(staging, e))?;
        if entry.file_type().is_dir() {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(staging) {
            files.push(rel.to_string_lossy().into_owned());
        }
    }
    Ok(files)
}

fn write_listing(runner: &dyn Runner, staging: &Path, files: &[String], listing: &Path) -> Result<()> {
    let output = Cmd::new("ls")
        .args(["-lR", "--color=always"])
        .args(files)
        .dir(staging)
        .error_msg("Failed to list initramfs contents")
        .run(runner)?;
    if let Some(parent) = listing.parent() {
        fs::create_dir_all(parent).with_path(parent)?;
    }
    fs::write(listing, output.stdout).with_path(listing)
}

/// The `find | cpio | compressor` stages, compressor replaced by `cat` when
/// there is none.
pub fn archive_stages(compressor: Option<&Compressor>) -> Vec<Cmd> {
    let compress = match compressor {
        Some(c) => Cmd::new(c.program()).args(c.args()),
        None => Cmd::new("cat"),
    };
    vec![
        Cmd::new("find").args([".", "-print0"]),
        // cpio reports block counts on stderr
        Cmd::new("cpio").args(CPIO_ARGS).discard_stderr(),
        compress,
    ]
}

fn write_archive(
    runner: &dyn Runner,
    staging: &Path,
    compressor: Option<&Compressor>,
    archive: &Path,
) -> Result<()> {
    if let Some(parent) = archive.parent() {
        fs::create_dir_all(parent).with_path(parent)?;
    }
    process::pipeline(runner, &archive_stages(compressor), staging, archive)
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
