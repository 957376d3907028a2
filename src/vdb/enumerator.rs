//! Enumerates kernel modules and firmware installed by packages other than
//! the kernel itself.
//!
//! The installed-package database is a two-level tree:
//!
//! ```text
//! var/db/pkg/
//!   app-emulation/
//!     virtualbox-modules-6.1.18/
//!       CONTENTS
//!       SLOT
//!   sys-firmware/
//!     intel-microcode-20210216/
//!       ...
//! ```
//!
//! The walk is lazy and can be restarted by calling
//! [`OutOfTreeEnumerator::packages_and_files`] again. It is not cached: each
//! call reads the database afresh. A missing or unreadable CONTENTS or SLOT
//! file ends the walk with an error; a package database in that state is
//! inconsistent and partial results would hide it.

use std::fs;
use std::path::{Path, PathBuf};
use std::vec;

use serde::Serialize;

use super::contents::ManifestLine;
use crate::error::{PathContext, Result};

/// Location of the installed-package database below the root.
pub const VDB_PATH: &str = "var/db/pkg";

/// Kernel packages own in-tree modules only.
const KERNEL_CATEGORY: &str = "sys-kernel";

const FIRMWARE_PREFIX: &str = "lib/firmware/";
const MODULES_PREFIX: &str = "lib/modules/";
const MODULE_SUFFIXES: &[&str] = &[".ko", ".ko.gz", ".ko.xz", ".ko.zst"];

/// A package and the matching files it installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageFiles {
    /// `category/name-version`, or `category/name:slot` when slot naming
    /// was requested.
    pub package: String,
    /// Paths relative to the module tree (`lib/modules/<version>/`) for
    /// modules, or to `lib/firmware/` for firmware.
    pub files: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct OutOfTreeEnumerator {
    vdb_path: PathBuf,
    root_prefix: String,
    firmware: bool,
    modules: bool,
}

impl OutOfTreeEnumerator {
    /// Enumerate the database at `<root>/var/db/pkg`.
    pub fn new(root: &Path, firmware: bool, modules: bool) -> Self {
        Self::with_vdb(root, root.join(VDB_PATH), firmware, modules)
    }

    /// Enumerate a database at an explicit location; manifest paths are
    /// still made relative to `root`.
    pub fn with_vdb(root: &Path, vdb_path: PathBuf, firmware: bool, modules: bool) -> Self {
        let mut root_prefix = root.to_string_lossy().into_owned();
        if !root_prefix.ends_with('/') {
            root_prefix.push('/');
        }
        Self {
            vdb_path,
            root_prefix,
            firmware,
            modules,
        }
    }

    /// Every package with at least one matching file, with those files.
    pub fn packages_and_files(&self, use_slot: bool) -> PackagesAndFiles<'_> {
        PackagesAndFiles {
            enumerator: self,
            use_slot,
            categories: None,
            packages: Vec::new().into_iter(),
            category: String::new(),
            done: false,
        }
    }

    /// Matching file paths only.
    pub fn files(&self) -> impl Iterator<Item = Result<String>> + '_ {
        self.packages_and_files(false).flat_map(|item| {
            let files: Vec<Result<String>> = match item {
                Ok(pkg) => pkg.files.into_iter().map(Ok).collect(),
                Err(e) => vec![Err(e)],
            };
            files
        })
    }

    /// Package identities only.
    pub fn packages(&self, use_slot: bool) -> impl Iterator<Item = Result<String>> + '_ {
        self.packages_and_files(use_slot)
            .map(|item| item.map(|pkg| pkg.package))
    }

    fn read_package(
        &self,
        category: &str,
        name: &str,
        package_path: &Path,
        use_slot: bool,
    ) -> Result<Option<PackageFiles>> {
        let contents_path = package_path.join("CONTENTS");
        let raw = fs::read(&contents_path).with_path(&contents_path)?;
        let contents = String::from_utf8_lossy(&raw);

        let files: Vec<String> = contents
            .lines()
            .filter_map(ManifestLine::parse)
            .filter(|entry| entry.is_obj())
            .filter_map(|entry| self.select(self.strip_root(entry.path)))
            .collect();
        if files.is_empty() {
            return Ok(None);
        }

        let mut package = format!("{}/{}", category, name);
        if use_slot {
            let slot_path = package_path.join("SLOT");
            let slot = fs::read_to_string(&slot_path).with_path(&slot_path)?;
            package = slot_name(&package, slot.trim());
        }
        Ok(Some(PackageFiles { package, files }))
    }

    fn strip_root<'p>(&self, path: &'p str) -> &'p str {
        path.strip_prefix(self.root_prefix.as_str())
            .unwrap_or_else(|| path.trim_start_matches('/'))
    }

    /// Apply the module or firmware transform, or reject the file.
    fn select(&self, rel: &str) -> Option<String> {
        if self.modules && MODULE_SUFFIXES.iter().any(|s| rel.ends_with(s)) {
            Some(strip_module_tree(rel).to_string())
        } else if self.firmware && rel.starts_with(FIRMWARE_PREFIX) {
            Some(rel[FIRMWARE_PREFIX.len()..].to_string())
        } else {
            None
        }
    }
}

/// Strip a leading `lib/modules/<version>/`.
fn strip_module_tree(rel: &str) -> &str {
    match rel.strip_prefix(MODULES_PREFIX).and_then(|r| r.split_once('/')) {
        Some((version, rest)) if !version.is_empty() => rest,
        _ => rel,
    }
}

/// Replace the version suffix of `category/name-version` with `:slot`.
///
/// The version starts at the rightmost `-` followed by a digit, so names
/// that themselves contain such a segment (`font-adobe-100dpi-1.0.3`) keep
/// it. An identity without a version is returned unchanged.
pub fn slot_name(package: &str, slot: &str) -> String {
    let bytes = package.as_bytes();
    let split = (0..bytes.len().saturating_sub(1))
        .rev()
        .find(|&i| bytes[i] == b'-' && bytes[i + 1].is_ascii_digit());
    match split {
        Some(i) => format!("{}:{}", &package[..i], slot),
        None => package.to_string(),
    }
}

/// Lazy walk over the package database. See
/// [`OutOfTreeEnumerator::packages_and_files`].
pub struct PackagesAndFiles<'a> {
    enumerator: &'a OutOfTreeEnumerator,
    use_slot: bool,
    categories: Option<vec::IntoIter<(String, PathBuf)>>,
    packages: vec::IntoIter<(String, PathBuf)>,
    category: String,
    done: bool,
}

impl Iterator for PackagesAndFiles<'_> {
    type Item = Result<PackageFiles>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }

            if let Some((name, path)) = self.packages.next() {
                match self
                    .enumerator
                    .read_package(&self.category, &name, &path, self.use_slot)
                {
                    Ok(Some(pkg)) => return Some(Ok(pkg)),
                    Ok(None) => continue,
                    Err(e) => return Some(Err(self.fail(e))),
                }
            }

            if self.categories.is_none() {
                match list_dirs(&self.enumerator.vdb_path) {
                    Ok(dirs) => self.categories = Some(dirs.into_iter()),
                    Err(e) => return Some(Err(self.fail(e))),
                }
            }

            let next_category = self.categories.as_mut().and_then(Iterator::next);
            match next_category {
                None => {
                    self.done = true;
                    return None;
                }
                Some((category, _)) if category == KERNEL_CATEGORY => continue,
                Some((category, path)) => match list_dirs(&path) {
                    Ok(dirs) => {
                        self.category = category;
                        self.packages = dirs.into_iter();
                    }
                    Err(e) => return Some(Err(self.fail(e))),
                },
            }
        }
    }
}

impl PackagesAndFiles<'_> {
    fn fail(&mut self, e: crate::error::Error) -> crate::error::Error {
        self.done = true;
        e
    }
}

/// Subdirectories of `dir`, sorted by name so repeated walks agree.
fn list_dirs(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir).with_path(dir)? {
        let entry = entry.with_path(dir)?;
        let path = entry.path();
        if path.is_dir() {
            dirs.push((entry.file_name().to_string_lossy().into_owned(), path));
        }
    }
    dirs.sort();
    Ok(dirs)
}
