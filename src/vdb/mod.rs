//! Installed-package database access.

pub mod contents;
pub mod enumerator;

pub use contents::{EntryKind, ManifestLine};
pub use enumerator::{slot_name, OutOfTreeEnumerator, PackageFiles, VDB_PATH};
