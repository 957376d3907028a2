//! File copying with automatic parent directory creation.

use std::fs;
use std::os::unix::fs::symlink;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::{Error, PathContext, Result};

/// Copy a file, creating the destination's parent directories as needed.
/// Permissions and modification time are preserved.
pub fn copy_file_with_dirs(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).with_path(parent)?;
    }
    fs::copy(src, dst).with_path(src)?;

    let metadata = fs::metadata(src).with_path(src)?;
    if let Ok(modified) = metadata.modified() {
        let file = fs::File::open(dst).with_path(dst)?;
        file.set_modified(modified).with_path(dst)?;
    }
    Ok(())
}

/// Recursively copy `src` (file, symlink or directory) to `dst`.
///
/// Symlinks are recreated, not followed.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(|e| walk_error(src, e))?;
        let rel = entry.path().strip_prefix(src).unwrap_or(Path::new(""));
        // Joining an empty path would append a trailing slash
        let target = if rel.as_os_str().is_empty() {
            dst.to_path_buf()
        } else {
            dst.join(rel)
        };
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target).with_path(&target)?;
            let perms = entry.metadata().map_err(|e| walk_error(src, e))?.permissions();
            fs::set_permissions(&target, perms).with_path(&target)?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path()).with_path(entry.path())?;
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).with_path(parent)?;
            }
            symlink(&link, &target).with_path(&target)?;
        } else {
            copy_file_with_dirs(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Convert a walkdir error, keeping the path that caused it.
pub fn walk_error(root: &Path, e: walkdir::Error) -> Error {
    let path = e.path().unwrap_or(root).to_path_buf();
    let source = e
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
    Error::Io { path, source }
}
