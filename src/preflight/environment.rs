//! Build environment checks.

use std::fs;
use std::path::Path;

use super::types::Finding;

/// Check that `dir` exists (creating it if needed) and accepts new files.
pub fn check_writable_dir(name: &str, dir: &Path) -> Finding {
    Finding::environment(name, writable(dir), true)
}

fn writable(dir: &Path) -> std::result::Result<String, String> {
    fs::create_dir_all(dir).map_err(|e| format!("cannot create {}: {}", dir.display(), e))?;

    let test_file = dir.join(".kernel-gen-preflight");
    fs::write(&test_file, "test").map_err(|e| format!("cannot write to {}: {}", dir.display(), e))?;
    let _ = fs::remove_file(&test_file);
    Ok(dir.display().to_string())
}

/// Sources can also be given per build, so a missing tree only warns.
pub fn check_kernel_source(dir: &Path) -> Finding {
    let result = if dir.join("Makefile").is_file() {
        Ok(dir.display().to_string())
    } else {
        Err(format!(
            "no kernel sources at {}; use --source or run from a source tree",
            dir.display()
        ))
    };
    Finding::environment("kernel source", result, false)
}
