//! The temporary ebuild used to seal a kernel into a binary package.
//!
//! [`EbuildScaffold::create`] writes the ebuild into an overlay and runs it
//! up to the install phase; the ebuild prints its image directory (`${D}`)
//! as a marker line, which is where the kernel files get staged. Dropping
//! the scaffold runs `ebuild ... clean` and deletes the file, whatever
//! happened in between.

use std::fs;
use std::path::{Path, PathBuf};

use super::{Portage, Repository};
use crate::error::{Error, PathContext, Result};
use crate::kernel::package::{PackageName, EBUILD_TEMPLATE};
use crate::ui::Ui;

/// Prefix of the line the ebuild prints during `install`.
pub const IMAGE_DIR_MARKER: &str = "KERNEL-GEN: D=";

/// Find the image directory reported by the ebuild's install phase.
pub fn parse_image_dir(output: &str) -> Option<PathBuf> {
    output
        .lines()
        .find_map(|line| line.strip_prefix(IMAGE_DIR_MARKER))
        .map(|d| PathBuf::from(d.trim_end()))
        .filter(|d| !d.as_os_str().is_empty())
}

pub struct EbuildScaffold<'a> {
    portage: &'a Portage<'a>,
    ui: &'a Ui,
    ebuild_path: PathBuf,
    image_dir: PathBuf,
    removed: bool,
}

impl<'a> EbuildScaffold<'a> {
    /// Write the ebuild for `package` into `overlay` and run it through
    /// clean, manifest and install.
    pub fn create(
        portage: &'a Portage<'a>,
        ui: &'a Ui,
        overlay: &Repository,
        package: &PackageName,
    ) -> Result<Self> {
        ui.info(format!(
            "Creating temporary ebuild {}::{}",
            package, overlay.name
        ));

        let ebuild_dir = overlay.location.join(&package.category).join(&package.name);
        fs::create_dir_all(&ebuild_dir).with_path(&ebuild_dir)?;
        let ebuild_path = ebuild_dir.join(package.ebuild_file_name());
        fs::write(&ebuild_path, EBUILD_TEMPLATE).with_path(&ebuild_path)?;

        // From here on, dropping `scaffold` cleans up.
        let mut scaffold = Self {
            portage,
            ui,
            ebuild_path,
            image_dir: PathBuf::new(),
            removed: false,
        };

        let output = portage.ebuild(&scaffold.ebuild_path, &["clean", "manifest", "install"])?;
        let combined = format!("{}\n{}", output.stdout, output.stderr);
        scaffold.image_dir = parse_image_dir(&combined).ok_or_else(|| Error::UnexpectedOutput {
            command: format!("ebuild {} install", scaffold.ebuild_path.display()),
            output: format!("no '{}' line in:\n{}", IMAGE_DIR_MARKER, combined.trim()),
        })?;

        Ok(scaffold)
    }

    /// Directory whose contents become the package (`${D}`).
    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    pub fn ebuild_path(&self) -> &Path {
        &self.ebuild_path
    }

    /// Seal everything in the image directory into a binary package.
    pub fn package(&self) -> Result<()> {
        self.portage.ebuild(&self.ebuild_path, &["package"])?;
        Ok(())
    }

    /// Clean the package build directory and remove the ebuild. Safe to call
    /// more than once; also runs on drop.
    pub fn remove(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;

        self.ui.info("Cleaning up package build temporary directory");
        if let Err(e) = self.portage.ebuild(&self.ebuild_path, &["clean"]) {
            self.ui.warn(format!("ebuild clean failed: {}", e));
        }
        if let Err(e) = fs::remove_file(&self.ebuild_path) {
            self.ui.warn(format!(
                "Could not remove {}: {}",
                self.ebuild_path.display(),
                e
            ));
        }
        if let Some(dir) = self.ebuild_path.parent() {
            remove_if_only_manifest(dir);
        }
    }
}

impl Drop for EbuildScaffold<'_> {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Remove the package directory once nothing but its Manifest is left.
fn remove_if_only_manifest(dir: &Path) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    let names: Vec<_> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name())
        .collect();
    if names.iter().all(|n| n == "Manifest") {
        let _ = fs::remove_dir_all(dir);
    }
}
