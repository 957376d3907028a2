//! Build command - builds a kernel binary package.

use std::path::PathBuf;

use anyhow::Result;

use crate::config::Config;
use crate::generator::{BuildOptions, Generator, InitramfsSource};
use crate::portage::PortageSettings;
use crate::preflight;
use crate::process::Runner;
use crate::ui::Ui;

/// Options of one `build` invocation, already merged with [`Config`].
#[derive(Debug, Clone, Default)]
pub struct BuildArgs {
    pub arch: Option<String>,
    pub source: Option<PathBuf>,
    pub root: Option<PathBuf>,
    pub initramfs: InitramfsSource,
    pub overlay: Option<String>,
    /// Rebuild packages owning out-of-tree modules against the new kernel.
    pub rebuild_modules: bool,
    /// Install the package once created.
    pub install: bool,
    /// Dump a listing of the initramfs contents into this directory.
    pub initramfs_listing: Option<PathBuf>,
    pub skip_preflight: bool,
}

impl BuildArgs {
    /// Fill unset options from configuration.
    pub fn with_defaults(mut self, config: &Config) -> Self {
        self.source = self.source.or_else(|| config.source.clone());
        self.root = self.root.or_else(|| config.root.clone());
        self.overlay = self.overlay.or_else(|| config.overlay.clone());
        if self.initramfs == InitramfsSource::Default {
            if let Some(ref dir) = config.initramfs {
                self.initramfs = InitramfsSource::Path(dir.clone());
            }
        }
        self
    }
}

/// Execute the build command.
pub fn cmd_build(runner: &dyn Runner, ui: &Ui, args: &BuildArgs) -> Result<()> {
    if !args.skip_preflight {
        preflight::require_tools(&["portageq", "make"])?;
    }

    let settings = PortageSettings::load(runner, args.root.as_deref())?;
    let options = BuildOptions {
        arch: args.arch.clone(),
        source: args.source.clone(),
        initramfs: args.initramfs.clone(),
    };
    let mut generator = Generator::prepare(runner, ui, settings, &options)?;
    if !args.skip_preflight {
        preflight::require_tools(&generator.required_tools())?;
    }

    generator.build_kernel(args.rebuild_modules)?;

    let scaffold = generator.create_ebuild(args.overlay.as_deref())?;
    generator.package(&scaffold, args.initramfs_listing.as_deref())?;
    if args.install {
        generator.install()?;
    }
    drop(scaffold);

    ui.info(format!("Done: {}", generator.package_name()));
    Ok(())
}
