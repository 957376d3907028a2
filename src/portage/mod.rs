//! Package-manager driver.
//!
//! Wraps `ebuild` (single-package lifecycle: clean, manifest, install,
//! package) and `emerge` (dependency resolution, batch builds, binary
//! installs). Every invocation carries the settings' environment (`ROOT`)
//! explicitly.

pub mod ebuild;
pub mod settings;

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;
use crate::process::{CommandOutput, Cmd, Runner};

pub use ebuild::{parse_image_dir, EbuildScaffold, IMAGE_DIR_MARKER};
pub use settings::{PortageSettings, Repository};

const EMERGE_QUIET: &[&str] = &["--quiet", "--quiet-build", "--quiet-fail=y"];

pub struct Portage<'r> {
    runner: &'r dyn Runner,
    env: BTreeMap<String, String>,
    emerge: String,
}

impl<'r> Portage<'r> {
    /// `cross_prefix` selects a cross toolchain's emerge wrapper
    /// (`<prefix>emerge`).
    pub fn new(runner: &'r dyn Runner, settings: &PortageSettings, cross_prefix: Option<&str>) -> Self {
        Self {
            runner,
            env: settings.env.clone(),
            emerge: format!("{}emerge", cross_prefix.unwrap_or("")),
        }
    }

    pub fn runner(&self) -> &'r dyn Runner {
        self.runner
    }

    /// Run `ebuild <file> <phases...>`, capturing output.
    pub fn ebuild(&self, ebuild: &Path, phases: &[&str]) -> Result<CommandOutput> {
        Cmd::new("ebuild")
            .arg_path(ebuild)
            .args(phases)
            .envs(&self.env)
            .error_msg(format!("ebuild {} failed", phases.join(" ")))
            .run(self.runner)
    }

    /// Run emerge quietly with `args`, plus `extra_env` for this call only.
    pub fn emerge<I, S>(&self, args: I, extra_env: &BTreeMap<String, String>) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let cmd = Cmd::new(&self.emerge)
            .args(EMERGE_QUIET)
            .args(args)
            .envs(&self.env)
            .envs(extra_env);
        let msg = format!("{} failed", cmd.display());
        cmd.error_msg(msg).run(self.runner)?;
        Ok(())
    }

    pub fn emerge_program(&self) -> &str {
        &self.emerge
    }
}
