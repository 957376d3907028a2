//! Driver for the kernel's build system.
//!
//! Two kinds of targets are used: informational ones (`kernelversion`,
//! `kernelrelease`, `image_name`) that must print exactly one line, and
//! side-effecting ones (the default build, `modules_prepare`,
//! `modules_install`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::process::{Cmd, Runner};

/// Portage ARCH values whose kernel ARCH differs.
const PORTAGE_TO_KERNEL_ARCH: &[(&str, &str)] = &[
    ("amd64", "x86_64"),
    ("arm64", "aarch64"),
    ("m68k", "m68"),
    ("ppc", "powerpc"),
    ("ppc64", "powerpc64"),
    ("x86", "i386"),
];

/// Translate a package-manager architecture to the kernel's ARCH.
pub fn kernel_arch(portage_arch: &str) -> &str {
    PORTAGE_TO_KERNEL_ARCH
        .iter()
        .find(|(p, _)| *p == portage_arch)
        .map_or(portage_arch, |(_, k)| k)
}

/// `make` bound to a kernel source directory.
pub struct KernelMake<'r> {
    runner: &'r dyn Runner,
    makeopts: Vec<String>,
    source_dir: PathBuf,
    env: BTreeMap<String, String>,
}

impl<'r> KernelMake<'r> {
    pub fn new(runner: &'r dyn Runner, makeopts: Vec<String>, source_dir: &Path, arch: &str) -> Self {
        let mut env = BTreeMap::new();
        env.insert("ARCH".to_string(), arch.to_string());
        Self {
            runner,
            makeopts,
            source_dir: source_dir.to_path_buf(),
            env,
        }
    }

    /// Point at another source directory, keeping options and environment.
    pub fn with_source(mut self, source_dir: &Path) -> Self {
        self.source_dir = source_dir.to_path_buf();
        self
    }

    /// Extra make argument, e.g. `CC=distcc`.
    pub fn push_arg(&mut self, arg: impl Into<String>) {
        self.makeopts.push(arg.into());
    }

    /// Extra environment variable for every invocation.
    pub fn set_env(&mut self, key: &str, value: impl Into<String>) {
        self.env.insert(key.to_string(), value.into());
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn arch(&self) -> &str {
        self.env.get("ARCH").map_or("", String::as_str)
    }

    fn cmd(&self) -> Cmd {
        Cmd::new("make")
            .args(&self.makeopts)
            .arg("--directory")
            .arg_path(&self.source_dir)
            .envs(&self.env)
    }

    /// `make kernelversion`, or `None` if the directory is not a kernel
    /// source tree. Failures are expected here and not reported.
    pub fn detect_version(&self) -> Option<String> {
        let output = self
            .cmd()
            .args(["--quiet", "kernelversion"])
            .allow_fail()
            .run(self.runner)
            .ok()?;
        if !output.success() {
            return None;
        }
        single_line(&output.stdout, "").map(str::to_string)
    }

    /// Run an informational target that must print exactly one line.
    pub fn query(&self, target: &str) -> Result<String> {
        let output = self
            .cmd()
            .args(["--quiet", target])
            .error_msg(format!("make {} failed", target))
            .run(self.runner)?;

        match single_line(&output.stdout, &output.stderr) {
            Some(line) => Ok(line.to_string()),
            None => Err(Error::UnexpectedOutput {
                command: format!("make {}", target),
                output: format!("{}{}", output.stdout, output.stderr),
            }),
        }
    }

    /// Run side-effecting targets, capturing output.
    pub fn run<I, S>(&self, targets: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let cmd = self.cmd().arg("--quiet").args(targets);
        let msg = format!("{} failed", cmd.display());
        cmd.error_msg(msg).run(self.runner)?;
        Ok(())
    }

    /// Build the image and in-tree modules with the terminal attached.
    pub fn build(&self) -> Result<()> {
        self.cmd()
            .arg("--quiet")
            .error_msg("Kernel build failed")
            .run_interactive(self.runner)?;
        Ok(())
    }

    /// `make modules_install` into `dest`.
    pub fn modules_install(&self, dest: &Path) -> Result<()> {
        self.run([
            format!("INSTALL_MOD_PATH={}", dest.display()),
            "modules_install".to_string(),
        ])
    }
}

/// The sole line of `stdout`, if it has exactly one and `stderr` is empty.
fn single_line<'a>(stdout: &'a str, stderr: &str) -> Option<&'a str> {
    let line = stdout.trim_end();
    if line.is_empty() || line.contains('\n') || !stderr.trim().is_empty() {
        return None;
    }
    Some(line)
}
