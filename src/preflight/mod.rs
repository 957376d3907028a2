//! Preflight checks for kernel builds.
//!
//! Looks up the host programs each build stage runs and checks the build
//! environment. Run with `kernel-gen preflight` to see everything at once;
//! `build` checks only what the configured kernel needs.

mod environment;
mod host_tools;
mod types;

use std::io;
use std::path::Path;

use anyhow::{bail, Result};

use crate::config::Config;
use crate::generator::DEFAULT_SOURCE_DIR;

pub use host_tools::check_tools;
pub use types::{Finding, Group, Outcome, PreflightReport};

/// Run all preflight checks.
pub fn run_preflight(config: &Config) -> PreflightReport {
    let mut findings = host_tools::check_host_tools();

    findings.push(environment::check_writable_dir("TMPDIR", &config.tmpdir));
    let source = match (&config.source, &config.root) {
        (Some(source), _) => source.clone(),
        (None, Some(root)) => root.join(DEFAULT_SOURCE_DIR),
        (None, None) => Path::new("/").join(DEFAULT_SOURCE_DIR),
    };
    findings.push(environment::check_kernel_source(&source));

    let report = PreflightReport::new(findings);
    tracing::debug!(
        blocking = report.blocking().count(),
        warnings = report.warnings().count(),
        "preflight finished"
    );
    report
}

/// Fail unless every program in `tools` is on PATH. Quiet on success.
pub fn require_tools<S: AsRef<str>>(tools: &[S]) -> Result<()> {
    let missing: Vec<Finding> = check_tools(tools)
        .into_iter()
        .filter(Finding::is_blocking_failure)
        .collect();
    if missing.is_empty() {
        return Ok(());
    }

    let report = PreflightReport::new(missing);
    report.write_to(&mut io::stderr().lock())?;
    bail!(
        "Missing {} required program(s). Install them or run `kernel-gen preflight`.",
        report.blocking().count()
    );
}
