//! Preflight command - reports what a build would be missing.

use std::io::Write;

use anyhow::{bail, Result};

use crate::config::Config;
use crate::preflight;

/// Execute the preflight command. With `strict`, blocking findings are an
/// error instead of a note.
pub fn cmd_preflight(config: &Config, strict: bool, out: &mut dyn Write) -> Result<()> {
    let report = preflight::run_preflight(config);
    report.write_to(out)?;

    if report.is_ready() {
        writeln!(out, "Ready to build.")?;
    } else if strict {
        bail!(
            "Preflight failed: {} blocking finding(s). Fix the issues above before building.",
            report.blocking().count()
        );
    } else {
        writeln!(out, "Use --strict to exit with an error.")?;
    }
    Ok(())
}
