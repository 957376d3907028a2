//! List command - prints out-of-tree kernel modules and firmware.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;

use crate::vdb::{OutOfTreeEnumerator, PackageFiles};

#[derive(Debug, Clone, Default)]
pub struct ListArgs {
    pub root: PathBuf,
    pub modules: bool,
    pub firmware: bool,
    /// Print matching files.
    pub files: bool,
    /// Print owning packages; with `files`, one package and its files per line.
    pub packages: bool,
    /// Name packages `category/name-version` instead of `category/name:slot`.
    pub no_slot: bool,
    pub json: bool,
}

/// Execute the list command, writing to `out`.
///
/// Without `--modules`/`--firmware` both are listed; without
/// `--files`/`--packages` packages are listed.
pub fn cmd_list(args: &ListArgs, out: &mut dyn Write) -> Result<()> {
    let (modules, firmware) = match (args.modules, args.firmware) {
        (false, false) => (true, true),
        selected => selected,
    };
    let enumerator = OutOfTreeEnumerator::new(&args.root, firmware, modules);
    let use_slot = !args.no_slot;

    if args.json {
        let mut by_package = BTreeMap::new();
        for item in enumerator.packages_and_files(use_slot) {
            let PackageFiles { package, files } = item?;
            by_package.insert(package, files);
        }
        serde_json::to_writer_pretty(&mut *out, &by_package)?;
        writeln!(out)?;
        return Ok(());
    }

    match (args.files, args.packages) {
        (true, true) => {
            for item in enumerator.packages_and_files(use_slot) {
                let item = item?;
                writeln!(out, "{} {}", item.package, item.files.join(" "))?;
            }
        }
        (true, false) => {
            for file in enumerator.files() {
                writeln!(out, "{}", file?)?;
            }
        }
        (false, _) => {
            for package in enumerator.packages(use_slot) {
                writeln!(out, "{}", package?)?;
            }
        }
    }
    Ok(())
}
