//! Host program lookups.

use std::path::Path;

use crate::kernel::compressor::COMPRESSORS;
use crate::process;

use super::types::{Finding, Group};

/// Programs every build runs, with the package providing them.
const BUILD_TOOLS: &[(&str, &str)] = &[
    ("make", "sys-devel/make"),
    ("portageq", "sys-apps/portage"),
    ("ebuild", "sys-apps/portage"),
    ("emerge", "sys-apps/portage"),
];

/// Programs only needed when generating an initramfs.
const INITRAMFS_TOOLS: &[(&str, &str)] = &[
    ("cpio", "app-arch/cpio"),
    ("find", "sys-apps/findutils"),
];

/// Look up every program a build may need. Only the build tools block;
/// the rest depend on the kernel configuration and initramfs source.
pub fn check_host_tools() -> Vec<Finding> {
    let build = BUILD_TOOLS
        .iter()
        .map(|&(tool, package)| lookup(Group::Build, tool, Some(package), true));
    let initramfs = INITRAMFS_TOOLS
        .iter()
        .map(|&(tool, package)| lookup(Group::Initramfs, tool, Some(package), false));
    let compressors = COMPRESSORS
        .iter()
        .map(|c| lookup(Group::Compressor, c.program(), Some(c.package), false));

    build.chain(initramfs).chain(compressors).collect()
}

/// Look up an explicit list of programs, all blocking.
pub fn check_tools<S: AsRef<str>>(tools: &[S]) -> Vec<Finding> {
    tools
        .iter()
        .map(|tool| {
            let tool = tool.as_ref();
            let (group, package) = classify(tool);
            lookup(group, tool, package, true)
        })
        .collect()
}

/// Group and providing package of `tool`, matched on its file name suffix
/// so prefixed cross tools resolve too.
fn classify(tool: &str) -> (Group, Option<&'static str>) {
    let name = Path::new(tool)
        .file_name()
        .map_or(tool, |n| n.to_str().unwrap_or(tool));
    let known = |table: &[(&str, &'static str)]| {
        table
            .iter()
            .find(|(t, _)| name.ends_with(t))
            .map(|&(_, package)| package)
    };

    if let Some(package) = known(BUILD_TOOLS) {
        return (Group::Build, Some(package));
    }
    if let Some(package) = known(INITRAMFS_TOOLS) {
        return (Group::Initramfs, Some(package));
    }
    match COMPRESSORS.iter().find(|c| c.program() == name) {
        Some(c) => (Group::Compressor, Some(c.package)),
        None => (Group::Build, None),
    }
}

fn lookup(group: Group, tool: &str, package: Option<&'static str>, blocking: bool) -> Finding {
    Finding::tool(group, tool, process::which(tool), package, blocking)
}
