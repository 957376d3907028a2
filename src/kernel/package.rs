//! Binary package identity derived from the kernel version.
//!
//! `<version>[-<extra>][(-r|_p)<revision>]` maps to
//! `sys-kernel/<extra or "vanilla"><CONFIG_LOCALVERSION>-bin-<version><revision>`:
//!
//! | kernel version     | package                          |
//! |--------------------|----------------------------------|
//! | `5.10.5`           | `sys-kernel/vanilla-bin-5.10.5`  |
//! | `5.10.5-gentoo-r1` | `sys-kernel/gentoo-bin-5.10.5-r1`|

use std::fmt;

use crate::error::{Error, Result};

pub const CATEGORY: &str = "sys-kernel";
const FALLBACK_NAME: &str = "vanilla";
const BINARY_SUFFIX: &str = "-bin";

/// Template for the throwaway ebuild. Its install phase only reports the
/// image directory, which is then filled in from outside.
pub const EBUILD_TEMPLATE: &str = r#"
EAPI=5

SLOT="${PVR}"
DESCRIPTION="Linux kernel image and modules"
HOMEPAGE="http://www.kernel.org"
LICENSE="GPL-2"

inherit mount-boot

KEYWORDS="${ARCH}"
# Avoid stripping kernel binaries.
RESTRICT="strip"

S="${WORKDIR}"

src_install() {
	echo "KERNEL-GEN: D=${D}"
}
"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageName {
    pub category: String,
    pub name: String,
    pub version: String,
}

impl PackageName {
    pub fn from_kernel_version(kernel_version: &str, local_version: Option<&str>) -> Result<Self> {
        let parts = split_version(kernel_version).ok_or_else(|| {
            Error::configuration(format!(
                "Unrecognized kernel version '{}'",
                kernel_version
            ))
        })?;

        let mut name = if parts.extra.is_empty() {
            FALLBACK_NAME.to_string()
        } else {
            parts.extra.to_string()
        };
        if let Some(local) = local_version.filter(|l| !l.is_empty()) {
            name.push_str(local);
        }
        name.push_str(BINARY_SUFFIX);

        Ok(Self {
            category: CATEGORY.to_string(),
            name,
            version: format!("{}{}", parts.numeric, parts.revision),
        })
    }

    /// `category/name`
    pub fn key(&self) -> String {
        format!("{}/{}", self.category, self.name)
    }

    /// `=category/name-version`, for exact-version package-manager requests.
    pub fn exact_atom(&self) -> String {
        format!("={}", self)
    }

    pub fn ebuild_file_name(&self) -> String {
        format!("{}-{}.ebuild", self.name, self.version)
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}-{}", self.category, self.name, self.version)
    }
}

#[derive(Debug, PartialEq, Eq)]
struct VersionParts<'a> {
    numeric: &'a str,
    extra: &'a str,
    revision: &'a str,
}

fn split_version(version: &str) -> Option<VersionParts<'_>> {
    // Leading dotted numeric core, ending on a digit
    let mut end = 0;
    let bytes = version.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b.is_ascii_digit() {
            end = i + 1;
        } else if b == b'.' && end == i && i + 1 < bytes.len() && bytes[i + 1].is_ascii_digit() {
            continue;
        } else {
            break;
        }
    }
    if end == 0 {
        return None;
    }
    let numeric = &version[..end];
    let mut rest = &version[end..];

    let mut revision = "";
    if let Some(pos) = revision_start(rest) {
        revision = &rest[pos..];
        rest = &rest[..pos];
    }
    let extra = rest.strip_prefix('-').unwrap_or(rest);

    Some(VersionParts {
        numeric,
        extra,
        revision,
    })
}

/// Start of a trailing `-rN` or `_pN`.
fn revision_start(s: &str) -> Option<usize> {
    let digits = s.len() - s.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    let head = &s[..s.len() - digits];
    if head.ends_with("-r") || head.ends_with("_p") {
        Some(head.len() - 2)
    } else {
        None
    }
}
