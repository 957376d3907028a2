//! Kernel `.config` reader.
//!
//! A configured kernel's `.config` starts with a header naming the version
//! it was generated for, in one of two forms:
//!
//! ```text
//! # Linux/x86 5.10.0 Kernel Configuration
//! # Linux kernel version: 2.6.34
//! ```
//!
//! The header must appear within the first [`HEADER_WINDOW`] lines and name
//! the expected version. After it, `NAME=value` lines are decoded:
//!
//! | value   | stored as                 |
//! |---------|---------------------------|
//! | `y`     | [`ConfigValue::Enabled`]  |
//! | `n`,`m` | not stored                |
//! | `"s"`   | `Text("s")`               |
//! | other   | `Text(other)`             |
//!
//! Modules count as "not built-in": every feature check in this crate asks
//! whether something is compiled into the image, so `m` and `n` look the same.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{Error, PathContext, Result};

/// Number of leading lines searched for the version header.
pub const HEADER_WINDOW: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    Enabled,
    Text(String),
}

/// Why a `.config` was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    /// No version header in the first lines.
    NotConfigured,
    /// Header present, for another kernel version.
    VersionMismatch { found: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KernelConfig {
    options: BTreeMap<String, ConfigValue>,
}

impl KernelConfig {
    /// Read `path`, requiring a header for `expected_version`.
    pub fn load(path: &Path, expected_version: &str) -> Result<Self> {
        let content = fs::read_to_string(path).with_path(path)?;
        let source_dir = path.parent().unwrap_or(Path::new("."));

        Self::parse(&content, expected_version).map_err(|e| match e {
            HeaderError::NotConfigured => Error::configuration(format!(
                "This kernel needs to be configured first. Try:\n  make -C '{}' menuconfig",
                source_dir.display()
            )),
            HeaderError::VersionMismatch { found } => Error::configuration(format!(
                "{} was generated for Linux {}, but the source tree is {}. Try:\n  make -C '{}' oldconfig",
                path.display(),
                found,
                expected_version,
                source_dir.display()
            )),
        })
    }

    pub fn parse(content: &str, expected_version: &str) -> std::result::Result<Self, HeaderError> {
        let mut options = BTreeMap::new();
        let mut header_found = false;

        for (index, line) in content.lines().enumerate() {
            let line = line.trim_end();

            if !header_found {
                if index >= HEADER_WINDOW {
                    break;
                }
                if let Some(version) = header_version(line) {
                    if version != expected_version {
                        return Err(HeaderError::VersionMismatch {
                            found: version.to_string(),
                        });
                    }
                    header_found = true;
                }
                continue;
            }

            if line.starts_with('#') {
                continue;
            }
            if let Some((name, value)) = parse_assignment(line) {
                options.insert(name.to_string(), value);
            }
        }

        if !header_found {
            return Err(HeaderError::NotConfigured);
        }
        Ok(Self { options })
    }

    pub fn get(&self, name: &str) -> Option<&ConfigValue> {
        self.options.get(name)
    }

    /// True if `name` is built in (`=y`) or has a value.
    pub fn contains(&self, name: &str) -> bool {
        self.options.contains_key(name)
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        matches!(self.options.get(name), Some(ConfigValue::Enabled))
    }

    /// A string option's value; empty strings count as unset.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.options.get(name) {
            Some(ConfigValue::Text(s)) if !s.is_empty() => Some(s),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}

/// The version named by a header line, if `line` is one.
fn header_version(line: &str) -> Option<&str> {
    // "# Linux/x86 5.10.0 Kernel Configuration"
    if let Some(rest) = line.strip_prefix("# Linux/") {
        let rest = rest.strip_suffix(" Kernel Configuration")?;
        let (arch, version) = rest.split_once(' ')?;
        if arch.contains(char::is_whitespace) || version.contains(char::is_whitespace) {
            return None;
        }
        return Some(version);
    }
    // "# Linux kernel version: 2.6.34"
    let rest = line.strip_prefix("# Linux kernel version: ")?;
    rest.split_whitespace().next()
}

fn parse_assignment(line: &str) -> Option<(&str, ConfigValue)> {
    let (name, value) = line.split_once('=')?;
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        return None;
    }
    let value = match value {
        "y" => ConfigValue::Enabled,
        "n" | "m" => return None,
        v if v.len() >= 2 && v.starts_with('"') && v.ends_with('"') => {
            ConfigValue::Text(v[1..v.len() - 1].to_string())
        }
        v => ConfigValue::Text(v.to_string()),
    };
    Some((name, value))
}
