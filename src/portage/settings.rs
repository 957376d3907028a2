//! Package-manager settings, queried through `portageq`.
//!
//! Two outputs are parsed:
//!
//! `portageq envvar -v ARCH MAKEOPTS ...` prints shell assignments:
//!
//! ```text
//! ARCH=amd64
//! MAKEOPTS="-j8 -l8"
//! ```
//!
//! `portageq repos_config <root>` prints an INI document, one section per
//! repository:
//!
//! ```text
//! [DEFAULT]
//! main-repo = gentoo
//!
//! [gentoo]
//! location = /var/db/repos/gentoo
//! priority = -1000
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::process::{Cmd, Runner};

const QUERIED_VARS: &[&str] = &["ARCH", "MAKEOPTS", "PORTAGE_TMPDIR", "FEATURES", "EROOT"];
const DEFAULT_TMPDIR: &str = "/var/tmp";

/// A repository (overlay) known to the package manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub name: String,
    pub location: PathBuf,
    pub priority: i32,
}

#[derive(Debug, Clone, Default)]
pub struct PortageSettings {
    /// Package-manager architecture keyword (e.g. `amd64`).
    pub arch: Option<String>,
    pub makeopts: Vec<String>,
    pub tmpdir: PathBuf,
    pub features: Vec<String>,
    /// Effective installation root.
    pub root: PathBuf,
    /// Repositories, lowest priority first.
    pub repositories: Vec<Repository>,
    /// Environment for every package-manager invocation.
    pub env: BTreeMap<String, String>,
}

impl PortageSettings {
    /// Query settings, optionally for an alternate installation root.
    pub fn load(runner: &dyn Runner, root: Option<&Path>) -> Result<Self> {
        let mut env = BTreeMap::new();
        if let Some(root) = root {
            env.insert("ROOT".to_string(), root.display().to_string());
        }

        let output = Cmd::new("portageq")
            .args(["envvar", "-v"])
            .args(QUERIED_VARS)
            .envs(&env)
            .error_msg("Failed to query Portage settings")
            .run(runner)?;
        let vars = parse_envvars(&output.stdout)?;

        let eroot = vars
            .get("EROOT")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| root.map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("/"));

        let output = Cmd::new("portageq")
            .arg("repos_config")
            .arg_path(&eroot)
            .envs(&env)
            .error_msg("Failed to query Portage repositories")
            .run(runner)?;
        let repositories = parse_repos_config(&output.stdout);

        let mut settings = Self::from_vars(&vars, eroot, repositories);
        settings.env = env;
        Ok(settings)
    }

    /// Build settings from already-parsed variables.
    pub fn from_vars(
        vars: &BTreeMap<String, String>,
        root: PathBuf,
        mut repositories: Vec<Repository>,
    ) -> Self {
        repositories.sort_by_key(|r| r.priority);
        let words = |key: &str| -> Vec<String> {
            vars.get(key)
                .and_then(|v| shell_words::split(v).ok())
                .unwrap_or_default()
        };

        Self {
            arch: vars.get("ARCH").filter(|v| !v.is_empty()).cloned(),
            makeopts: words("MAKEOPTS"),
            tmpdir: vars
                .get("PORTAGE_TMPDIR")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TMPDIR)),
            features: words("FEATURES"),
            root,
            repositories,
            env: BTreeMap::new(),
        }
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }

    /// The named repository, or the highest-priority one when `name` is
    /// `None`.
    pub fn repository(&self, name: Option<&str>) -> Result<&Repository> {
        let found = match name {
            Some(name) => self.repositories.iter().find(|r| r.name == name),
            None => self.repositories.last(),
        };
        found.ok_or_else(|| Error::Overlay(name.unwrap_or("(none configured)").to_string()))
    }
}

/// Parse `NAME=value` lines from `portageq envvar -v`.
pub fn parse_envvars(output: &str) -> Result<BTreeMap<String, String>> {
    let mut vars = BTreeMap::new();
    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        let parsed = line.split_once('=').and_then(|(name, value)| {
            let words = shell_words::split(value).ok()?;
            Some((name.trim().to_string(), words.join(" ")))
        });
        match parsed {
            Some((name, value)) if !name.is_empty() => {
                vars.insert(name, value);
            }
            _ => {
                return Err(Error::UnexpectedOutput {
                    command: "portageq envvar".to_string(),
                    output: output.to_string(),
                })
            }
        }
    }
    Ok(vars)
}

/// Parse the INI dump of `portageq repos_config`. Sections without a
/// location are skipped; a missing priority counts as 0.
pub fn parse_repos_config(output: &str) -> Vec<Repository> {
    let mut repos = Vec::new();
    let mut current: Option<(String, Option<PathBuf>, i32)> = None;

    let mut flush = |current: &mut Option<(String, Option<PathBuf>, i32)>| {
        if let Some((name, Some(location), priority)) = current.take() {
            repos.push(Repository {
                name,
                location,
                priority,
            });
        }
    };

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            flush(&mut current);
            if section != "DEFAULT" {
                current = Some((section.to_string(), None, 0));
            }
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        if let Some((_, location, priority)) = current.as_mut() {
            match key.trim() {
                "location" => *location = Some(PathBuf::from(value.trim())),
                "priority" => *priority = value.trim().parse().unwrap_or(0),
                _ => {}
            }
        }
    }
    flush(&mut current);
    repos
}
