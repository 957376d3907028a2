//! Preflight findings, grouped by the build stage that needs them.

use std::collections::BTreeSet;
use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;

/// Build stage a finding belongs to. Reports list groups in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Group {
    /// Compiling, packaging and installing the kernel.
    Build,
    /// Archiving an initramfs.
    Initramfs,
    /// Compressing the kernel image or initramfs.
    Compressor,
    /// Directories and sources.
    Environment,
}

impl Group {
    pub fn title(self) -> &'static str {
        match self {
            Group::Build => "Build tools",
            Group::Initramfs => "Initramfs tools",
            Group::Compressor => "Compressors",
            Group::Environment => "Environment",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Program found on PATH.
    Found(PathBuf),
    /// Program not on PATH. `package` provides it when known.
    Missing { package: Option<&'static str> },
    Ready(String),
    Problem(String),
}

/// One checked program or environment condition.
#[derive(Debug, Clone)]
pub struct Finding {
    pub group: Group,
    pub subject: String,
    pub outcome: Outcome,
    /// A failed blocking finding stops the build; others are warnings.
    pub blocking: bool,
}

impl Finding {
    /// A program lookup: `path` is where it was found, if anywhere.
    pub fn tool(
        group: Group,
        program: &str,
        path: Option<PathBuf>,
        package: Option<&'static str>,
        blocking: bool,
    ) -> Self {
        let outcome = match path {
            Some(path) => Outcome::Found(path),
            None => Outcome::Missing { package },
        };
        Self {
            group,
            subject: program.to_string(),
            outcome,
            blocking,
        }
    }

    pub fn environment(
        subject: &str,
        result: std::result::Result<String, String>,
        blocking: bool,
    ) -> Self {
        let outcome = match result {
            Ok(detail) => Outcome::Ready(detail),
            Err(problem) => Outcome::Problem(problem),
        };
        Self {
            group: Group::Environment,
            subject: subject.to_string(),
            outcome,
            blocking,
        }
    }

    pub fn passed(&self) -> bool {
        matches!(self.outcome, Outcome::Found(_) | Outcome::Ready(_))
    }

    pub fn is_blocking_failure(&self) -> bool {
        self.blocking && !self.passed()
    }

    pub fn is_warning(&self) -> bool {
        !self.blocking && !self.passed()
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.passed() {
            "ok  "
        } else if self.blocking {
            "FAIL"
        } else {
            "warn"
        };
        write!(f, "{} {}: ", mark, self.subject)?;
        match &self.outcome {
            Outcome::Found(path) => write!(f, "{}", path.display()),
            Outcome::Missing { package: Some(package) } => {
                write!(f, "not on PATH (provided by {})", package)
            }
            Outcome::Missing { package: None } => write!(f, "not on PATH"),
            Outcome::Ready(detail) | Outcome::Problem(detail) => write!(f, "{}", detail),
        }
    }
}

/// Findings of one preflight run, in group order.
#[derive(Debug, Clone)]
pub struct PreflightReport {
    findings: Vec<Finding>,
}

impl PreflightReport {
    pub fn new(mut findings: Vec<Finding>) -> Self {
        findings.sort_by_key(|f| f.group);
        Self { findings }
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    /// True when nothing blocks the build.
    pub fn is_ready(&self) -> bool {
        self.blocking().next().is_none()
    }

    pub fn blocking(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.is_blocking_failure())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.is_warning())
    }

    /// Known packages providing the missing programs, sorted and deduplicated.
    pub fn missing_packages(&self) -> Vec<&'static str> {
        self.findings
            .iter()
            .filter_map(|f| match f.outcome {
                Outcome::Missing { package } => package,
                _ => None,
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn write_to(&self, out: &mut dyn Write) -> io::Result<()> {
        let mut current = None;
        for finding in &self.findings {
            if current != Some(finding.group) {
                if current.is_some() {
                    writeln!(out)?;
                }
                writeln!(out, "{}:", finding.group.title())?;
                current = Some(finding.group);
            }
            writeln!(out, "  {}", finding)?;
        }
        if current.is_some() {
            writeln!(out)?;
        }

        let passed = self.findings.iter().filter(|f| f.passed()).count();
        writeln!(out, "{} of {} checks passed", passed, self.findings.len())?;
        let blocking = self.blocking().count();
        if blocking > 0 {
            writeln!(out, "{} blocking the build", blocking)?;
        }
        let warnings = self.warnings().count();
        if warnings > 0 {
            writeln!(out, "{} needed only by some kernel configurations", warnings)?;
        }

        let packages = self.missing_packages();
        if !packages.is_empty() {
            writeln!(out, "Install with: emerge --ask --noreplace {}", packages.join(" "))?;
        }
        Ok(())
    }
}
