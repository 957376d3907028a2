//! External command execution behind an injectable [`Runner`].
//!
//! All interaction with `make`, `ebuild`, `emerge`, `portageq` and the
//! archiving tools goes through a [`Cmd`] handed to a [`Runner`]. The real
//! implementation spawns processes; tests substitute a scripted one.
//! Environment variables are carried per command and never written to the
//! process environment.

use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use crate::error::{Error, PathContext, Result};

/// Captured result of a command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code, or `None` if terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }
}

/// Capability for running external commands.
pub trait Runner {
    /// Run to completion, capturing stdout and stderr.
    fn output(&self, cmd: &Cmd) -> io::Result<CommandOutput>;

    /// Run with the terminal attached. Returns the exit code.
    fn interactive(&self, cmd: &Cmd) -> io::Result<Option<i32>>;

    /// Run `stages` connected stdout-to-stdin, inside `dir`, writing the last
    /// stage's stdout to `sink`. Returns each stage's exit code in order.
    fn pipeline(&self, stages: &[Cmd], dir: &Path, sink: &Path) -> io::Result<Vec<Option<i32>>>;
}

/// Builder for one external command invocation.
#[derive(Debug, Clone)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    current_dir: Option<PathBuf>,
    allow_fail: bool,
    discard_stderr: bool,
    error_prefix: Option<String>,
}

impl Cmd {
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
            env: BTreeMap::new(),
            current_dir: None,
            allow_fail: false,
            discard_stderr: false,
            error_prefix: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_string());
        }
        self
    }

    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    /// Set one environment variable for this invocation only.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.env
            .insert(key.as_ref().to_string(), value.as_ref().to_string());
        self
    }

    pub fn envs<'a, I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (k, v) in vars {
            self.env.insert(k.clone(), v.clone());
        }
        self
    }

    pub fn dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    /// Allow non-zero exit codes without failing.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    /// Send stderr to /dev/null when not capturing.
    pub fn discard_stderr(mut self) -> Self {
        self.discard_stderr = true;
        self
    }

    pub fn error_msg(mut self, msg: impl AsRef<str>) -> Self {
        self.error_prefix = Some(msg.as_ref().to_string());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn get_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    /// Program and arguments joined with spaces, for messages.
    pub fn display(&self) -> String {
        let mut s = self.program.clone();
        for arg in &self.args {
            s.push(' ');
            s.push_str(arg);
        }
        s
    }

    /// Run and capture output. Fails on non-zero exit unless `allow_fail`.
    pub fn run(&self, runner: &dyn Runner) -> Result<CommandOutput> {
        tracing::debug!(command = %self.display(), dir = ?self.current_dir, "running");
        let output = runner.output(self).map_err(|source| Error::Spawn {
            program: self.program.clone(),
            source,
        })?;
        tracing::trace!(stdout = %output.stdout, stderr = %output.stderr, "captured");

        if !self.allow_fail && !output.success() {
            return Err(self.failure(output.code, output.stderr_trimmed()));
        }
        Ok(output)
    }

    /// Run with inherited stdio. Use for long-running steps such as kernel
    /// compiles where the user should see progress.
    pub fn run_interactive(&self, runner: &dyn Runner) -> Result<Option<i32>> {
        tracing::debug!(command = %self.display(), dir = ?self.current_dir, "running interactively");
        let code = runner.interactive(self).map_err(|source| Error::Spawn {
            program: self.program.clone(),
            source,
        })?;

        if !self.allow_fail && code != Some(0) {
            return Err(self.failure(code, ""));
        }
        Ok(code)
    }

    fn failure(&self, code: Option<i32>, stderr: &str) -> Error {
        let prefix = self
            .error_prefix
            .clone()
            .unwrap_or_else(|| format!("'{}' failed", self.display()));
        let code_str = code.map_or_else(|| "signal".to_string(), |c| c.to_string());
        let message = if stderr.is_empty() {
            format!("{} (exit code {})", prefix, code_str)
        } else {
            format!("{} (exit code {}):\n{}", prefix, code_str, stderr)
        };
        Error::ExternalTool {
            program: self.program.clone(),
            code,
            message,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.envs(&self.env);
        if let Some(ref dir) = self.current_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

/// Run a chain of commands `a | b | c > sink` in `dir`, failing if any stage
/// exits unsuccessfully.
pub fn pipeline(runner: &dyn Runner, stages: &[Cmd], dir: &Path, sink: &Path) -> Result<()> {
    let description = stages
        .iter()
        .map(Cmd::display)
        .collect::<Vec<_>>()
        .join(" | ");
    tracing::debug!(pipeline = %description, dir = %dir.display(), sink = %sink.display(), "running");

    let codes = runner.pipeline(stages, dir, sink).map_err(|source| Error::Spawn {
        program: description.clone(),
        source,
    })?;

    let failed: Vec<(&Cmd, Option<i32>)> = stages
        .iter()
        .zip(codes)
        .filter(|(_, code)| *code != Some(0))
        .collect();
    // An upstream stage killed by SIGPIPE is a symptom of a later failure
    let culprit = failed
        .iter()
        .rev()
        .find(|(_, code)| code.is_some())
        .or_else(|| failed.first());
    match culprit {
        Some((stage, code)) => Err(stage.failure(*code, "")),
        None => Ok(()),
    }
}

// =============================================================================
// Real process spawning
// =============================================================================

/// [`Runner`] that spawns real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl Runner for SystemRunner {
    fn output(&self, cmd: &Cmd) -> io::Result<CommandOutput> {
        let output = cmd.command().stdin(Stdio::null()).output()?;
        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn interactive(&self, cmd: &Cmd) -> io::Result<Option<i32>> {
        let mut command = cmd.command();
        command.stdin(Stdio::inherit()).stdout(Stdio::inherit());
        if cmd.discard_stderr {
            command.stderr(Stdio::null());
        } else {
            command.stderr(Stdio::inherit());
        }
        Ok(command.status()?.code())
    }

    fn pipeline(&self, stages: &[Cmd], dir: &Path, sink: &Path) -> io::Result<Vec<Option<i32>>> {
        let sink_file = File::create(sink)?;
        let mut children: Vec<Child> = Vec::with_capacity(stages.len());
        let mut upstream: Option<Stdio> = None;

        for (i, stage) in stages.iter().enumerate() {
            let mut command = stage.command();
            command.current_dir(dir);
            command.stdin(upstream.take().unwrap_or_else(Stdio::null));
            if i + 1 == stages.len() {
                command.stdout(sink_file.try_clone()?);
            } else {
                command.stdout(Stdio::piped());
            }
            if stage.discard_stderr {
                command.stderr(Stdio::null());
            }

            let mut child = match command.spawn() {
                Ok(child) => child,
                Err(e) => {
                    for mut started in children {
                        let _ = started.kill();
                        let _ = started.wait();
                    }
                    return Err(e);
                }
            };
            upstream = child.stdout.take().map(Stdio::from);
            children.push(child);
        }

        let mut codes = Vec::with_capacity(children.len());
        for mut child in children {
            codes.push(child.wait()?.code());
        }
        Ok(codes)
    }
}

/// Check if a program exists in PATH.
pub fn which(program: &str) -> Option<PathBuf> {
    which::which(program).ok()
}

/// Size in bytes of a pipeline's output file.
pub fn sink_len(sink: &Path) -> Result<u64> {
    Ok(std::fs::metadata(sink).with_path(sink)?.len())
}

// =============================================================================
// Tests
// =============================================================================
