//! Shared test utilities for kernel-gen tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use kernel_gen::process::{Cmd, CommandOutput, Runner};
use tempfile::TempDir;
use walkdir::WalkDir;

// =============================================================================
// Scripted runner
// =============================================================================

type Handler = Box<dyn Fn(&Cmd) -> Option<CommandOutput>>;

/// A pipeline as the runner saw it.
#[derive(Debug, Clone)]
pub struct PipelineCall {
    pub stages: Vec<String>,
    pub dir: PathBuf,
    /// Files present under `dir` when the pipeline ran.
    pub files: Vec<String>,
    pub sink: PathBuf,
}

/// [`Runner`] that spawns nothing. Commands are answered by handlers,
/// later handlers taking precedence; unmatched commands succeed silently.
#[derive(Default)]
pub struct ScriptedRunner {
    handlers: Vec<Handler>,
    calls: RefCell<Vec<Cmd>>,
    interactive_calls: RefCell<Vec<Cmd>>,
    pipelines: RefCell<Vec<PipelineCall>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `program ... arg ...` with `stdout`.
    pub fn on(self, program: &str, arg: &str, stdout: &str) -> Self {
        let stdout = stdout.to_string();
        self.on_call(program, arg, move |_| CommandOutput::ok(stdout.clone()))
    }

    /// Make `program ... arg ...` exit with `code`.
    pub fn on_fail(self, program: &str, arg: &str, code: i32) -> Self {
        let stderr = format!("{} failed", arg);
        self.on_call(program, arg, move |_| CommandOutput {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.clone(),
        })
    }

    /// Answer `program ... arg ...` by calling `f`, which may also have side
    /// effects such as creating files.
    pub fn on_call<F>(mut self, program: &str, arg: &str, f: F) -> Self
    where
        F: Fn(&Cmd) -> CommandOutput + 'static,
    {
        let program = program.to_string();
        let arg = arg.to_string();
        self.handlers.push(Box::new(move |cmd: &Cmd| {
            let program_matches = cmd.program() == program
                || Path::new(cmd.program()).file_name().is_some_and(|n| n == program.as_str());
            let arg_matches = arg.is_empty() || cmd.get_args().iter().any(|a| *a == arg);
            (program_matches && arg_matches).then(|| f(cmd))
        }));
        self
    }

    fn answer(&self, cmd: &Cmd) -> CommandOutput {
        self.handlers
            .iter()
            .rev()
            .find_map(|h| h(cmd))
            .unwrap_or_else(|| CommandOutput::ok(""))
    }

    /// Every captured and interactive command, in order, as display strings.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().iter().map(Cmd::display).collect()
    }

    pub fn commands(&self) -> Vec<Cmd> {
        self.calls.borrow().clone()
    }

    pub fn interactive_calls(&self) -> Vec<Cmd> {
        self.interactive_calls.borrow().clone()
    }

    pub fn pipelines(&self) -> Vec<PipelineCall> {
        self.pipelines.borrow().clone()
    }

    /// Commands run as `program` with `arg` among their arguments.
    pub fn find(&self, program: &str, arg: &str) -> Vec<Cmd> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.program().ends_with(program) && c.get_args().iter().any(|a| a == arg))
            .cloned()
            .collect()
    }

    pub fn called(&self, program: &str, arg: &str) -> bool {
        !self.find(program, arg).is_empty()
    }
}

impl Runner for ScriptedRunner {
    fn output(&self, cmd: &Cmd) -> io::Result<CommandOutput> {
        self.calls.borrow_mut().push(cmd.clone());
        Ok(self.answer(cmd))
    }

    fn interactive(&self, cmd: &Cmd) -> io::Result<Option<i32>> {
        self.calls.borrow_mut().push(cmd.clone());
        self.interactive_calls.borrow_mut().push(cmd.clone());
        Ok(self.answer(cmd).code)
    }

    fn pipeline(&self, stages: &[Cmd], dir: &Path, sink: &Path) -> io::Result<Vec<Option<i32>>> {
        fs::write(sink, b"070701")?;
        self.pipelines.borrow_mut().push(PipelineCall {
            stages: stages.iter().map(Cmd::display).collect(),
            dir: dir.to_path_buf(),
            files: list_files(dir),
            sink: sink.to_path_buf(),
        });
        Ok(vec![Some(0); stages.len()])
    }
}

/// Files below `dir`, relative and sorted.
pub fn list_files(dir: &Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| !e.file_type().is_dir())
        .filter_map(|e| {
            e.path()
                .strip_prefix(dir)
                .ok()
                .map(|p| p.to_string_lossy().into_owned())
        })
        .collect();
    files.sort();
    files
}

// =============================================================================
// Test environment
// =============================================================================

/// A fake system: installation root with a package database, a kernel
/// source tree, an overlay and a Portage temporary directory.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    pub root: PathBuf,
    pub vdb: PathBuf,
    pub source: PathBuf,
    pub overlay: PathBuf,
    pub portage_tmpdir: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base = temp_dir.path();

        let root = base.join("root");
        let vdb = root.join("var/db/pkg");
        let source = base.join("linux");
        let overlay = base.join("overlay");
        let portage_tmpdir = base.join("var-tmp");

        for dir in [&vdb, &source, &overlay, &portage_tmpdir] {
            fs::create_dir_all(dir).expect("Failed to create test dir");
        }
        fs::write(source.join("Makefile"), "VERSION = 5\n").expect("Failed to create Makefile");
        fs::write(source.join("System.map"), "ffffffff81000000 T _text\n")
            .expect("Failed to create System.map");

        Self {
            _temp_dir: temp_dir,
            root,
            vdb,
            source,
            overlay,
            portage_tmpdir,
        }
    }

    /// Write `.config` for `version` with the given option lines.
    pub fn write_config(&self, version: &str, options: &[&str]) -> PathBuf {
        let mut content = format!(
            "#\n# Automatically generated file; DO NOT EDIT.\n# Linux/x86 {} Kernel Configuration\n#\n",
            version
        );
        for option in options {
            content.push_str(option);
            content.push('\n');
        }
        let path = self.source.join(".config");
        fs::write(&path, content).expect("Failed to write .config");
        path
    }

    pub fn image_path(&self) -> PathBuf {
        self.source.join("arch/x86/boot/bzImage")
    }

    /// Create the kernel image.
    pub fn write_image(&self) -> PathBuf {
        let image = self.image_path();
        fs::create_dir_all(image.parent().unwrap()).expect("Failed to create boot dir");
        fs::write(&image, "bzImage").expect("Failed to write image");
        image
    }

    /// Record an installed package in the package database.
    pub fn add_package(&self, category: &str, pf: &str, slot: &str, contents: &[&str]) -> PathBuf {
        let dir = self.vdb.join(category).join(pf);
        fs::create_dir_all(&dir).expect("Failed to create package dir");
        let mut manifest = contents.join("\n");
        manifest.push('\n');
        fs::write(dir.join("CONTENTS"), manifest).expect("Failed to write CONTENTS");
        fs::write(dir.join("SLOT"), format!("{}\n", slot)).expect("Failed to write SLOT");
        dir
    }

    /// Where the fake `ebuild` puts the image directory of `pf`.
    pub fn ebuild_image_dir(&self, pf: &str) -> PathBuf {
        self.portage_tmpdir
            .join("portage/sys-kernel")
            .join(pf)
            .join("image")
    }

    /// `portageq envvar -v` output for this environment.
    pub fn envvars(&self, features: &str) -> String {
        format!(
            "ARCH=\"amd64\"\nMAKEOPTS=\"-j2\"\nPORTAGE_TMPDIR=\"{}\"\nFEATURES=\"{}\"\nEROOT=\"{}\"\n",
            self.portage_tmpdir.display(),
            features,
            self.root.display()
        )
    }

    /// `portageq repos_config` output with `gentoo` and `local` (the
    /// overlay, highest priority).
    pub fn repos_config(&self) -> String {
        format!(
            "[DEFAULT]\nmain-repo = gentoo\n\n[gentoo]\nlocation = {}\npriority = -1000\n\n[local]\nlocation = {}\npriority = 50\n",
            self._temp_dir.path().join("gentoo").display(),
            self.overlay.display()
        )
    }

    /// A runner that behaves like a configured system with a
    /// `version`/`release` kernel in [`TestEnv::source`].
    pub fn runner(&self, version: &str, release: &str) -> ScriptedRunner {
        let version = format!("{}\n", version);
        let release = format!("{}\n", release);
        let tmpdir = self.portage_tmpdir.clone();

        ScriptedRunner::new()
            // The default build target: creates the image if make would
            .on_call("make", "--quiet", |cmd| {
                let is_build = cmd.get_args().last().is_some_and(|a| a == "--quiet");
                if let (true, Some(src)) = (is_build, directory_arg(cmd)) {
                    let image = src.join("arch/x86/boot/bzImage");
                    if !image.exists() {
                        write_file(&image, "bzImage");
                    }
                }
                CommandOutput::ok("")
            })
            .on("portageq", "envvar", &self.envvars("sandbox"))
            .on("portageq", "repos_config", &self.repos_config())
            .on("make", "kernelversion", &version)
            .on("make", "kernelrelease", &release)
            .on("make", "image_name", "arch/x86/boot/bzImage\n")
            .on_call("make", "modules_install", |cmd| {
                if let Some(dest) = install_mod_path(cmd) {
                    let kernel = dest.join("lib/modules/5.10.5/kernel");
                    write_file(&kernel.join("drivers/ata/ahci.ko"), "");
                    write_file(&kernel.join("sound/core/snd.ko"), "");
                    write_file(&dest.join("lib/modules/5.10.5/modules.dep"), "");
                }
                CommandOutput::ok("")
            })
            .on_call("ebuild", "install", move |cmd| {
                let ebuild = PathBuf::from(&cmd.get_args()[0]);
                let pf = ebuild
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let image = tmpdir.join("portage/sys-kernel").join(&pf).join("image");
                fs::create_dir_all(&image).expect("Failed to create image dir");
                CommandOutput::ok(format!(
                    ">>> Install {} into {}\nKERNEL-GEN: D={}/\n>>> Completed installing {}\n",
                    pf,
                    image.display(),
                    image.display(),
                    pf
                ))
            })
    }
}

/// The `--directory` argument of a make invocation.
pub fn directory_arg(cmd: &Cmd) -> Option<PathBuf> {
    let args = cmd.get_args();
    args.iter()
        .position(|a| a == "--directory")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
}

/// The `INSTALL_MOD_PATH=` argument of a make invocation.
pub fn install_mod_path(cmd: &Cmd) -> Option<PathBuf> {
    cmd.get_args()
        .iter()
        .find_map(|a| a.strip_prefix("INSTALL_MOD_PATH="))
        .map(PathBuf::from)
}

pub fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent dir");
    }
    fs::write(path, content).expect("Failed to write file");
}

/// Create an executable script.
pub fn write_script(path: &Path, content: &str) {
    write_file(path, content);
    let mut perms = fs::metadata(path).expect("Failed to get metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("Failed to set permissions");
}

/// Shift a file's modification time relative to now.
pub fn set_mtime_offset(path: &Path, offset_secs: i64) {
    let now = SystemTime::now();
    let time = if offset_secs >= 0 {
        now + Duration::from_secs(offset_secs as u64)
    } else {
        now - Duration::from_secs(offset_secs.unsigned_abs())
    };
    fs::File::options()
        .append(true)
        .open(path)
        .expect("Failed to open file")
        .set_modified(time)
        .expect("Failed to set mtime");
}

pub fn mtime(path: &Path) -> SystemTime {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .expect("Failed to read mtime")
}

/// Assert that a symlink exists and points to the expected target.
pub fn assert_symlink(path: &Path, expected_target: &str) {
    assert!(
        path.is_symlink(),
        "Expected symlink at {}, but it's not a symlink",
        path.display()
    );
    let target = fs::read_link(path).expect("Failed to read symlink");
    assert_eq!(
        target.to_string_lossy(),
        expected_target,
        "Symlink {} points to wrong target",
        path.display()
    );
}

/// Assert that a file exists.
pub fn assert_file_exists(path: &Path) {
    assert!(path.is_file(), "Expected file at {}", path.display());
}
