//! Kernel binary package generation.
//!
//! A build runs through these steps, in order:
//!
//! ```text
//! prepare        find sources, read .config, pick compressors, name the package
//! build_kernel   rebuild image and modules when .config is newer than the image,
//!                rebuilding out-of-tree module packages first
//! create_ebuild  temporary ebuild in an overlay, run up to `install`
//! package        stage /boot files, modules and initramfs into ${D}, seal it
//! install        merge the kernel and module packages from the binary cache
//! ```
//!
//! [`Generator::create_ebuild`] returns an [`EbuildScaffold`] guard; the
//! ebuild is cleaned and deleted when it goes out of scope, whether or not
//! the later steps succeeded.

pub mod initramfs;

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::common::copy_file_with_dirs;
use crate::error::{Error, PathContext, Result};
use crate::kernel::{compressor, kernel_arch, Compressor, KernelConfig, KernelMake, PackageName};
use crate::portage::{EbuildScaffold, Portage, PortageSettings};
use crate::process::Runner;
use crate::timing::Timer;
use crate::ui::Ui;
use crate::vdb::OutOfTreeEnumerator;

pub use initramfs::InitramfsBuilder;

/// Fallback kernel source location, relative to the root.
pub const DEFAULT_SOURCE_DIR: &str = "usr/src/linux";
/// Default initramfs source location, relative to the root.
pub const DEFAULT_INITRAMFS_DIR: &str = "usr/src/initramfs";

const NO_SOURCE_FOUND: &str = "No suitable kernel source directory could be found; please specify one using\n\
the --source option, or invoke kernel-gen from within a kernel source directory.\n\
Alternatively, keep /usr/src/linux pointing at your current kernel sources\n\
(the symlink USE flag of the kernel source packages does this).";

/// Where the initramfs contents come from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum InitramfsSource {
    #[default]
    Disabled,
    /// `<root>/usr/src/initramfs`, skipped with a warning if missing.
    Default,
    /// An explicit directory, which must exist.
    Path(PathBuf),
}

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Package-manager architecture; defaults to the configured ARCH.
    pub arch: Option<String>,
    /// Kernel source directory; discovered when `None`.
    pub source: Option<PathBuf>,
    pub initramfs: InitramfsSource,
}

/// One kernel package build. See the module docs for the sequence.
pub struct Generator<'r> {
    ui: &'r Ui,
    settings: PortageSettings,
    make: KernelMake<'r>,
    portage: Portage<'r>,
    portage_arch: String,
    kernel_version: String,
    kernel_release: String,
    config_path: PathBuf,
    image_path: PathBuf,
    config: KernelConfig,
    kernel_compressor: Option<&'static Compressor>,
    initramfs_compressor: Option<&'static Compressor>,
    initramfs_source: Option<PathBuf>,
    cross_compile: Option<String>,
    package: PackageName,
    module_packages: Vec<String>,
}

impl<'r> Generator<'r> {
    /// Locate and validate the kernel sources and work out everything the
    /// later steps need.
    pub fn prepare(
        runner: &'r dyn Runner,
        ui: &'r Ui,
        settings: PortageSettings,
        options: &BuildOptions,
    ) -> Result<Self> {
        ui.info("Preparing to build kernel");

        let portage_arch = options
            .arch
            .clone()
            .or_else(|| settings.arch.clone())
            .ok_or_else(|| {
                Error::configuration("Unable to determine the target architecture; use --arch")
            })?;
        let make = KernelMake::new(
            runner,
            settings.makeopts.clone(),
            Path::new("."),
            kernel_arch(&portage_arch),
        );

        let (make, kernel_version) = discover_source(make, &settings.root, options.source.as_deref())?;
        tracing::debug!(source = %make.source_dir().display(), version = %kernel_version, "found kernel sources");

        let config_path = make.source_dir().join(".config");
        let config = KernelConfig::load(&config_path, &kernel_version)?;
        let kernel_release = make.query("kernelrelease")?;

        let kernel_compressor = compressor::for_kernel(&config);
        let image_path = make.source_dir().join(make.query("image_name")?);

        let initramfs_source = resolve_initramfs(ui, &config, &settings.root, &options.initramfs)?;
        let initramfs_compressor = match initramfs_source {
            Some(_) => compressor::for_initramfs(&config, kernel_compressor),
            None => None,
        };

        let cross_compile = config.get_str("CONFIG_CROSS_COMPILE").map(str::to_string);
        let package =
            PackageName::from_kernel_version(&kernel_version, config.get_str("CONFIG_LOCALVERSION"))?;
        let portage = Portage::new(runner, &settings, cross_compile.as_deref());

        Ok(Self {
            ui,
            settings,
            make,
            portage,
            portage_arch,
            kernel_version,
            kernel_release,
            config_path,
            image_path,
            config,
            kernel_compressor,
            initramfs_compressor,
            initramfs_source,
            cross_compile,
            package,
            module_packages: Vec::new(),
        })
    }

    /// Build the kernel image and in-tree modules if `.config` changed since
    /// the image was last built. With `rebuild_modules`, packages owning
    /// out-of-tree modules are rebuilt against the new kernel first.
    pub fn build_kernel(&mut self, rebuild_modules: bool) -> Result<()> {
        self.print_summary();

        if self.settings.has_feature("distcc") {
            self.enable_distcc()?;
        }

        if !self.needs_build()? {
            self.ui.info(format!(
                "linux-{} is up to date, not rebuilding",
                self.kernel_release
            ));
            return Ok(());
        }

        if rebuild_modules {
            self.rebuild_out_of_tree_modules()?;
        }

        self.ui.info("Building kernel image and in-tree modules");
        let timer = Timer::start("Kernel build");
        self.make.build()?;
        timer.finish(self.ui);

        // make leaves the image alone when nothing relevant changed
        touch(&self.image_path)?;
        Ok(())
    }

    /// True if the image is missing or older than `.config`.
    pub fn needs_build(&self) -> Result<bool> {
        image_is_stale(&self.config_path, &self.image_path)
    }

    /// Write the temporary ebuild into `overlay` (default: highest priority)
    /// and run it up to `install`.
    pub fn create_ebuild(&self, overlay: Option<&str>) -> Result<EbuildScaffold<'_>> {
        let repository = self.settings.repository(overlay)?;
        EbuildScaffold::create(&self.portage, self.ui, repository, &self.package)
    }

    /// Fill the scaffold's image directory and create the binary package.
    /// With `listing_dir`, a listing of the initramfs is dumped there.
    pub fn package(&self, scaffold: &EbuildScaffold<'_>, listing_dir: Option<&Path>) -> Result<()> {
        let image_root = scaffold.image_dir();
        let boot = image_root.join("boot");
        let release = &self.kernel_release;

        self.ui.info("Adding kernel image");
        copy_file_with_dirs(&self.config_path, &boot.join(format!("config-{}", release)))?;
        let system_map = self.make.source_dir().join("System.map");
        copy_file_with_dirs(&system_map, &boot.join(format!("System.map-{}", release)))?;
        copy_file_with_dirs(&self.image_path, &boot.join(format!("linux-{}", release)))?;
        // For GRUB's 10_linux detection
        let kernel_link = boot.join(format!("kernel-{}", release));
        symlink(format!("linux-{}", release), &kernel_link).with_path(&kernel_link)?;

        self.ui.info("Adding modules");
        self.make.modules_install(image_root)?;

        if let Some(ref source) = self.initramfs_source {
            let archive_name = self.initramfs_archive_name();
            self.initramfs_builder(source, listing_dir)
                .build(&boot.join(&archive_name))?;
            let img_link = boot.join(format!("initramfs-{}.img", release));
            symlink(&archive_name, &img_link).with_path(&img_link)?;
        }

        self.ui.info("Creating package");
        scaffold.package()
    }

    /// Install the kernel package and any rebuilt module packages from the
    /// binary cache.
    pub fn install(&self) -> Result<()> {
        self.ui.info(format!("Installing kernel binary package {}", self.package));
        let atom = self.package.exact_atom();
        self.portage
            .emerge(["--select", "--usepkgonly=y", atom.as_str()], &BTreeMap::new())?;

        if !self.module_packages.is_empty() {
            self.ui.info("Installing out-of-tree kernel modules' binary packages");
            let args = ["--oneshot", "--usepkgonly=y"]
                .into_iter()
                .chain(self.module_packages.iter().map(String::as_str));
            self.portage.emerge(args, &BTreeMap::new())?;
        }
        Ok(())
    }

    pub fn kernel_version(&self) -> &str {
        &self.kernel_version
    }

    pub fn kernel_release(&self) -> &str {
        &self.kernel_release
    }

    pub fn source_dir(&self) -> &Path {
        self.make.source_dir()
    }

    pub fn image_path(&self) -> &Path {
        &self.image_path
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn package_name(&self) -> &PackageName {
        &self.package
    }

    pub fn kernel_compressor(&self) -> Option<&'static Compressor> {
        self.kernel_compressor
    }

    pub fn initramfs_compressor(&self) -> Option<&'static Compressor> {
        self.initramfs_compressor
    }

    pub fn initramfs_source(&self) -> Option<&Path> {
        self.initramfs_source.as_deref()
    }

    pub fn cross_compile(&self) -> Option<&str> {
        self.cross_compile.as_deref()
    }

    /// Packages rebuilt by [`Generator::build_kernel`].
    pub fn module_packages(&self) -> &[String] {
        &self.module_packages
    }

    /// Programs the remaining steps will run.
    pub fn required_tools(&self) -> Vec<String> {
        let mut tools: Vec<String> = ["make", "ebuild", self.portage.emerge_program()]
            .iter()
            .map(|t| t.to_string())
            .collect();
        if self.initramfs_source.is_some() {
            tools.extend(["cpio", "find"].map(String::from));
            if let Some(c) = self.initramfs_compressor {
                tools.push(c.program().to_string());
            }
        }
        tools
    }

    /// `initramfs-<release>.cpio[.ext]`
    pub fn initramfs_archive_name(&self) -> String {
        let ext = self.initramfs_compressor.map_or("", |c| c.extension);
        format!("initramfs-{}.cpio{}", self.kernel_release, ext)
    }

    fn print_summary(&self) {
        self.ui.info("Ready to build:");
        let _indent = self.ui.indented();
        self.ui.info(format!(
            "linux-{} ({})",
            self.kernel_release,
            self.make.arch()
        ));
        self.ui.info(format!("from {}", self.make.source_dir().display()));
        if let Some(ref source) = self.initramfs_source {
            self.ui.info(format!("with initramfs from {}", source.display()));
        }
        if let Some(ref cross) = self.cross_compile {
            self.ui.info(format!("cross-compiled with {} toolchain", cross));
        }
    }

    fn enable_distcc(&mut self) -> Result<()> {
        if self.make.env().contains_key("DISTCC_DIR") {
            return Ok(());
        }
        self.ui.info("Distributed C compiler (distcc) enabled");
        let distcc_dir = self.settings.tmpdir.join("portage/.distcc");
        fs::create_dir_all(&distcc_dir).with_path(&distcc_dir)?;
        fs::set_permissions(&distcc_dir, fs::Permissions::from_mode(0o775))
            .with_path(&distcc_dir)?;
        self.make.push_arg("CC=distcc");
        self.make
            .set_env("DISTCC_DIR", distcc_dir.to_string_lossy().into_owned());
        Ok(())
    }

    fn rebuild_out_of_tree_modules(&mut self) -> Result<()> {
        self.ui.info("Preparing to rebuild out-of-tree kernel modules");
        self.make.run(["modules_prepare"])?;

        self.ui.info("Getting a list of out-of-tree kernel modules");
        self.module_packages = OutOfTreeEnumerator::new(&self.settings.root, false, true)
            .packages(true)
            .collect::<Result<Vec<_>>>()?;
        if self.module_packages.is_empty() {
            return Ok(());
        }

        self.ui.info("Rebuilding out-of-tree kernel modules' packages");
        let _indent = self.ui.indented();
        for package in &self.module_packages {
            self.ui.info(package);
        }
        let packages = || self.module_packages.iter().map(String::as_str);

        // Dependencies first, then binary packages built from source
        self.portage.emerge(
            ["--changed-use", "--onlydeps", "--update"]
                .into_iter()
                .chain(packages()),
            &BTreeMap::new(),
        )?;
        let mut env = BTreeMap::new();
        env.insert(
            "KERNEL_DIR".to_string(),
            self.make.source_dir().to_string_lossy().into_owned(),
        );
        self.portage.emerge(
            ["--buildpkgonly", "--usepkg=n"].into_iter().chain(packages()),
            &env,
        )
    }

    fn initramfs_builder<'a>(&'a self, source: &'a Path, listing_dir: Option<&Path>) -> InitramfsBuilder<'a> {
        let mut hook_env = self.settings.env.clone();
        hook_env.insert("ARCH".to_string(), self.make.arch().to_string());
        hook_env.insert("PORTAGE_ARCH".to_string(), self.portage_arch.clone());
        if let Some(ref cross) = self.cross_compile {
            hook_env.insert("CROSS_COMPILE".to_string(), cross.clone());
        }

        InitramfsBuilder {
            runner: self.portage.runner(),
            ui: self.ui,
            make: &self.make,
            root: &self.settings.root,
            source,
            work_parent: &self.settings.tmpdir,
            release: &self.kernel_release,
            compressor: self.initramfs_compressor,
            hook_env,
            listing: listing_dir.map(|d| d.join(format!("initramfs-{}.ls", self.kernel_release))),
        }
    }
}

/// Find a kernel source tree: `explicit`, else the working directory, else
/// `<root>/usr/src/linux`. Returns `make` bound to it and its version.
fn discover_source<'r>(
    make: KernelMake<'r>,
    root: &Path,
    explicit: Option<&Path>,
) -> Result<(KernelMake<'r>, String)> {
    if let Some(dir) = explicit {
        let make = make.with_source(&absolute(dir)?);
        return match make.detect_version() {
            Some(version) => Ok((make, version)),
            None => Err(Error::discovery(format!(
                "The path '{}' doesn't seem to be a kernel source directory.",
                dir.display()
            ))),
        };
    }

    let cwd = std::env::current_dir().with_path(Path::new("."))?;
    let make = make.with_source(&cwd);
    if let Some(version) = make.detect_version() {
        return Ok((make, version));
    }

    let fallback = root.join(DEFAULT_SOURCE_DIR);
    if !fallback.is_dir() {
        return Err(Error::discovery(NO_SOURCE_FOUND));
    }
    let make = make.with_source(&absolute(&fallback)?);
    match make.detect_version() {
        Some(version) => Ok((make, version)),
        None => Err(Error::discovery(format!(
            "Unable to determine the version of the kernel source in '{}'.",
            fallback.display()
        ))),
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_path(path)
}

/// Decide where the initramfs comes from, if anywhere.
fn resolve_initramfs(
    ui: &Ui,
    config: &KernelConfig,
    root: &Path,
    requested: &InitramfsSource,
) -> Result<Option<PathBuf>> {
    if *requested == InitramfsSource::Disabled {
        return Ok(None);
    }
    if !config.contains("CONFIG_BLK_DEV_INITRD") {
        return Err(Error::configuration(
            "The selected kernel was not configured to support initramfs/initrd.",
        ));
    }

    match requested {
        InitramfsSource::Disabled => Ok(None),
        InitramfsSource::Default => {
            let dir = root.join(DEFAULT_INITRAMFS_DIR);
            if dir.is_dir() {
                Ok(Some(fs::canonicalize(&dir).with_path(&dir)?))
            } else {
                ui.warn("The selected kernel was configured to support initramfs/initrd,");
                ui.warn("but no suitable initramfs source directory was specified or found.");
                ui.warn("No initramfs will be created.");
                Ok(None)
            }
        }
        InitramfsSource::Path(dir) => {
            if dir.is_dir() {
                Ok(Some(fs::canonicalize(dir).with_path(dir)?))
            } else {
                Err(Error::configuration(format!(
                    "The initramfs path '{}' is not a directory.",
                    dir.display()
                )))
            }
        }
    }
}

/// True if `image` is missing or older than `config`.
pub fn image_is_stale(config: &Path, image: &Path) -> Result<bool> {
    let image_time = match fs::metadata(image) {
        Ok(meta) => meta.modified().with_path(image)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
        Err(source) => {
            return Err(Error::Io {
                path: image.to_path_buf(),
                source,
            })
        }
    };
    let config_time = fs::metadata(config)
        .and_then(|m| m.modified())
        .with_path(config)?;
    Ok(config_time > image_time)
}

/// Set a file's modification time to now.
pub fn touch(path: &Path) -> Result<()> {
    let file = fs::File::options()
        .append(true)
        .open(path)
        .with_path(path)?;
    file.set_modified(SystemTime::now()).with_path(path)
}
