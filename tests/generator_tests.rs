//! Kernel package generation, driven through a scripted runner.
//!
//! No process is spawned: `make`, `ebuild`, `emerge` and `portageq` are
//! answered by [`helpers::ScriptedRunner`], which also fakes their effects
//! on disk (image directory, installed modules, kernel image).

mod helpers;

use std::cell::RefCell;
use std::fs;
use std::os::unix::fs::symlink;
use std::path::PathBuf;
use std::rc::Rc;

use helpers::{
    assert_file_exists, assert_symlink, mtime, set_mtime_offset, write_file, write_script,
    ScriptedRunner, TestEnv,
};
use kernel_gen::commands::{cmd_build, BuildArgs};
use kernel_gen::error::Error;
use kernel_gen::generator::{BuildOptions, Generator, InitramfsSource};
use kernel_gen::portage::PortageSettings;
use kernel_gen::process::CommandOutput;
use kernel_gen::ui::Ui;
use serial_test::serial;

fn options(env: &TestEnv) -> BuildOptions {
    BuildOptions {
        source: Some(env.source.clone()),
        ..BuildOptions::default()
    }
}

fn prepare<'r>(
    runner: &'r ScriptedRunner,
    ui: &'r Ui,
    options: &BuildOptions,
) -> kernel_gen::Result<Generator<'r>> {
    let settings = PortageSettings::load(runner, None)?;
    Generator::prepare(runner, ui, settings, options)
}

fn build_args(env: &TestEnv) -> BuildArgs {
    BuildArgs {
        source: Some(env.source.clone()),
        rebuild_modules: true,
        skip_preflight: true,
        ..BuildArgs::default()
    }
}

fn kernel_builds(runner: &ScriptedRunner) -> usize {
    runner
        .interactive_calls()
        .iter()
        .filter(|c| c.program() == "make")
        .count()
}

// =============================================================================
// End to end
// =============================================================================

#[test]
fn test_gzip_kernel_without_initramfs() {
    let env = TestEnv::new();
    env.write_config("5.10.5", &["CONFIG_MODULES=y", "CONFIG_KERNEL_GZIP=y"]);
    let runner = env.runner("5.10.5", "5.10.5");
    let ui = Ui::quiet();

    let mut generator = prepare(&runner, &ui, &options(&env)).unwrap();
    assert_eq!(generator.package_name().to_string(), "sys-kernel/vanilla-bin-5.10.5");
    assert_eq!(generator.kernel_compressor().map(|c| c.config_name), Some("GZIP"));
    assert_eq!(generator.initramfs_source(), None);
    assert_eq!(generator.initramfs_compressor(), None);

    generator.build_kernel(true).unwrap();
    assert_eq!(kernel_builds(&runner), 1);

    let ebuild = env
        .overlay
        .join("sys-kernel/vanilla-bin/vanilla-bin-5.10.5.ebuild");
    let scaffold = generator.create_ebuild(None).unwrap();
    assert_file_exists(&ebuild);
    assert!(fs::read_to_string(&ebuild).unwrap().contains("KERNEL-GEN: D=${D}"));
    assert_eq!(scaffold.image_dir(), env.ebuild_image_dir("vanilla-bin-5.10.5"));

    generator.package(&scaffold, None).unwrap();
    let boot = scaffold.image_dir().join("boot");
    assert_file_exists(&boot.join("config-5.10.5"));
    assert_file_exists(&boot.join("System.map-5.10.5"));
    assert_eq!(fs::read_to_string(boot.join("linux-5.10.5")).unwrap(), "bzImage");
    assert_symlink(&boot.join("kernel-5.10.5"), "linux-5.10.5");
    assert!(fs::symlink_metadata(boot.join("initramfs-5.10.5.img")).is_err());
    assert_file_exists(
        &scaffold
            .image_dir()
            .join("lib/modules/5.10.5/kernel/drivers/ata/ahci.ko"),
    );
    assert!(runner.called("ebuild", "package"));
    assert!(runner.pipelines().is_empty());

    drop(scaffold);
    assert!(!ebuild.exists());
    assert!(!env.overlay.join("sys-kernel/vanilla-bin").exists());
    let calls = runner.calls();
    assert!(calls.last().unwrap().ends_with("vanilla-bin-5.10.5.ebuild clean"));
}

#[test]
fn test_build_command_passes_root_to_portage() {
    let env = TestEnv::new();
    env.write_config("5.10.5", &["CONFIG_KERNEL_GZIP=y"]);
    let runner = env.runner("5.10.5", "5.10.5");
    let args = BuildArgs {
        root: Some(env.root.clone()),
        install: true,
        ..build_args(&env)
    };

    cmd_build(&runner, &Ui::quiet(), &args).unwrap();

    let root = env.root.display().to_string();
    for cmd in runner
        .commands()
        .iter()
        .filter(|c| ["portageq", "ebuild", "emerge"].contains(&c.program()))
    {
        assert_eq!(cmd.get_env().get("ROOT"), Some(&root), "{}", cmd.display());
    }
    assert!(runner
        .calls()
        .contains(&"emerge --quiet --quiet-build --quiet-fail=y --select --usepkgonly=y =sys-kernel/vanilla-bin-5.10.5".to_string()));
}

#[test]
fn test_local_version_and_extra_name_the_package() {
    let env = TestEnv::new();
    env.write_config("5.10.5-gentoo-r1", &["CONFIG_LOCALVERSION=\"-desktop\""]);
    let runner = env.runner("5.10.5-gentoo-r1", "5.10.5-gentoo-r1-desktop");
    let ui = Ui::quiet();

    let generator = prepare(&runner, &ui, &options(&env)).unwrap();
    assert_eq!(generator.kernel_release(), "5.10.5-gentoo-r1-desktop");
    assert_eq!(
        generator.package_name().to_string(),
        "sys-kernel/gentoo-desktop-bin-5.10.5-r1"
    );
    assert_eq!(generator.kernel_compressor(), None);
}

// =============================================================================
// Freshness gate
// =============================================================================

#[test]
fn test_up_to_date_image_is_not_rebuilt() {
    let env = TestEnv::new();
    let config = env.write_config("5.10.5", &["CONFIG_KERNEL_GZIP=y"]);
    env.write_image();
    set_mtime_offset(&config, -60);
    let runner = env.runner("5.10.5", "5.10.5");
    let ui = Ui::quiet();

    let mut generator = prepare(&runner, &ui, &options(&env)).unwrap();
    assert!(!generator.needs_build().unwrap());
    generator.build_kernel(true).unwrap();

    assert_eq!(kernel_builds(&runner), 0);
    assert!(!runner.called("make", "modules_prepare"));
}

#[test]
fn test_stale_image_is_rebuilt_and_touched() {
    let env = TestEnv::new();
    let config = env.write_config("5.10.5", &["CONFIG_KERNEL_GZIP=y"]);
    let image = env.write_image();
    set_mtime_offset(&image, -120);
    set_mtime_offset(&config, -60);
    let runner = env.runner("5.10.5", "5.10.5");
    let ui = Ui::quiet();

    let mut generator = prepare(&runner, &ui, &options(&env)).unwrap();
    assert!(generator.needs_build().unwrap());
    generator.build_kernel(false).unwrap();

    assert_eq!(kernel_builds(&runner), 1);
    // The fake build leaves an existing image alone, like make does
    assert_eq!(fs::read_to_string(&image).unwrap(), "bzImage");
    assert!(mtime(&image) > mtime(&config));
    assert!(!generator.needs_build().unwrap());

    generator.build_kernel(false).unwrap();
    assert_eq!(kernel_builds(&runner), 1);
}

#[test]
fn test_missing_image_is_built() {
    let env = TestEnv::new();
    env.write_config("5.10.5", &[]);
    let runner = env.runner("5.10.5", "5.10.5");
    let ui = Ui::quiet();

    let mut generator = prepare(&runner, &ui, &options(&env)).unwrap();
    generator.build_kernel(false).unwrap();

    let build = &runner.interactive_calls()[0];
    assert_eq!(build.get_env().get("ARCH").map(String::as_str), Some("x86_64"));
    assert!(build.get_args().starts_with(&["-j2".to_string(), "--directory".to_string()]));
    assert_file_exists(&env.image_path());
}

// =============================================================================
// Out-of-tree modules
// =============================================================================

#[test]
fn test_out_of_tree_module_packages_rebuilt_and_installed() {
    let env = TestEnv::new();
    env.write_config("5.10.5", &["CONFIG_KERNEL_GZIP=y"]);
    env.add_package(
        "app-emulation",
        "virtualbox-modules-6.1.18",
        "0",
        &["dir /lib/modules/5.10.5/misc", "obj /lib/modules/5.10.5/misc/vboxdrv.ko 0f0f 1612345678"],
    );
    env.add_package(
        "sys-kernel",
        "gentoo-sources-5.10.5",
        "5.10.5",
        &["obj /lib/modules/5.10.5/kernel/fs/foo.ko 0f0f 1612345678"],
    );
    let runner = env.runner("5.10.5", "5.10.5");
    let ui = Ui::quiet();

    let mut generator = prepare(&runner, &ui, &options(&env)).unwrap();
    generator.build_kernel(true).unwrap();
    assert_eq!(generator.module_packages(), ["app-emulation/virtualbox-modules:0"]);

    let calls = runner.calls();
    let position = |needle: &str| calls.iter().position(|c| c.contains(needle)).unwrap();
    assert!(position("modules_prepare") < position("--onlydeps"));
    assert!(position("--onlydeps") < position("--buildpkgonly"));
    assert_eq!(
        calls[position("--onlydeps")],
        "emerge --quiet --quiet-build --quiet-fail=y --changed-use --onlydeps --update app-emulation/virtualbox-modules:0"
    );
    let rebuild = &runner.find("emerge", "--buildpkgonly")[0];
    assert!(rebuild.get_args().iter().any(|a| a == "--usepkg=n"));
    assert_eq!(
        rebuild.get_env().get("KERNEL_DIR").map(PathBuf::from),
        Some(env.source.clone())
    );
    let build = calls
        .iter()
        .rposition(|c| c.starts_with("make") && c.ends_with("--quiet"))
        .unwrap();
    assert!(position("--buildpkgonly") < build);

    generator.install().unwrap();
    let installs: Vec<_> = runner
        .calls()
        .into_iter()
        .filter(|c| c.contains("--usepkgonly=y"))
        .collect();
    assert_eq!(
        installs,
        [
            "emerge --quiet --quiet-build --quiet-fail=y --select --usepkgonly=y =sys-kernel/vanilla-bin-5.10.5",
            "emerge --quiet --quiet-build --quiet-fail=y --oneshot --usepkgonly=y app-emulation/virtualbox-modules:0",
        ]
    );
}

#[test]
fn test_no_module_packages_means_no_emerge() {
    let env = TestEnv::new();
    env.write_config("5.10.5", &[]);
    let runner = env.runner("5.10.5", "5.10.5");
    let ui = Ui::quiet();

    let mut generator = prepare(&runner, &ui, &options(&env)).unwrap();
    generator.build_kernel(true).unwrap();
    generator.install().unwrap();

    assert!(runner.called("make", "modules_prepare"));
    assert!(!runner.called("emerge", "--onlydeps"));
    assert!(!runner.called("emerge", "--oneshot"));
}

#[test]
fn test_distcc_feature_enables_distcc() {
    let env = TestEnv::new();
    env.write_config("5.10.5", &[]);
    let runner = env
        .runner("5.10.5", "5.10.5")
        .on("portageq", "envvar", &env.envvars("distcc sandbox"));
    let ui = Ui::quiet();

    let mut generator = prepare(&runner, &ui, &options(&env)).unwrap();
    generator.build_kernel(false).unwrap();

    let distcc_dir = env.portage_tmpdir.join("portage/.distcc");
    assert!(distcc_dir.is_dir());
    let build = &runner.interactive_calls()[0];
    assert!(build.get_args().iter().any(|a| a == "CC=distcc"));
    assert_eq!(
        build.get_env().get("DISTCC_DIR").map(PathBuf::from),
        Some(distcc_dir)
    );
}

#[test]
fn test_cross_compile_prefixes_emerge() {
    let env = TestEnv::new();
    env.write_config(
        "5.10.5",
        &["CONFIG_CROSS_COMPILE=\"aarch64-unknown-linux-gnu-\""],
    );
    let runner = env.runner("5.10.5", "5.10.5");
    let ui = Ui::quiet();
    let options = BuildOptions {
        arch: Some("arm64".into()),
        ..options(&env)
    };

    let generator = prepare(&runner, &ui, &options).unwrap();
    assert_eq!(generator.cross_compile(), Some("aarch64-unknown-linux-gnu-"));
    assert!(generator
        .required_tools()
        .contains(&"aarch64-unknown-linux-gnu-emerge".to_string()));

    generator.install().unwrap();
    let install = &runner.find("emerge", "--select")[0];
    assert_eq!(install.program(), "aarch64-unknown-linux-gnu-emerge");
    let query = &runner.find("make", "kernelversion")[0];
    assert_eq!(query.get_env().get("ARCH").map(String::as_str), Some("aarch64"));
}

// =============================================================================
// Failures and cleanup
// =============================================================================

#[test]
fn test_failed_packaging_still_removes_ebuild() {
    let env = TestEnv::new();
    env.write_config("5.10.5", &[]);
    let runner = env.runner("5.10.5", "5.10.5").on_fail("ebuild", "package", 1);

    let err = cmd_build(&runner, &Ui::quiet(), &build_args(&env)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::ExternalTool { .. })
    ));

    assert!(!env
        .overlay
        .join("sys-kernel/vanilla-bin/vanilla-bin-5.10.5.ebuild")
        .exists());
    let calls = runner.calls();
    assert!(calls.last().unwrap().ends_with("clean"));
    assert!(!runner.called("emerge", "--select"));
}

#[test]
fn test_missing_marker_line_fails_and_cleans_up() {
    let env = TestEnv::new();
    env.write_config("5.10.5", &[]);
    let runner = env
        .runner("5.10.5", "5.10.5")
        .on("ebuild", "install", ">>> Completed installing\n");
    let ui = Ui::quiet();

    let generator = prepare(&runner, &ui, &options(&env)).unwrap();
    let err = generator.create_ebuild(None).err().unwrap();
    assert!(matches!(err, Error::UnexpectedOutput { .. }));
    assert!(!env
        .overlay
        .join("sys-kernel/vanilla-bin/vanilla-bin-5.10.5.ebuild")
        .exists());
}

#[test]
fn test_unknown_overlay() {
    let env = TestEnv::new();
    env.write_config("5.10.5", &[]);
    let runner = env.runner("5.10.5", "5.10.5");
    let ui = Ui::quiet();

    let generator = prepare(&runner, &ui, &options(&env)).unwrap();
    let err = generator.create_ebuild(Some("nope")).err().unwrap();
    assert_eq!(err.to_string(), "Unknown overlay: nope");
    assert!(runner.find("ebuild", "install").is_empty());
}

#[test]
fn test_named_overlay_is_used() {
    let env = TestEnv::new();
    env.write_config("5.10.5", &[]);
    let runner = env.runner("5.10.5", "5.10.5");
    let ui = Ui::quiet();

    let generator = prepare(&runner, &ui, &options(&env)).unwrap();
    let scaffold = generator.create_ebuild(Some("gentoo")).unwrap();
    assert!(scaffold
        .ebuild_path()
        .starts_with(env._temp_dir.path().join("gentoo")));
}

#[test]
fn test_not_a_source_directory() {
    let env = TestEnv::new();
    let runner = env.runner("5.10.5", "5.10.5").on_fail("make", "kernelversion", 2);
    let ui = Ui::quiet();

    let err = prepare(&runner, &ui, &options(&env)).err().unwrap();
    assert!(matches!(err, Error::Discovery(_)));
    assert!(err.to_string().contains("doesn't seem to be a kernel source directory"));
}

#[test]
#[serial]
fn test_no_source_found_suggests_remediation() {
    let env = TestEnv::new();
    let runner = env
        .runner("5.10.5", "5.10.5")
        .on_fail("make", "kernelversion", 2)
        .on("portageq", "envvar", &env.envvars(""));
    let ui = Ui::quiet();

    let err = prepare(&runner, &ui, &BuildOptions::default()).err().unwrap();
    assert!(matches!(err, Error::Discovery(_)));
    assert!(err.to_string().contains("--source"));
}

#[test]
#[serial]
fn test_falls_back_to_usr_src_linux() {
    let env = TestEnv::new();
    env.write_config("5.10.5", &[]);
    let fallback = env.root.join("usr/src/linux");
    fs::create_dir_all(fallback.parent().unwrap()).unwrap();
    symlink(&env.source, &fallback).unwrap();
    let runner = env.runner("5.10.5", "5.10.5").on_call("make", "kernelversion", |cmd| {
        match helpers::directory_arg(cmd) {
            Some(dir) if dir.ends_with("usr/src/linux") => CommandOutput::ok("5.10.5\n"),
            _ => CommandOutput {
                code: Some(2),
                ..CommandOutput::default()
            },
        }
    });
    let ui = Ui::quiet();

    let generator = prepare(&runner, &ui, &BuildOptions::default()).unwrap();
    assert_eq!(generator.source_dir(), fallback);
    assert_eq!(generator.kernel_version(), "5.10.5");
    assert_eq!(runner.find("make", "kernelversion").len(), 2);
}

#[test]
fn test_unconfigured_kernel() {
    let env = TestEnv::new();
    fs::write(env.source.join(".config"), "CONFIG_64BIT=y\n").unwrap();
    let runner = env.runner("5.10.5", "5.10.5");
    let ui = Ui::quiet();

    let err = prepare(&runner, &ui, &options(&env)).err().unwrap();
    assert!(matches!(err, Error::Configuration(_)));
    assert!(err.to_string().contains("menuconfig"));
}

#[test]
fn test_config_for_other_version() {
    let env = TestEnv::new();
    env.write_config("5.10.4", &[]);
    let runner = env.runner("5.10.5", "5.10.5");
    let ui = Ui::quiet();

    let err = prepare(&runner, &ui, &options(&env)).err().unwrap();
    assert!(matches!(err, Error::Configuration(_)));
    assert!(err.to_string().contains("5.10.4"));
}

#[test]
fn test_multi_line_release_is_unexpected_output() {
    let env = TestEnv::new();
    env.write_config("5.10.5", &[]);
    let runner = env
        .runner("5.10.5", "5.10.5")
        .on("make", "kernelrelease", "5.10.5\nmake: *** warning\n");
    let ui = Ui::quiet();

    let err = prepare(&runner, &ui, &options(&env)).err().unwrap();
    assert!(matches!(err, Error::UnexpectedOutput { .. }));
}

#[test]
fn test_initramfs_needs_initrd_support() {
    let env = TestEnv::new();
    env.write_config("5.10.5", &["CONFIG_RD_GZIP=y"]);
    let runner = env.runner("5.10.5", "5.10.5");
    let ui = Ui::quiet();
    let options = BuildOptions {
        initramfs: InitramfsSource::Default,
        ..options(&env)
    };

    let err = prepare(&runner, &ui, &options).err().unwrap();
    assert!(matches!(err, Error::Configuration(_)));
}

// =============================================================================
// Initramfs
// =============================================================================

fn initramfs_env() -> (TestEnv, PathBuf) {
    let env = TestEnv::new();
    env.write_config(
        "5.10.5",
        &[
            "CONFIG_KERNEL_GZIP=y",
            "CONFIG_BLK_DEV_INITRD=y",
            "CONFIG_RD_BZIP2=y",
            "CONFIG_RD_GZIP=y",
        ],
    );
    env.add_package(
        "sys-firmware",
        "example-firmware-1.0",
        "0",
        &["dir /lib/firmware", "obj /lib/firmware/example/fw.bin 0f0f 1612345678"],
    );
    write_file(&env.root.join("lib/firmware/example/fw.bin"), "firmware");

    let irf = env._temp_dir.path().join("initramfs");
    write_file(&irf.join("init"), "#!/bin/sh\nexec /bin/sh\n");
    write_file(&irf.join("etc/fstab"), "");
    (env, irf)
}

#[test]
#[serial]
fn test_initramfs_from_source_tree() {
    let (env, irf) = initramfs_env();
    let runner = env.runner("5.10.5", "5.10.5");
    let ui = Ui::quiet();
    let options = BuildOptions {
        initramfs: InitramfsSource::Path(irf.clone()),
        ..options(&env)
    };
    let cwd = std::env::current_dir().unwrap();
    let listing_dir = env._temp_dir.path().join("listing");

    let mut generator = prepare(&runner, &ui, &options).unwrap();
    assert_eq!(generator.initramfs_compressor().map(|c| c.config_name), Some("GZIP"));
    assert_eq!(generator.initramfs_archive_name(), "initramfs-5.10.5.cpio.gz");
    generator.build_kernel(false).unwrap();
    let scaffold = generator.create_ebuild(None).unwrap();
    generator.package(&scaffold, Some(&listing_dir)).unwrap();

    let boot = scaffold.image_dir().join("boot");
    assert_file_exists(&boot.join("initramfs-5.10.5.cpio.gz"));
    assert_symlink(&boot.join("initramfs-5.10.5.img"), "initramfs-5.10.5.cpio.gz");

    let pipelines = runner.pipelines();
    assert_eq!(pipelines.len(), 1);
    let archive = &pipelines[0];
    assert_eq!(
        archive.stages,
        [
            "find . -print0",
            "cpio --create --format=newc --null --owner=0:0",
            "gzip -9",
        ]
    );
    assert_eq!(archive.dir, env.portage_tmpdir.join("initramfs-5.10.5"));
    assert_eq!(archive.sink, boot.join("initramfs-5.10.5.cpio.gz"));
    for expected in [
        "init",
        "etc/fstab",
        "lib/firmware/example/fw.bin",
        "lib/modules/5.10.5/kernel/drivers/ata/ahci.ko",
    ] {
        assert!(archive.files.iter().any(|f| f == expected), "{} missing", expected);
    }
    assert!(!archive.files.iter().any(|f| f.contains("kernel/sound")));

    assert!(!archive.dir.exists());
    assert_eq!(std::env::current_dir().unwrap(), cwd);
    assert!(runner.called("ls", "-lR"));
    assert_file_exists(&listing_dir.join("initramfs-5.10.5.ls"));
}

#[test]
#[serial]
fn test_initramfs_build_hook() {
    let (env, irf) = initramfs_env();
    write_script(&irf.join("build"), "#!/bin/sh\n");
    let seen_cwd = Rc::new(RefCell::new(None));
    let seen = Rc::clone(&seen_cwd);
    let runner = env.runner("5.10.5", "5.10.5").on_call("build", "", move |cmd| {
        *seen.borrow_mut() = std::env::current_dir().ok();
        write_file(&cmd.get_dir().unwrap().join("hook-output"), "");
        CommandOutput::ok("")
    });
    let ui = Ui::quiet();
    let options = BuildOptions {
        initramfs: InitramfsSource::Path(irf.clone()),
        ..options(&env)
    };

    let mut generator = prepare(&runner, &ui, &options).unwrap();
    generator.build_kernel(false).unwrap();
    let scaffold = generator.create_ebuild(None).unwrap();
    generator.package(&scaffold, None).unwrap();

    let staging = env.portage_tmpdir.join("initramfs-5.10.5");
    let hook = runner
        .interactive_calls()
        .into_iter()
        .find(|c| c.program().ends_with("/build"))
        .unwrap();
    assert_eq!(hook.get_dir(), Some(staging.as_path()));
    assert_eq!(hook.get_env().get("ARCH").map(String::as_str), Some("x86_64"));
    assert_eq!(hook.get_env().get("PORTAGE_ARCH").map(String::as_str), Some("amd64"));
    assert!(!hook.get_env().contains_key("CROSS_COMPILE"));
    assert_eq!(
        *seen_cwd.borrow(),
        Some(fs::canonicalize(&env.portage_tmpdir).unwrap().join("initramfs-5.10.5"))
    );

    let files = &runner.pipelines()[0].files;
    assert!(files.iter().any(|f| f == "hook-output"));
    assert!(!files.iter().any(|f| f == "init"));
    assert!(!runner.called("ls", "-lR"));
}

#[test]
#[serial]
fn test_failed_hook_removes_staging_and_restores_cwd() {
    let (env, irf) = initramfs_env();
    write_script(&irf.join("build"), "#!/bin/sh\nexit 1\n");
    let runner = env.runner("5.10.5", "5.10.5").on_fail("build", "", 1);
    let ui = Ui::quiet();
    let options = BuildOptions {
        initramfs: InitramfsSource::Path(irf.clone()),
        ..options(&env)
    };
    let cwd = std::env::current_dir().unwrap();

    let mut generator = prepare(&runner, &ui, &options).unwrap();
    generator.build_kernel(false).unwrap();
    let scaffold = generator.create_ebuild(None).unwrap();
    let err = generator.package(&scaffold, None).unwrap_err();

    assert!(err.to_string().contains("Initramfs build script failed"));
    assert!(!env.portage_tmpdir.join("initramfs-5.10.5").exists());
    assert_eq!(std::env::current_dir().unwrap(), cwd);
    assert!(!runner.called("ebuild", "package"));
    assert_eq!(ui.depth(), 0);
}

#[test]
fn test_missing_default_initramfs_is_skipped() {
    let (env, _irf) = initramfs_env();
    let runner = env.runner("5.10.5", "5.10.5");
    let ui = Ui::quiet();
    let options = BuildOptions {
        initramfs: InitramfsSource::Default,
        ..options(&env)
    };

    let generator = prepare(&runner, &ui, &options).unwrap();
    assert_eq!(generator.initramfs_source(), None);
    assert_eq!(generator.initramfs_compressor(), None);
}
