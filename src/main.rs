//! kernel-gen - builds Linux kernel binary packages.
//!
//! Compiles a configured kernel source tree, stages the image, modules and
//! an optional initramfs into a temporary ebuild's image directory, and
//! lets Portage turn that into a binary package.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use kernel_gen::commands::{self, BuildArgs, ListArgs};
use kernel_gen::config::Config;
use kernel_gen::generator::InitramfsSource;
use kernel_gen::process::SystemRunner;
use kernel_gen::ui::Ui;

#[derive(Parser)]
#[command(name = "kernel-gen")]
#[command(about = "Build Linux kernel binary packages with Portage")]
#[command(
    after_help = "QUICK START:\n  kernel-gen preflight            Check host tools\n  kernel-gen build --install      Build and install the kernel in the current directory\n  kernel-gen list --files         Show out-of-tree modules and firmware"
)]
struct Cli {
    /// Show debug logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a kernel binary package
    Build {
        /// Kernel source directory (default: current directory, then ROOT/usr/src/linux)
        #[arg(short, long)]
        source: Option<PathBuf>,

        /// Include an initramfs, built from DIR (default: ROOT/usr/src/initramfs)
        #[arg(short, long, value_name = "DIR", num_args = 0..=1)]
        initramfs: Option<Option<PathBuf>>,

        /// Overlay receiving the temporary ebuild (default: highest priority)
        #[arg(short, long)]
        overlay: Option<String>,

        /// Portage architecture to build for (default: ARCH from Portage)
        #[arg(short, long)]
        arch: Option<String>,

        /// Installation root (default: ROOT from Portage)
        #[arg(long)]
        root: Option<PathBuf>,

        /// Don't rebuild packages that install out-of-tree modules
        #[arg(long)]
        no_rebuild_modules: bool,

        /// Install the package after creating it
        #[arg(long)]
        install: bool,

        /// Dump a listing of the initramfs contents to TMPDIR
        #[arg(long)]
        initramfs_debug: bool,

        /// Skip the host tool checks
        #[arg(long)]
        skip_preflight: bool,
    },

    /// List kernel modules and firmware installed by non-kernel packages
    List {
        /// List kernel modules
        #[arg(short, long)]
        modules: bool,

        /// List firmware
        #[arg(short = 'w', long)]
        firmware: bool,

        /// Show matching files
        #[arg(short, long)]
        files: bool,

        /// Show owning packages (with --files: package and files on one line)
        #[arg(short, long)]
        packages: bool,

        /// Name packages by version instead of slot
        #[arg(long)]
        no_slot: bool,

        /// Print a package to files mapping as JSON
        #[arg(long)]
        json: bool,

        /// Installation root (default: ROOT, or /)
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Run preflight checks (verify host tools before building)
    Preflight {
        /// Fail if any checks fail (exit code 1)
        #[arg(long)]
        strict: bool,
    },

    /// Show current configuration
    Config,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Load .env if present
    dotenvy::dotenv().ok();
    init_tracing(cli.verbose);
    let config = Config::from_env();
    let ui = Ui::new();

    match run(cli.command, &config, &ui) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            for line in format!("{:#}", e).lines() {
                ui.error(line);
            }
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands, config: &Config, ui: &Ui) -> Result<()> {
    match command {
        Commands::Build {
            source,
            initramfs,
            overlay,
            arch,
            root,
            no_rebuild_modules,
            install,
            initramfs_debug,
            skip_preflight,
        } => {
            let initramfs = match initramfs {
                None => InitramfsSource::Disabled,
                Some(None) => InitramfsSource::Default,
                Some(Some(dir)) => InitramfsSource::Path(dir),
            };
            let args = BuildArgs {
                arch,
                source,
                root,
                initramfs,
                overlay,
                rebuild_modules: !no_rebuild_modules,
                install,
                initramfs_listing: initramfs_debug.then(|| config.tmpdir.clone()),
                skip_preflight,
            }
            .with_defaults(config);
            commands::cmd_build(&SystemRunner, ui, &args)?;
        }

        Commands::List {
            modules,
            firmware,
            files,
            packages,
            no_slot,
            json,
            root,
        } => {
            let args = ListArgs {
                root: root
                    .or_else(|| config.root.clone())
                    .unwrap_or_else(|| PathBuf::from("/")),
                modules,
                firmware,
                files,
                packages,
                no_slot,
                json,
            };
            commands::cmd_list(&args, &mut io::stdout().lock())?;
        }

        Commands::Preflight { strict } => {
            commands::cmd_preflight(config, strict, &mut io::stdout().lock())?;
        }

        Commands::Config => {
            config.print();
        }
    }

    Ok(())
}
