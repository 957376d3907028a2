//! Compressors the kernel can decompress, in order of preference.

use super::config::KernelConfig;

/// An external compression program.
#[derive(Debug, PartialEq, Eq)]
pub struct Compressor {
    /// Name as used in `CONFIG_KERNEL_<name>` and `CONFIG_RD_<name>`.
    pub config_name: &'static str,
    /// File name extension, including the dot.
    pub extension: &'static str,
    /// Program and arguments; reads stdin, writes stdout.
    pub command: &'static [&'static str],
    /// Package providing the program.
    pub package: &'static str,
}

impl Compressor {
    /// Kernel config option enabling this compressor for the kernel image.
    pub fn kernel_option(&self) -> String {
        format!("CONFIG_KERNEL_{}", self.config_name)
    }

    /// Kernel config option enabling this compressor for the initramfs.
    pub fn initramfs_option(&self) -> String {
        format!("CONFIG_RD_{}", self.config_name)
    }

    pub fn program(&self) -> &'static str {
        self.command[0]
    }

    pub fn args(&self) -> &'static [&'static str] {
        &self.command[1..]
    }
}

pub static COMPRESSORS: &[Compressor] = &[
    Compressor {
        config_name: "LZO",
        extension: ".lzo",
        command: &["lzop", "-9"],
        package: "app-arch/lzop",
    },
    Compressor {
        config_name: "LZMA",
        extension: ".lzma",
        command: &["lzma", "-9"],
        package: "app-arch/xz-utils",
    },
    Compressor {
        config_name: "BZIP2",
        extension: ".bz2",
        command: &["bzip2", "-9"],
        package: "app-arch/bzip2",
    },
    Compressor {
        config_name: "GZIP",
        extension: ".gz",
        command: &["gzip", "-9"],
        package: "app-arch/gzip",
    },
];

/// Look up a compressor by its config name.
pub fn by_config_name(name: &str) -> Option<&'static Compressor> {
    COMPRESSORS.iter().find(|c| c.config_name == name)
}

/// The first compressor enabled for the kernel image, if any.
pub fn for_kernel(config: &KernelConfig) -> Option<&'static Compressor> {
    COMPRESSORS
        .iter()
        .find(|c| config.contains(&c.kernel_option()))
}

/// The compressor for the initramfs.
///
/// Reuses the kernel image's compressor when the kernel can also unpack an
/// initramfs with it; otherwise the first one enabled for initramfs. `None`
/// means the archive is stored uncompressed.
pub fn for_initramfs(
    config: &KernelConfig,
    kernel: Option<&'static Compressor>,
) -> Option<&'static Compressor> {
    let mut enabled = COMPRESSORS
        .iter()
        .filter(|c| config.contains(&c.initramfs_option()));

    if let Some(kernel) = kernel {
        if enabled.clone().any(|c| c == kernel) {
            return Some(kernel);
        }
    }
    enabled.next()
}
