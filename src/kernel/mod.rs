//! Kernel-side building blocks: configuration, compressors, the `make`
//! driver and package naming.

pub mod compressor;
pub mod config;
pub mod make;
pub mod package;

pub use compressor::Compressor;
pub use config::{ConfigValue, KernelConfig};
pub use make::{kernel_arch, KernelMake};
pub use package::PackageName;
