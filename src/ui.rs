//! Leveled, indented progress messages.
//!
//! Output looks like:
//!
//! ```text
//! [I] Preparing to build kernel
//! [I] Ready to build:
//!   [I] linux-5.10.5-gentoo (x86_64)
//! [W] No initramfs will be created.
//! ```
//!
//! Indentation follows pipeline nesting. [`Ui::indented`] hands out a guard so
//! an early `?` return cannot leave the stream indented.

use std::cell::Cell;

#[derive(Debug, Default)]
pub struct Ui {
    depth: Cell<usize>,
    quiet: bool,
}

impl Ui {
    pub fn new() -> Self {
        Self::default()
    }

    /// A Ui that drops info messages. Warnings and errors still print.
    pub fn quiet() -> Self {
        Self {
            depth: Cell::new(0),
            quiet: true,
        }
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        if !self.quiet {
            println!("{}", self.line('I', msg.as_ref()));
        }
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        eprintln!("{}", self.line('W', msg.as_ref()));
    }

    pub fn error(&self, msg: impl AsRef<str>) {
        eprintln!("{}", self.line('E', msg.as_ref()));
    }

    /// Increase indentation until the returned guard is dropped.
    pub fn indented(&self) -> Indent<'_> {
        self.depth.set(self.depth.get() + 1);
        Indent { ui: self }
    }

    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    fn line(&self, level: char, msg: &str) -> String {
        format!("{}[{}] {}", "  ".repeat(self.depth.get()), level, msg)
    }
}

/// Indentation guard returned by [`Ui::indented`].
#[must_use = "indentation ends when the guard is dropped"]
pub struct Indent<'a> {
    ui: &'a Ui,
}

impl Drop for Indent<'_> {
    fn drop(&mut self) {
        self.ui.depth.set(self.ui.depth.get().saturating_sub(1));
    }
}
