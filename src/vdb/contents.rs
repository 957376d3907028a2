//! Parser for a package's CONTENTS manifest.
//!
//! Each line records one installed item:
//!
//! ```text
//! dir /lib/modules/5.10.5/misc
//! obj /lib/modules/5.10.5/misc/vboxdrv.ko 3f2a... 1609459200
//! sym /usr/lib/libfoo.so -> libfoo.so.1 1609459200
//! ```
//!
//! Only `obj` entries (regular files) matter to the enumerator.

/// Kind of a manifest entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Obj,
    Dir,
    Sym,
    Other,
}

/// One parsed manifest line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestLine<'a> {
    pub kind: EntryKind,
    pub path: &'a str,
}

impl<'a> ManifestLine<'a> {
    /// Parse a line. Returns `None` for blank or malformed lines.
    ///
    /// An `obj` line ends with a checksum and an mtime; everything between
    /// the kind and those two fields is the path, so paths with spaces
    /// survive. Lines with fewer fields fall back to the first token.
    pub fn parse(line: &'a str) -> Option<Self> {
        let line = line.trim_end_matches(['\n', '\r']);
        let (kind_str, rest) = line.split_once(char::is_whitespace)?;
        let rest = rest.trim_start();
        if rest.is_empty() {
            return None;
        }

        let kind = match kind_str {
            "obj" => EntryKind::Obj,
            "dir" => EntryKind::Dir,
            "sym" => EntryKind::Sym,
            _ => EntryKind::Other,
        };

        let path = match kind {
            EntryKind::Obj => obj_path(rest),
            EntryKind::Sym => rest.split(" -> ").next().unwrap_or(rest),
            _ => rest,
        };
        Some(Self { kind, path })
    }

    pub fn is_obj(&self) -> bool {
        self.kind == EntryKind::Obj
    }
}

fn obj_path(rest: &str) -> &str {
    let mut fields = rest.rsplitn(3, ' ');
    let mtime = fields.next();
    let hash = fields.next();
    match (fields.next(), hash, mtime) {
        (Some(path), Some(_), Some(mtime)) if mtime.bytes().all(|b| b.is_ascii_digit()) => path,
        _ => rest.split_whitespace().next().unwrap_or(rest),
    }
}
