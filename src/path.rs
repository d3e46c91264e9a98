//! Archive-name policy.
//!
//! Every name stored in or read from an archive passes through
//! [`validate`]. A [`NormalizedPath`] is relative, uses `/` separators,
//! has no empty, `.` or `..` components and is at most [`MAX_PATH_LEN`]
//! bytes, so joining it onto a destination root can never leave that root.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::error::{ArchiveError, Result};

/// Longest name in bytes. Fits the legacy 512-byte NUL-padded slot.
pub const MAX_PATH_LEN: usize = 511;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(transparent)]
pub struct NormalizedPath(String);

impl NormalizedPath {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Parent name, `None` for top-level entries.
    pub fn parent(&self) -> Option<&str> {
        self.0.rfind('/').map(|i| &self.0[..i])
    }

    /// Destination of this entry below `root`.
    pub fn to_fs_path(&self, root: &Path) -> PathBuf {
        let mut out = root.to_path_buf();
        for comp in self.components() {
            out.push(comp);
        }
        out
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Validate and normalize an archive-relative name.
pub fn validate(raw: &str) -> Result<NormalizedPath> {
    if raw.is_empty() {
        return Err(ArchiveError::invalid("empty path"));
    }
    if raw.contains('\0') {
        return Err(ArchiveError::invalid(format!("NUL byte in path {raw:?}")));
    }

    let mut norm = raw.replace('\\', "/");
    if norm.starts_with('/') {
        return Err(ArchiveError::PathTraversal(format!("absolute path {raw:?}")));
    }
    // `X:` names are drive-qualified on Windows; refused everywhere so an
    // archive extracts the same on every host.
    if has_drive_prefix(&norm) {
        return Err(ArchiveError::invalid(format!("drive prefix is not portable: {raw:?}")));
    }
    // Trailing directory marker.
    if norm.ends_with('/') {
        norm.pop();
    }

    for comp in norm.split('/') {
        match comp {
            ".." => {
                return Err(ArchiveError::PathTraversal(format!("parent component in {raw:?}")));
            }
            "" => return Err(ArchiveError::invalid(format!("empty component in {raw:?}"))),
            "." => return Err(ArchiveError::invalid(format!("'.' component in {raw:?}"))),
            _ => {}
        }
    }

    if norm.len() > MAX_PATH_LEN {
        return Err(ArchiveError::invalid(format!(
            "path is {} bytes, limit is {MAX_PATH_LEN}: {norm:?}",
            norm.len()
        )));
    }

    Ok(NormalizedPath(norm))
}

/// Name of `path`, found while walking `root`, as stored in the archive.
pub fn from_fs(root: &Path, path: &Path) -> Result<NormalizedPath> {
    let rel = path
        .strip_prefix(root)
        .map_err(|_| ArchiveError::PathTraversal(path.display().to_string()))?;

    let mut out = String::new();
    for comp in rel.components() {
        match comp {
            Component::Normal(part) => {
                let part = part.to_str().ok_or_else(|| {
                    ArchiveError::invalid(format!("name is not UTF-8: {}", path.display()))
                })?;
                if !out.is_empty() {
                    out.push('/');
                }
                out.push_str(part);
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ArchiveError::PathTraversal(path.display().to_string()));
            }
        }
    }

    validate(&out)
}

fn has_drive_prefix(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() >= 2 && b[0].is_ascii_alphabetic() && b[1] == b':'
}
