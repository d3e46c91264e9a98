//! Error taxonomy shared by every engine operation.
//!
//! Each [`ArchiveError`] belongs to exactly one [`ErrorKind`], and each kind
//! maps to a stable integer code used by the C ABI in [`crate::ffi`] and as
//! the CLI exit status.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Closed set of failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorKind {
    InvalidArgument = 1,
    Io              = 2,
    Format          = 3,
    PathTraversal   = 4,
    AlreadyExists   = 5,
}

impl ErrorKind {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::Io              => "i/o error",
            ErrorKind::Format          => "format error",
            ErrorKind::PathTraversal   => "path traversal",
            ErrorKind::AlreadyExists   => "already exists",
        }
    }
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("I/O error on {}: {source}", .path.display())]
    IoAt {
        path:   PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid archive: {0}")]
    Format(String),

    #[error("path escapes its root: {0}")]
    PathTraversal(String),

    #[error("already exists: {}", .0.display())]
    AlreadyExists(PathBuf),
}

impl ArchiveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ArchiveError::InvalidArgument(_)       => ErrorKind::InvalidArgument,
            ArchiveError::Io(_)
            | ArchiveError::IoAt { .. }            => ErrorKind::Io,
            ArchiveError::Format(_)                => ErrorKind::Format,
            ArchiveError::PathTraversal(_)         => ErrorKind::PathTraversal,
            ArchiveError::AlreadyExists(_)         => ErrorKind::AlreadyExists,
        }
    }

    /// Integer status for the C ABI and process exit codes. Never `0`.
    pub fn code(&self) -> i32 {
        self.kind().code()
    }

    pub(crate) fn format(msg: impl Into<String>) -> Self {
        ArchiveError::Format(msg.into())
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        ArchiveError::InvalidArgument(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Attaches the offending path to raw `io::Error`s.
pub(crate) trait IoContext<T> {
    fn at(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn at(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| ArchiveError::IoAt { path: path.into(), source })
    }
}
