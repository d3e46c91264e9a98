//! C ABI for host applications.
//!
//! The `cdylib` build exports two symbols:
//!
//! ```c
//! int create_archive(const char *archive_path, const char *dir_path);
//! int extract_archive(const char *archive_path, const char *dir_path);
//! ```
//!
//! Both block until the operation finishes and return `0` on success or one
//! of the [`rc`] codes. Paths are NUL-terminated UTF-8. Both calls use the
//! library defaults: current format version, overwriting existing targets.
//!
//! # Thread safety
//! Each call owns its file handles for its whole duration. Concurrent calls
//! on the same archive path or on overlapping destination trees must be
//! serialized by the caller.

use std::ffi::CStr;
use std::os::raw::{c_char, c_int};
use std::panic::{self, AssertUnwindSafe};

use crate::error::{ArchiveError, ErrorKind, Result};

/// Return codes. Values are frozen.
pub mod rc {
    use super::{c_int, ErrorKind};

    pub const OK:               c_int = 0;
    pub const INVALID_ARGUMENT: c_int = ErrorKind::InvalidArgument as c_int;
    pub const IO:               c_int = ErrorKind::Io as c_int;
    pub const FORMAT:           c_int = ErrorKind::Format as c_int;
    pub const PATH_TRAVERSAL:   c_int = ErrorKind::PathTraversal as c_int;
    pub const ALREADY_EXISTS:   c_int = ErrorKind::AlreadyExists as c_int;
    /// The engine panicked; never expected in practice.
    pub const INTERNAL:         c_int = 99;
}

/// # Safety
/// `ptr` is null or points to a NUL-terminated string that stays valid for
/// the duration of the call.
unsafe fn path_arg<'a>(ptr: *const c_char, what: &str) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(ArchiveError::invalid(format!("{what} is null")));
    }
    let s = CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| ArchiveError::invalid(format!("{what} is not UTF-8")))?;
    if s.is_empty() {
        return Err(ArchiveError::invalid(format!("{what} is empty")));
    }
    Ok(s)
}

fn status(op: &str, result: Result<()>) -> c_int {
    match result {
        Ok(()) => rc::OK,
        Err(e) => {
            tracing::error!(op, code = e.code(), "{e}");
            e.code()
        }
    }
}

/// # Safety
/// Both pointers must satisfy the contract of [`path_arg`].
unsafe fn call(
    op:           &str,
    archive_path: *const c_char,
    dir_path:     *const c_char,
    f:            fn(&str, &str) -> Result<()>,
) -> c_int {
    let args = path_arg(archive_path, "archive path")
        .and_then(|a| Ok((a, path_arg(dir_path, "directory path")?)));
    let (archive, dir) = match args {
        Ok(v) => v,
        Err(e) => return status(op, Err(e)),
    };

    match panic::catch_unwind(AssertUnwindSafe(|| f(archive, dir))) {
        Ok(result) => status(op, result),
        Err(_) => {
            tracing::error!(op, "engine panicked");
            rc::INTERNAL
        }
    }
}

/// Pack the directory at `dir_path` into a new archive at `archive_path`.
///
/// # Safety
/// `archive_path` and `dir_path` must each be null or a valid pointer to a
/// NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn create_archive(
    archive_path: *const c_char,
    dir_path:     *const c_char,
) -> c_int {
    call("create_archive", archive_path, dir_path, |a, d| {
        crate::archiver::create_archive(a, d)
    })
}

/// Unpack the archive at `archive_path` into `dir_path`.
///
/// # Safety
/// Same contract as [`create_archive`].
#[no_mangle]
pub unsafe extern "C" fn extract_archive(
    archive_path: *const c_char,
    dir_path:     *const c_char,
) -> c_int {
    call("extract_archive", archive_path, dir_path, |a, d| {
        crate::extractor::extract_archive(a, d)
    })
}
