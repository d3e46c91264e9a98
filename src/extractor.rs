//! Archive → directory.
//!
//! The whole archive is validated through [`ArchiveReader::open`] before the
//! first byte lands on disk. After that, entries are materialized in table
//! order; an I/O failure part-way through stops extraction and leaves the
//! entries already written in place.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tracing::{debug, info};

use crate::error::{ArchiveError, IoContext, Result};
use crate::path::NormalizedPath;
use crate::reader::ArchiveReader;
use crate::table::EntryType;

/// Configuration for [`extract_archive_with`].
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Truncate and rewrite files that already exist at the destination.
    pub overwrite: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self { overwrite: true }
    }
}

/// Unpack `archive_path` into `dir_path` with default options.
pub fn extract_archive<A: AsRef<Path>, D: AsRef<Path>>(archive_path: A, dir_path: D) -> Result<()> {
    extract_archive_with(archive_path, dir_path, &ExtractOptions::default())
}

pub fn extract_archive_with<A: AsRef<Path>, D: AsRef<Path>>(
    archive_path: A,
    dir_path:     D,
    opts:         &ExtractOptions,
) -> Result<()> {
    let archive_path = archive_path.as_ref();
    let dir_path = dir_path.as_ref();
    if dir_path.as_os_str().is_empty() {
        return Err(ArchiveError::invalid("empty destination path"));
    }

    let mut reader = ArchiveReader::open(archive_path)?;
    info!(
        archive = %archive_path.display(),
        dir = %dir_path.display(),
        entries = reader.entries().len(),
        "extracting archive"
    );

    let source = fs::canonicalize(archive_path).at(archive_path)?;
    fs::create_dir_all(dir_path).at(dir_path)?;

    let entries = reader.entries().to_vec();
    for entry in &entries {
        let dest = entry.name.to_fs_path(dir_path);
        ensure_parents(dir_path, &entry.name)?;

        match entry.kind {
            EntryType::Directory => {
                debug!(name = %entry.name, "mkdir");
                ensure_dir(&dest)?;
            }
            EntryType::File => {
                debug!(name = %entry.name, size = entry.size, "unpacking");
                check_file_target(&dest, &source, opts)?;
                let file = File::create(&dest).at(&dest)?;
                let mut out = BufWriter::new(file);
                reader.copy_entry(entry, &mut out)?;
                out.flush().at(&dest)?;
            }
        }
    }

    info!(archive = %archive_path.display(), "extraction complete");
    Ok(())
}

/// Create every missing ancestor of `name` below `root`.
fn ensure_parents(root: &Path, name: &NormalizedPath) -> Result<()> {
    let mut dir = root.to_path_buf();
    let comps: Vec<&str> = name.components().collect();
    for comp in &comps[..comps.len().saturating_sub(1)] {
        dir.push(comp);
        ensure_dir(&dir)?;
    }
    Ok(())
}

/// `path` must end up a real directory. An existing symlink is refused so a
/// crafted entry cannot redirect later writes outside the destination.
fn ensure_dir(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(m) if m.file_type().is_symlink() => Err(ArchiveError::PathTraversal(format!(
            "{} is a symlink",
            path.display()
        ))),
        Ok(m) if m.is_dir() => Ok(()),
        Ok(_) => Err(ArchiveError::AlreadyExists(path.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => fs::create_dir(path).at(path),
        Err(e) => Err(ArchiveError::IoAt { path: path.to_path_buf(), source: e }),
    }
}

/// `archive` is the canonical path of the archive being read; it is never
/// a valid target.
fn check_file_target(path: &Path, archive: &Path, opts: &ExtractOptions) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(m) if m.file_type().is_symlink() => Err(ArchiveError::PathTraversal(format!(
            "{} is a symlink",
            path.display()
        ))),
        Ok(m) if m.is_dir() => Err(ArchiveError::AlreadyExists(path.to_path_buf())),
        Ok(_) => {
            if fs::canonicalize(path).at(path)? == archive {
                return Err(ArchiveError::invalid(format!(
                    "{} is the archive being extracted",
                    path.display()
                )));
            }
            if !opts.overwrite {
                return Err(ArchiveError::AlreadyExists(path.to_path_buf()));
            }
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ArchiveError::IoAt { path: path.to_path_buf(), source: e }),
    }
}
