//! Directory → archive.
//!
//! Three passes: discover the tree, lay out the table, emit everything in a
//! single forward write. Output goes to a temporary file next to the
//! destination and is renamed into place only once every byte has been
//! written, so a failed run never leaves a partial archive behind.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::data::{AppendError, DataTableWriter};
use crate::error::{ArchiveError, IoContext, Result};
use crate::header::{ArchiveHeader, CURRENT_VERSION, HEADER_SIZE, MIN_SUPPORTED_VERSION};
use crate::path::{self, NormalizedPath};
use crate::table::{self, EntryType, FileEntry};

// ── ArchiveOptions ────────────────────────────────────────────────────────────

/// Configuration for [`create_archive_with`].
#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    /// Table layout to write; `1` selects the fixed 512-byte NUL-padded name layout.
    pub format_version: u32,
    /// Replace an existing file at the archive path.
    pub overwrite:      bool,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            format_version: CURRENT_VERSION,
            overwrite:      true,
        }
    }
}

// ── Plan ──────────────────────────────────────────────────────────────────────

/// One object found under the source root.
#[derive(Debug, Clone)]
struct Discovered {
    name:   NormalizedPath,
    source: PathBuf,
    kind:   EntryType,
    size:   u64,
}

/// Fully computed archive layout. Nothing is written until this exists.
#[derive(Debug, Clone)]
pub struct ArchivePlan {
    pub header:  ArchiveHeader,
    pub entries: Vec<FileEntry>,
    /// Source path per entry, aligned with `entries`.
    sources:     Vec<PathBuf>,
}

impl ArchivePlan {
    /// Walk `dir` and compute the header and table for `version`.
    pub fn build(dir: &Path, version: u32) -> Result<Self> {
        let found = discover(dir)?;
        layout(found, version)
    }

    pub fn data_len(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }
}

fn discover(root: &Path) -> Result<Vec<Discovered>> {
    let mut found: Vec<Discovered> = Vec::new();

    for ent in WalkDir::new(root).follow_links(false).min_depth(1) {
        let ent = ent.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
            let msg = e.to_string();
            let io = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, msg));
            ArchiveError::IoAt { path, source: io }
        })?;

        let ft = ent.file_type();
        let kind = if ft.is_dir() {
            EntryType::Directory
        } else if ft.is_file() {
            EntryType::File
        } else {
            warn!(path = %ent.path().display(), "skipping symlink or special file");
            continue;
        };

        let name = path::from_fs(root, ent.path())?;
        found.push(Discovered {
            name,
            source: ent.path().to_path_buf(),
            kind,
            size: 0,
        });
    }

    stat_sizes(&mut found)?;

    // Byte order on the names; a directory always precedes its contents.
    found.sort_by(|a, b| a.name.as_str().as_bytes().cmp(b.name.as_str().as_bytes()));
    Ok(found)
}

fn stat_size(d: &Discovered) -> Result<u64> {
    match d.kind {
        EntryType::Directory => Ok(0),
        EntryType::File => Ok(fs::symlink_metadata(&d.source).at(&d.source)?.len()),
    }
}

fn stat_sizes(found: &mut [Discovered]) -> Result<()> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;

        found.par_iter_mut().try_for_each(|d| -> Result<()> {
            d.size = stat_size(d)?;
            Ok(())
        })
    }

    #[cfg(not(feature = "parallel"))]
    {
        for d in found.iter_mut() {
            d.size = stat_size(d)?;
        }
        Ok(())
    }
}

fn layout(found: Vec<Discovered>, version: u32) -> Result<ArchivePlan> {
    let mut entries = Vec::with_capacity(found.len());
    let mut sources = Vec::with_capacity(found.len());
    let mut data_end: u64 = 0;

    for d in found {
        let entry = match d.kind {
            EntryType::Directory => FileEntry::directory(d.name),
            EntryType::File => {
                let entry = FileEntry::file(d.name, data_end, d.size);
                data_end = data_end.checked_add(d.size).ok_or_else(|| {
                    ArchiveError::invalid("total content size overflows u64")
                })?;
                entry
            }
        };
        entries.push(entry);
        sources.push(d.source);
    }

    let file_table_offset = HEADER_SIZE as u64;
    let header = ArchiveHeader {
        version,
        file_count: entries.len() as u64,
        file_table_offset,
        data_table_offset: file_table_offset + table::encoded_len(&entries, version),
    };

    Ok(ArchivePlan { header, entries, sources })
}

// ── Emission ──────────────────────────────────────────────────────────────────

/// Write the whole archive to `out`. Write failures are reported against
/// `sink`, read failures against the source file.
fn emit<W: Write>(plan: &ArchivePlan, mut out: W, sink: &Path) -> Result<W> {
    plan.header.write(&mut out).at(sink)?;
    let table = table::encode(&plan.entries, plan.header.version)?;
    out.write_all(&table).at(sink)?;

    let mut data = DataTableWriter::new(&mut out);
    for (entry, source) in plan.entries.iter().zip(&plan.sources) {
        if entry.is_dir() {
            continue;
        }
        debug!(name = %entry.name, offset = entry.offset, size = entry.size, "packing");
        let src = File::open(source).at(source)?;
        data.append(entry, src).map_err(|e| match e {
            AppendError::Source(e) => ArchiveError::IoAt { path: source.clone(), source: e },
            AppendError::Sink(e) => ArchiveError::IoAt { path: sink.to_path_buf(), source: e },
        })?;
    }
    debug_assert_eq!(data.written(), plan.data_len());
    data.finish().at(sink)?;

    Ok(out)
}

// ── Entry points ──────────────────────────────────────────────────────────────

/// Pack `dir_path` into a new archive at `archive_path` with default options.
pub fn create_archive<A: AsRef<Path>, D: AsRef<Path>>(archive_path: A, dir_path: D) -> Result<()> {
    create_archive_with(archive_path, dir_path, &ArchiveOptions::default())
}

pub fn create_archive_with<A: AsRef<Path>, D: AsRef<Path>>(
    archive_path: A,
    dir_path:     D,
    opts:         &ArchiveOptions,
) -> Result<()> {
    let archive_path = archive_path.as_ref();
    let dir_path = dir_path.as_ref();

    if !(MIN_SUPPORTED_VERSION..=CURRENT_VERSION).contains(&opts.format_version) {
        return Err(ArchiveError::invalid(format!(
            "cannot write format version {}",
            opts.format_version
        )));
    }
    check_arguments(archive_path, dir_path, opts)?;

    info!(archive = %archive_path.display(), dir = %dir_path.display(), "creating archive");

    let plan = ArchivePlan::build(dir_path, opts.format_version)?;

    let parent = match archive_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = temp_file_in(parent).at(parent)?;
    let tmp_path = tmp.path().to_path_buf();

    let out = emit(&plan, BufWriter::new(tmp.as_file_mut()), &tmp_path)?;
    out.into_inner().map_err(|e| e.into_error()).at(&tmp_path)?;
    tmp.as_file().sync_all().at(&tmp_path)?;

    let persisted = if opts.overwrite {
        tmp.persist(archive_path)
    } else {
        tmp.persist_noclobber(archive_path)
    };
    persisted.map_err(|e| {
        if e.error.kind() == std::io::ErrorKind::AlreadyExists {
            ArchiveError::AlreadyExists(archive_path.to_path_buf())
        } else {
            ArchiveError::IoAt { path: archive_path.to_path_buf(), source: e.error }
        }
    })?;

    info!(
        archive = %archive_path.display(),
        entries = plan.header.file_count,
        data_bytes = plan.data_len(),
        "archive created"
    );
    Ok(())
}

/// Temporary output next to the destination. On unix it is opened with mode
/// `0o666` so the caller's umask decides the final permissions, as with a
/// plain `File::create`.
fn temp_file_in(dir: &Path) -> std::io::Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o666));
    }
    builder.tempfile_in(dir)
}

fn check_arguments(archive_path: &Path, dir_path: &Path, opts: &ArchiveOptions) -> Result<()> {
    if archive_path.as_os_str().is_empty() {
        return Err(ArchiveError::invalid("empty archive path"));
    }
    if dir_path.as_os_str().is_empty() {
        return Err(ArchiveError::invalid("empty directory path"));
    }

    match fs::metadata(dir_path) {
        Ok(m) if m.is_dir() => {}
        Ok(_) => {
            return Err(ArchiveError::invalid(format!("{} is not a directory", dir_path.display())));
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ArchiveError::invalid(format!("{} does not exist", dir_path.display())));
        }
        Err(e) => return Err(ArchiveError::IoAt { path: dir_path.to_path_buf(), source: e }),
    }

    match fs::symlink_metadata(archive_path) {
        Ok(m) if m.is_dir() => {
            return Err(ArchiveError::invalid(format!(
                "archive path {} is a directory",
                archive_path.display()
            )));
        }
        Ok(_) if !opts.overwrite => {
            return Err(ArchiveError::AlreadyExists(archive_path.to_path_buf()));
        }
        _ => {}
    }

    // An archive written inside the tree it packs would include itself.
    let root = fs::canonicalize(dir_path).at(dir_path)?;
    let parent = match archive_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    if let Ok(parent) = fs::canonicalize(parent) {
        if parent.starts_with(&root) {
            return Err(ArchiveError::invalid(format!(
                "archive {} would be written inside {}",
                archive_path.display(),
                dir_path.display()
            )));
        }
    }
    Ok(())
}
