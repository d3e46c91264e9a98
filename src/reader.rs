//! Validated, read-only view of an archive on disk.
//!
//! [`ArchiveReader::open`] performs every structural check up front: header
//! magic and version, table placement, exact entry count, name policy and
//! per-entry bounds. Anything handed out afterwards is safe to act on.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::data::DataTableReader;
use crate::error::{ArchiveError, IoContext, Result};
use crate::header::ArchiveHeader;
use crate::table::{self, FileEntry};

/// Summary produced by [`ArchiveReader::verify`].
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct VerifyReport {
    pub files:       u64,
    pub directories: u64,
    pub data_bytes:  u64,
}

pub struct ArchiveReader {
    path:        PathBuf,
    header:      ArchiveHeader,
    entries:     Vec<FileEntry>,
    archive_len: u64,
    data:        DataTableReader<BufReader<File>>,
}

impl ArchiveReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.as_os_str().is_empty() {
            return Err(ArchiveError::invalid("empty archive path"));
        }

        let mut file = File::open(&path).at(&path)?;
        let archive_len = file.metadata().at(&path)?.len();

        let header = ArchiveHeader::read(&mut file)?;
        header.validate_layout(archive_len)?;

        file.seek(SeekFrom::Start(header.file_table_offset))?;
        let mut table_bytes = Vec::with_capacity(header.table_len() as usize);
        (&mut file).take(header.table_len()).read_to_end(&mut table_bytes)?;
        if table_bytes.len() as u64 != header.table_len() {
            return Err(ArchiveError::format("file table truncated"));
        }
        let entries = table::decode(&table_bytes, header.file_count, header.version)?;

        let data_len = archive_len - header.data_table_offset;
        let data = DataTableReader::new(BufReader::new(file), header.data_table_offset, data_len);
        for e in &entries {
            data.check_bounds(e)?;
        }

        debug!(
            archive = %path.display(),
            version = header.version,
            entries = entries.len(),
            data_len,
            "archive opened"
        );
        Ok(Self { path, header, entries, archive_len, data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &ArchiveHeader {
        &self.header
    }

    /// Entries in table order.
    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    pub fn archive_len(&self) -> u64 {
        self.archive_len
    }

    pub fn data_len(&self) -> u64 {
        self.data.data_len()
    }

    pub fn find(&self, name: &str) -> Option<&FileEntry> {
        self.entries.iter().find(|e| e.name.as_str() == name)
    }

    /// Stream one entry's content into `dest`.
    pub fn copy_entry<W: Write>(&mut self, entry: &FileEntry, dest: &mut W) -> Result<u64> {
        self.data.copy_to(entry, dest)
    }

    /// Whole content of the file entry called `name`.
    pub fn read_file(&mut self, name: &str) -> Result<Vec<u8>> {
        let entry = self
            .find(name)
            .cloned()
            .ok_or_else(|| ArchiveError::invalid(format!("no entry named {name:?}")))?;
        if entry.is_dir() {
            return Err(ArchiveError::invalid(format!("{name} is a directory")));
        }
        self.data.read_to_vec(&entry)
    }

    /// Stricter than what extraction needs: file ranges must tile the data
    /// region exactly in table order, and every byte must be readable.
    pub fn verify(&mut self) -> Result<VerifyReport> {
        let mut report = VerifyReport::default();
        let mut expected_offset = 0u64;

        for entry in self.entries.clone() {
            if entry.is_dir() {
                report.directories += 1;
                continue;
            }
            if entry.offset != expected_offset {
                return Err(ArchiveError::format(format!(
                    "{} starts at data offset {} but previous content ends at {expected_offset}",
                    entry.name, entry.offset
                )));
            }
            self.data.copy_to(&entry, &mut io::sink())?;
            expected_offset += entry.size;
            report.files += 1;
        }

        if expected_offset != self.data.data_len() {
            return Err(ArchiveError::format(format!(
                "{} unreferenced bytes at end of data region",
                self.data.data_len() - expected_offset
            )));
        }
        report.data_bytes = expected_offset;
        Ok(report)
    }
}
