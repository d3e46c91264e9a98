//! Data table streaming.
//!
//! [`DataTableWriter`] appends file contents in table order and refuses any
//! entry whose offset is not the current end of the region, so the offsets
//! assigned during layout and the bytes actually written cannot drift.
//! [`DataTableReader`] copies a declared range back out after checking it
//! against the region's real extent.

use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::error::{ArchiveError, Result};
use crate::table::FileEntry;

// ── Writer ───────────────────────────────────────────────────────────────────

/// Failure while appending one entry, split by the side that caused it.
#[derive(Debug)]
pub enum AppendError {
    /// Reading the source failed, or it no longer matches its declared size.
    Source(io::Error),
    /// Writing the archive failed, or the entry does not start at the region end.
    Sink(io::Error),
}

const COPY_BUF: usize = 64 * 1024;

pub struct DataTableWriter<W: Write> {
    writer:  W,
    written: u64,
}

impl<W: Write> DataTableWriter<W> {
    /// `writer` must already be positioned at `data_table_offset`.
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// Stream exactly `entry.size` bytes from `src`.
    ///
    /// Fails if `src` yields fewer or more bytes than declared, which means
    /// the source changed between discovery and emission.
    pub fn append<R: Read>(
        &mut self,
        entry:   &FileEntry,
        mut src: R,
    ) -> std::result::Result<(), AppendError> {
        if entry.offset != self.written {
            return Err(AppendError::Sink(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "{} laid out at data offset {} but region ends at {}",
                    entry.name, entry.offset, self.written
                ),
            )));
        }

        let mut buf = vec![0u8; entry.size.clamp(1, COPY_BUF as u64) as usize];
        let mut remaining = entry.size;
        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            let n = match src.read(&mut buf[..want]) {
                Ok(0) => {
                    return Err(AppendError::Source(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!(
                            "{} shrank to {} of {} bytes while archiving",
                            entry.name,
                            entry.size - remaining,
                            entry.size
                        ),
                    )));
                }
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(AppendError::Source(e)),
            };
            self.writer.write_all(&buf[..n]).map_err(AppendError::Sink)?;
            remaining -= n as u64;
        }

        let mut extra = [0u8; 1];
        loop {
            match src.read(&mut extra) {
                Ok(0) => break,
                Ok(_) => {
                    return Err(AppendError::Source(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("{} grew past {} bytes while archiving", entry.name, entry.size),
                    )));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(AppendError::Source(e)),
            }
        }

        self.written += entry.size;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn finish(mut self) -> io::Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

// ── Reader ───────────────────────────────────────────────────────────────────

pub struct DataTableReader<R: Read + Seek> {
    reader:            R,
    data_table_offset: u64,
    data_len:          u64,
}

impl<R: Read + Seek> DataTableReader<R> {
    pub fn new(reader: R, data_table_offset: u64, data_len: u64) -> Self {
        Self { reader, data_table_offset, data_len }
    }

    pub fn data_len(&self) -> u64 {
        self.data_len
    }

    /// `offset + size` must lie inside the data region.
    pub fn check_bounds(&self, entry: &FileEntry) -> Result<()> {
        match entry.end() {
            Some(end) if end <= self.data_len => Ok(()),
            _ => Err(ArchiveError::format(format!(
                "{} spans {}+{} past the {}-byte data region",
                entry.name, entry.offset, entry.size, self.data_len
            ))),
        }
    }

    /// Copy the entry's bytes into `dest`, returning the count written.
    pub fn copy_to<W: Write>(&mut self, entry: &FileEntry, dest: &mut W) -> Result<u64> {
        self.check_bounds(entry)?;
        self.reader
            .seek(SeekFrom::Start(self.data_table_offset + entry.offset))?;
        let copied = io::copy(&mut (&mut self.reader).take(entry.size), dest)?;
        if copied != entry.size {
            return Err(ArchiveError::format(format!(
                "{} truncated: {copied} of {} bytes present",
                entry.name, entry.size
            )));
        }
        Ok(copied)
    }

    pub fn read_to_vec(&mut self, entry: &FileEntry) -> Result<Vec<u8>> {
        self.check_bounds(entry)?;
        let mut out = Vec::with_capacity(entry.size as usize);
        self.copy_to(entry, &mut out)?;
        Ok(out)
    }
}
