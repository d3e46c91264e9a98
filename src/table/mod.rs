//! File table codec.
//!
//! The table is a contiguous run of entries starting at
//! `file_table_offset` and ending exactly at `data_table_offset`. Entry
//! order is preserved in both directions: it fixes the data offsets on
//! the create path and the iteration order on the extract path.
//!
//! # Entry layouts
//!
//! Version 2 (current):
//!
//! ```text
//! [u16 name_len][name UTF-8][u64 offset][u64 size][u8 type]
//! ```
//!
//! Version 1 (legacy, 529 bytes per entry):
//!
//! ```text
//! [name, 512 bytes NUL-padded][u64 offset][u64 size][u8 type]
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashSet;
use std::io::{self, Read, Write};

use crate::error::{ArchiveError, ErrorKind, Result};
use crate::header::{CURRENT_VERSION, MIN_SUPPORTED_VERSION};
use crate::path::{self, NormalizedPath};

/// Width of the name slot in version 1 entries.
pub const LEGACY_NAME_LEN: usize = 512;
/// Size of one version 1 entry.
pub const LEGACY_ENTRY_SIZE: usize = LEGACY_NAME_LEN + 8 + 8 + 1;
/// Smallest possible version 2 entry (one-byte name).
const MIN_ENTRY_SIZE: usize = 2 + 1 + 8 + 8 + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum EntryType {
    File      = 0,
    Directory = 1,
}

impl EntryType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(EntryType::File),
            1 => Some(EntryType::Directory),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FileEntry {
    pub name:   NormalizedPath,
    /// Relative to `data_table_offset`.
    pub offset: u64,
    pub size:   u64,
    #[serde(rename = "type")]
    pub kind:   EntryType,
}

impl FileEntry {
    pub fn file(name: NormalizedPath, offset: u64, size: u64) -> Self {
        Self { name, offset, size, kind: EntryType::File }
    }

    pub fn directory(name: NormalizedPath) -> Self {
        Self { name, offset: 0, size: 0, kind: EntryType::Directory }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryType::Directory
    }

    /// Exclusive end of this entry's range inside the data region.
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.size)
    }
}

fn check_version(version: u32) -> Result<()> {
    if (MIN_SUPPORTED_VERSION..=CURRENT_VERSION).contains(&version) {
        Ok(())
    } else {
        Err(ArchiveError::invalid(format!("unsupported table version {version}")))
    }
}

/// Byte length of `entries` once encoded.
pub fn encoded_len(entries: &[FileEntry], version: u32) -> u64 {
    match version {
        1 => (entries.len() * LEGACY_ENTRY_SIZE) as u64,
        _ => entries
            .iter()
            .map(|e| (2 + e.name.as_str().len() + 8 + 8 + 1) as u64)
            .sum(),
    }
}

pub fn write_entry<W: Write>(mut w: W, entry: &FileEntry, version: u32) -> io::Result<()> {
    let name = entry.name.as_str().as_bytes();
    if version == 1 {
        let mut slot = [0u8; LEGACY_NAME_LEN];
        slot[..name.len()].copy_from_slice(name);
        w.write_all(&slot)?;
    } else {
        w.write_u16::<LittleEndian>(name.len() as u16)?;
        w.write_all(name)?;
    }
    w.write_u64::<LittleEndian>(entry.offset)?;
    w.write_u64::<LittleEndian>(entry.size)?;
    w.write_u8(entry.kind as u8)?;
    Ok(())
}

/// Serialize `entries` in the given order.
pub fn encode(entries: &[FileEntry], version: u32) -> Result<Vec<u8>> {
    check_version(version)?;
    let mut out = Vec::with_capacity(encoded_len(entries, version) as usize);
    for e in entries {
        write_entry(&mut out, e, version)?;
    }
    Ok(out)
}

/// Parse exactly `count` entries from `bytes`, which must hold nothing else.
pub fn decode(bytes: &[u8], count: u64, version: u32) -> Result<Vec<FileEntry>> {
    check_version(version).map_err(|_| {
        ArchiveError::format(format!("unsupported table version {version}"))
    })?;

    let min_size = if version == 1 { LEGACY_ENTRY_SIZE } else { MIN_ENTRY_SIZE };
    let fits = (bytes.len() / min_size) as u64;
    if count > fits {
        return Err(ArchiveError::format(format!(
            "file table of {} bytes cannot hold {count} entries",
            bytes.len()
        )));
    }
    if version == 1 && bytes.len() as u64 != count * LEGACY_ENTRY_SIZE as u64 {
        return Err(ArchiveError::format(format!(
            "file table is {} bytes, expected {count} x {LEGACY_ENTRY_SIZE}",
            bytes.len()
        )));
    }

    let mut cur = bytes;
    let mut entries = Vec::with_capacity(count as usize);
    for i in 0..count {
        let entry = read_entry(&mut cur, version).map_err(|e| match e {
            ArchiveError::Io(io) if io.kind() == io::ErrorKind::UnexpectedEof => {
                ArchiveError::format(format!("file table truncated in entry {i}"))
            }
            other => other,
        })?;
        entries.push(entry);
    }
    if !cur.is_empty() {
        return Err(ArchiveError::format(format!(
            "{} trailing bytes after {count} table entries",
            cur.len()
        )));
    }

    check_consistency(&entries)?;
    Ok(entries)
}

fn read_entry(cur: &mut &[u8], version: u32) -> Result<FileEntry> {
    let raw_name = if version == 1 {
        let mut slot = [0u8; LEGACY_NAME_LEN];
        cur.read_exact(&mut slot)?;
        let end = slot.iter().position(|&b| b == 0).unwrap_or(LEGACY_NAME_LEN);
        slot[..end].to_vec()
    } else {
        let len = cur.read_u16::<LittleEndian>()? as usize;
        let mut name = vec![0u8; len];
        cur.read_exact(&mut name)?;
        name
    };
    let offset = cur.read_u64::<LittleEndian>()?;
    let size = cur.read_u64::<LittleEndian>()?;
    let type_byte = cur.read_u8()?;

    let raw_name = String::from_utf8(raw_name)
        .map_err(|_| ArchiveError::format("entry name is not UTF-8"))?;
    let name = entry_name(&raw_name)?;
    let kind = EntryType::from_u8(type_byte).ok_or_else(|| {
        ArchiveError::format(format!("unknown entry type {type_byte} for {name}"))
    })?;

    if kind == EntryType::Directory && (offset != 0 || size != 0) {
        return Err(ArchiveError::format(format!(
            "directory entry {name} carries data range {offset}+{size}"
        )));
    }

    Ok(FileEntry { name, offset, size, kind })
}

/// Names read from an archive keep a traversal verdict; anything else
/// malformed means the archive itself is corrupt.
fn entry_name(raw: &str) -> Result<NormalizedPath> {
    path::validate(raw).map_err(|e| match e.kind() {
        ErrorKind::PathTraversal => e,
        _ => ArchiveError::format(format!("bad entry name {raw:?}: {e}")),
    })
}

/// Names are unique and no entry lives below a file entry.
fn check_consistency(entries: &[FileEntry]) -> Result<()> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(entries.len());
    for e in entries {
        if !seen.insert(e.name.as_str()) {
            return Err(ArchiveError::format(format!("duplicate entry {}", e.name)));
        }
    }

    let files: HashSet<&str> = entries
        .iter()
        .filter(|e| !e.is_dir())
        .map(|e| e.name.as_str())
        .collect();
    for e in entries {
        let mut name = e.name.as_str();
        while let Some(i) = name.rfind('/') {
            name = &name[..i];
            if files.contains(name) {
                return Err(ArchiveError::format(format!(
                    "entry {} is nested under file {name}",
                    e.name
                )));
            }
        }
    }
    Ok(())
}
