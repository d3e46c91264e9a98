//! Fixed 32-byte archive header, always at offset 0.
//!
//! | Offset | Width | Field |
//! |-------:|------:|-------|
//! | 0  | 4 | magic `"SECU"` |
//! | 4  | 4 | version (u32 LE) |
//! | 8  | 8 | file_count (u64 LE) |
//! | 16 | 8 | file_table_offset (u64 LE) |
//! | 24 | 8 | data_table_offset (u64 LE) |

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use crate::error::{ArchiveError, Result};

pub const MAGIC: &[u8; 4] = b"SECU";

/// Length-prefixed entry names.
pub const CURRENT_VERSION: u32 = 2;
/// Fixed 512-byte NUL-padded entry names.
pub const MIN_SUPPORTED_VERSION: u32 = 1;

pub const HEADER_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ArchiveHeader {
    pub version:           u32,
    pub file_count:        u64,
    pub file_table_offset: u64,
    pub data_table_offset: u64,
}

impl ArchiveHeader {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            file_count:        0,
            file_table_offset: HEADER_SIZE as u64,
            data_table_offset: HEADER_SIZE as u64,
        }
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(MAGIC)?;
        writer.write_u32::<LittleEndian>(self.version)?;
        writer.write_u64::<LittleEndian>(self.file_count)?;
        writer.write_u64::<LittleEndian>(self.file_table_offset)?;
        writer.write_u64::<LittleEndian>(self.data_table_offset)?;
        Ok(())
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        // Writing into a correctly sized slice cannot fail.
        let _ = self.write(&mut buf[..]);
        buf
    }

    /// Decode and check magic and version. Does not look at offsets; see
    /// [`ArchiveHeader::validate_layout`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(ArchiveError::format(format!(
                "truncated header: {} of {HEADER_SIZE} bytes",
                bytes.len()
            )));
        }
        let mut cur = &bytes[..HEADER_SIZE];

        let mut magic = [0u8; 4];
        cur.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(ArchiveError::format(format!(
                "bad magic 0x{} (expected 0x{})",
                hex::encode(magic),
                hex::encode(MAGIC)
            )));
        }

        let version = cur.read_u32::<LittleEndian>()?;
        if !(MIN_SUPPORTED_VERSION..=CURRENT_VERSION).contains(&version) {
            return Err(ArchiveError::format(format!(
                "unsupported version {version} (supported {MIN_SUPPORTED_VERSION}..={CURRENT_VERSION})"
            )));
        }

        Ok(Self {
            version,
            file_count:        cur.read_u64::<LittleEndian>()?,
            file_table_offset: cur.read_u64::<LittleEndian>()?,
            data_table_offset: cur.read_u64::<LittleEndian>()?,
        })
    }

    /// Read exactly one header from `reader`. A short read is a format
    /// error, not an I/O error.
    pub fn read<R: Read>(reader: R) -> Result<Self> {
        let mut buf = Vec::with_capacity(HEADER_SIZE);
        reader.take(HEADER_SIZE as u64).read_to_end(&mut buf)?;
        Self::decode(&buf)
    }

    /// Check the offset invariants against the real archive length.
    pub fn validate_layout(&self, archive_len: u64) -> Result<()> {
        if self.file_table_offset < HEADER_SIZE as u64 {
            return Err(ArchiveError::format(format!(
                "file table offset {} overlaps the header",
                self.file_table_offset
            )));
        }
        if self.data_table_offset < self.file_table_offset {
            return Err(ArchiveError::format(format!(
                "data table offset {} precedes file table offset {}",
                self.data_table_offset, self.file_table_offset
            )));
        }
        if self.data_table_offset > archive_len {
            return Err(ArchiveError::format(format!(
                "data table offset {} beyond archive length {archive_len}",
                self.data_table_offset
            )));
        }
        Ok(())
    }

    pub fn table_len(&self) -> u64 {
        self.data_table_offset - self.file_table_offset
    }
}
