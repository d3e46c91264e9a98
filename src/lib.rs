//! SECU archive container engine.
//!
//! An archive is one file: a fixed [`header`], a [`table`] of entries and a
//! data region holding the raw bytes of every packed file.
//!
//! ```no_run
//! use secu_engine::{create_archive, extract_archive, ArchiveReader};
//!
//! create_archive("site.secu", "public/")?;
//! let reader = ArchiveReader::open("site.secu")?;
//! for entry in reader.entries() {
//!     println!("{} {}", entry.name, entry.size);
//! }
//! extract_archive("site.secu", "restored/")?;
//! # Ok::<(), secu_engine::ArchiveError>(())
//! ```

pub mod archiver;
pub mod data;
pub mod error;
pub mod extractor;
pub mod ffi;
pub mod header;
pub mod path;
pub mod reader;
pub mod table;

pub use archiver::{create_archive, create_archive_with, ArchiveOptions, ArchivePlan};
pub use error::{ArchiveError, ErrorKind, Result};
pub use extractor::{extract_archive, extract_archive_with, ExtractOptions};
pub use header::{ArchiveHeader, CURRENT_VERSION, HEADER_SIZE, MAGIC, MIN_SUPPORTED_VERSION};
pub use path::{NormalizedPath, MAX_PATH_LEN};
pub use reader::{ArchiveReader, VerifyReport};
pub use table::{EntryType, FileEntry};
