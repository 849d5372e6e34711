//! ZIP archive writing and inspection.
//!
//! ## Architecture
//!
//! - [`structures`]: ZIP records (local/central headers, data descriptor,
//!   EOCD) and DOS timestamp conversion
//! - [`writer`]: streaming writer used for downloads
//! - `reader`: central-directory reader for verifying written archives,
//!   compiled for tests and the `test-utils` feature only
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! The writer emits (1) as files are read and (2)–(3) once all entries are
//! done, so the output can go to a socket that cannot seek.
//!
//! ## Supported Features
//!
//! - DEFLATE for file data, STORED for directory entries
//! - UTF-8 entry names
//!
//! ## Limitations
//!
//! - No ZIP64: entries and archives are limited to 4 GiB, 65535 entries
//! - No encryption, no multi-disk archives

#[cfg(any(test, feature = "test-utils"))]
mod reader;
mod structures;
mod writer;

#[cfg(any(test, feature = "test-utils"))]
pub use reader::ZipReader;
pub use structures::*;
pub use writer::ZipStreamWriter;
