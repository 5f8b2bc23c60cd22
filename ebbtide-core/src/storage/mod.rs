//! Local file access for torrent data.
//!
//! Maps the declared torrent layout onto a local directory, checks that the
//! files on disk match the declaration, and reads piece-sized byte ranges
//! across file boundaries.

pub mod files;

use std::path::PathBuf;

pub use files::{read_piece, read_range, validate_layout};

/// Errors that occur while accessing torrent data on disk.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Declared file {path} is missing")]
    FileMissing { path: PathBuf },

    #[error("File {path} has length {actual}, declared {expected}")]
    LengthMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("Byte range at offset {offset} of length {length} exceeds torrent data of {total} bytes")]
    RangeOutOfBounds {
        offset: u64,
        length: u64,
        total: u64,
    },

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}
