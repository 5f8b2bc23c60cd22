//! Torrent metadata and tracker communication.

pub mod bencode;
pub mod loader;
pub mod metainfo;
pub mod tracker;

use std::fmt;

pub use loader::{FetchError, fetch_torrent_url, load_torrent_bytes, load_torrent_file};
pub use metainfo::{TorrentFile, TorrentMetaInfo};
pub use tracker::{AnnounceEvent, AnnounceRequest, AnnounceResponse, HttpTracker, TrackerClient};

use crate::session::Activity;
use crate::storage::StorageError;

/// SHA-1 hash identifying a unique torrent.
///
/// 20-byte SHA-1 hash of the info dictionary from a torrent file.
/// Used as the opaque registry key for torrents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Creates InfoHash from 20-byte SHA-1 hash.
    pub fn new(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    /// Returns reference to underlying 20-byte hash.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Zero-based index of a piece within a torrent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PieceIndex(pub u32);

impl PieceIndex {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PieceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 20-byte peer identifier in the conventional Azureus shape: an 8-byte
/// client tag followed by 12 random decimal digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerId([u8; 20]);

impl PeerId {
    pub fn new(id: [u8; 20]) -> Self {
        Self(id)
    }

    /// Generates a fresh peer id for the given 8-byte client tag.
    pub fn generate(client_id: &str) -> Self {
        let mut id = [0u8; 20];
        id[..8].copy_from_slice(client_id.as_bytes());
        for byte in &mut id[8..] {
            *byte = b'0' + rand::random_range(0..10u8);
        }
        Self(id)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Errors that can occur during torrent operations.
#[derive(Debug, thiserror::Error)]
pub enum TorrentError {
    #[error("Failed to parse torrent file: {reason}")]
    InvalidTorrentFile { reason: String },

    #[error("Torrent is {actual}, operation requires {expected}")]
    BadState { expected: Activity, actual: Activity },

    #[error("Torrent {info_hash} not found")]
    TorrentNotFound { info_hash: InfoHash },

    #[error("Tracker connection failed: {url}")]
    TrackerConnectionFailed { url: String },

    #[error("Tracker rejected announce: {reason}")]
    TrackerFailure { reason: String },

    #[error("Protocol error: {message}")]
    ProtocolError { message: String },

    #[error("Storage error")]
    Storage(#[from] StorageError),

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}
