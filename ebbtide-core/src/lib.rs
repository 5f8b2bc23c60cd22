//! Ebbtide Core - BitTorrent seeding engine
//!
//! This crate provides the building blocks for seeding torrents whose data
//! is already on disk: metainfo loading and validation, piece verification
//! against the declared hashes, tracker announces, and admission-controlled
//! peer connection management, all coordinated per torrent by a reactive
//! control loop.

pub mod config;
pub mod peer;
pub mod session;
pub mod storage;
pub mod sync;
pub mod torrent;

// Re-export main types for convenient access
pub use config::EbbtideConfig;
pub use session::{Activity, Session, TorrentOverview};
pub use storage::StorageError;
pub use torrent::{InfoHash, PeerId, PieceIndex, TorrentError, TorrentMetaInfo};
