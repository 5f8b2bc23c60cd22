//! Core types for BitTorrent tracker communication.

use std::net::SocketAddr;

use async_trait::async_trait;

use crate::torrent::{InfoHash, TorrentError};

/// Client state change reported to the tracker with an announce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnounceEvent {
    /// Regular periodic announce, no state change
    None,
    /// Client began seeding this torrent
    Started,
    /// Client stopped seeding this torrent
    Stopped,
}

/// Tracker announce request.
///
/// Client statistics and torrent identity sent with every announce.
#[derive(Debug, Clone)]
pub struct AnnounceRequest {
    /// Torrent being announced
    pub info_hash: InfoHash,
    /// Client's unique 20-byte identifier
    pub peer_id: [u8; 20],
    /// TCP port the client listens on for peer connections
    pub port: u16,
    /// Total bytes uploaded to other peers
    pub uploaded: u64,
    /// Total bytes downloaded from other peers
    pub downloaded: u64,
    /// Bytes remaining to download; 0 for seeders
    pub left: u64,
    /// Current client state for this torrent
    pub event: AnnounceEvent,
}

/// Tracker announce response.
#[derive(Debug, Clone)]
pub struct AnnounceResponse {
    /// Seconds until the next announce is due
    pub interval: u32,
    /// Candidate peer addresses for connection attempts
    pub peers: Vec<SocketAddr>,
}

/// Abstract tracker transport.
///
/// One announce exchange per call; the URL is supplied per call because a
/// single transport serves every torrent in a session. Implementations
/// handle protocol details while tests substitute simulated transports.
#[async_trait]
pub trait TrackerClient: Send + Sync {
    /// Announces client presence to the tracker and retrieves a renewal
    /// interval plus a fresh candidate peer list.
    ///
    /// # Errors
    /// - `TorrentError::TrackerConnectionFailed` - Network or HTTP failure
    /// - `TorrentError::TrackerFailure` - Tracker explicitly rejected the announce
    /// - `TorrentError::ProtocolError` - Response was not a valid tracker reply
    async fn announce(
        &self,
        announce_url: &str,
        request: AnnounceRequest,
    ) -> Result<AnnounceResponse, TorrentError>;
}
