//! Loading torrent metadata from bytes, files and URLs.

use std::path::Path;

use super::bencode;
use super::metainfo::TorrentMetaInfo;
use super::TorrentError;

/// Failure modes when fetching a torrent document by URL.
///
/// Distinguishes a URL that never named a resource, a transport that could
/// not deliver it, and a delivered document that is not a torrent.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Invalid torrent URL")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Failed to fetch torrent")]
    Transport(#[from] reqwest::Error),

    #[error("Fetched data is not a valid torrent")]
    NotATorrent(#[from] TorrentError),
}

/// Decodes and validates torrent metadata from raw bencode bytes.
///
/// # Errors
/// - `TorrentError::InvalidTorrentFile` - Malformed bencode or inconsistent
///   declared lengths
pub fn load_torrent_bytes(torrent_bytes: &[u8]) -> Result<TorrentMetaInfo, TorrentError> {
    bencode::parse_metainfo(torrent_bytes)
}

/// Reads a `.torrent` file from disk and decodes it.
///
/// # Errors
/// - `TorrentError::Io` - File could not be read
/// - `TorrentError::InvalidTorrentFile` - File contents are not a torrent
pub async fn load_torrent_file(path: &Path) -> Result<TorrentMetaInfo, TorrentError> {
    let contents = tokio::fs::read(path).await?;
    load_torrent_bytes(&contents)
}

/// Fetches a `.torrent` document over HTTP(S) and decodes it.
///
/// # Errors
/// - `FetchError::InvalidUrl` - The URL does not parse
/// - `FetchError::Transport` - The HTTP exchange failed
/// - `FetchError::NotATorrent` - The response body is not a valid torrent
pub async fn fetch_torrent_url(torrent_url: &str) -> Result<TorrentMetaInfo, FetchError> {
    let parsed = url::Url::parse(torrent_url)?;
    tracing::debug!("fetching torrent from {parsed}");

    let response = reqwest::get(parsed).await?.error_for_status()?;
    let body = response.bytes().await?;

    Ok(load_torrent_bytes(&body)?)
}
