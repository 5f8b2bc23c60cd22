//! HTTP tracker transport with URL building and response parsing.

use std::net::SocketAddr;

use async_trait::async_trait;

use super::types::{AnnounceEvent, AnnounceRequest, AnnounceResponse, TrackerClient};
use crate::config::NetworkConfig;
use crate::torrent::TorrentError;

/// HTTP tracker transport implementation.
pub struct HttpTracker {
    client: reqwest::Client,
}

impl HttpTracker {
    /// Creates the HTTP transport with timeout and user agent from network
    /// configuration.
    pub fn new(config: &NetworkConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(config.tracker_timeout)
                .user_agent(config.user_agent)
                .redirect(reqwest::redirect::Policy::limited(3))
                .build()
                .expect("HTTP client creation should not fail"),
        }
    }

    /// Build announce URL with query parameters.
    ///
    /// The info hash and peer id are raw bytes and must be percent-encoded
    /// by hand to avoid double-encoding.
    fn build_announce_url(announce_url: &str, request: &AnnounceRequest) -> String {
        let mut query = format!(
            "info_hash={}&peer_id={}&port={}&uploaded={}&downloaded={}&left={}&compact=1",
            url_encode_bytes(request.info_hash.as_bytes()),
            url_encode_bytes(&request.peer_id),
            request.port,
            request.uploaded,
            request.downloaded,
            request.left,
        );
        if let Some(event) = event_name(request.event) {
            query.push_str("&event=");
            query.push_str(event);
        }

        let separator = if announce_url.contains('?') { '&' } else { '?' };
        format!("{announce_url}{separator}{query}")
    }

    /// Parse a bencoded announce response.
    fn parse_announce_response(response_bytes: &[u8]) -> Result<AnnounceResponse, TorrentError> {
        let parsed = bencode_rs::Value::parse(response_bytes).map_err(|e| {
            TorrentError::ProtocolError {
                message: format!("Failed to parse tracker response: {e:?}"),
            }
        })?;

        let Some(bencode_rs::Value::Dictionary(dict)) = parsed.first() else {
            return Err(TorrentError::ProtocolError {
                message: "Tracker response is not a dictionary".to_string(),
            });
        };

        if let Some(bencode_rs::Value::Bytes(reason)) = dict.get(b"failure reason".as_slice()) {
            return Err(TorrentError::TrackerFailure {
                reason: String::from_utf8_lossy(reason).to_string(),
            });
        }

        let interval = match dict.get(b"interval".as_slice()) {
            Some(bencode_rs::Value::Integer(value)) if *value >= 0 => *value as u32,
            _ => {
                return Err(TorrentError::ProtocolError {
                    message: "Missing interval in tracker response".to_string(),
                });
            }
        };

        let peers = match dict.get(b"peers".as_slice()) {
            Some(bencode_rs::Value::Bytes(peer_data)) => parse_compact_peers(peer_data)?,
            _ => Vec::new(),
        };

        Ok(AnnounceResponse { interval, peers })
    }
}

#[async_trait]
impl TrackerClient for HttpTracker {
    async fn announce(
        &self,
        announce_url: &str,
        request: AnnounceRequest,
    ) -> Result<AnnounceResponse, TorrentError> {
        let url = Self::build_announce_url(announce_url, &request);
        tracing::debug!("announcing to tracker: {announce_url}");

        let response = self.client.get(&url).send().await.map_err(|e| {
            tracing::warn!("HTTP request to {announce_url} failed: {e}");
            TorrentError::TrackerConnectionFailed {
                url: announce_url.to_string(),
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("tracker {announce_url} returned error status: {status}");
            return Err(TorrentError::TrackerConnectionFailed {
                url: announce_url.to_string(),
            });
        }

        let response_bytes =
            response
                .bytes()
                .await
                .map_err(|_| TorrentError::TrackerConnectionFailed {
                    url: announce_url.to_string(),
                })?;

        Self::parse_announce_response(&response_bytes)
    }
}

/// Percent-encode raw bytes per RFC 3986.
fn url_encode_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| format!("%{b:02X}")).collect()
}

/// Wire name of an announce event; regular announces carry no event.
fn event_name(event: AnnounceEvent) -> Option<&'static str> {
    match event {
        AnnounceEvent::None => None,
        AnnounceEvent::Started => Some("started"),
        AnnounceEvent::Stopped => Some("stopped"),
    }
}

/// Parse the compact peer format: 6 bytes per peer, IPv4 + big-endian port.
fn parse_compact_peers(peer_bytes: &[u8]) -> Result<Vec<SocketAddr>, TorrentError> {
    if !peer_bytes.len().is_multiple_of(6) {
        return Err(TorrentError::ProtocolError {
            message: "Invalid compact peer data length".to_string(),
        });
    }

    let mut peers = Vec::with_capacity(peer_bytes.len() / 6);
    for chunk in peer_bytes.chunks(6) {
        let ip = std::net::Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
        let port = u16::from_be_bytes([chunk[4], chunk[5]]);
        peers.push(SocketAddr::V4(std::net::SocketAddrV4::new(ip, port)));
    }

    Ok(peers)
}
