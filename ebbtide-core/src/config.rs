//! Centralized configuration for Ebbtide.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::time::Duration;

/// Central configuration for all Ebbtide components.
///
/// Groups related configuration settings into logical sections.
#[derive(Debug, Clone, Default)]
pub struct EbbtideConfig {
    pub torrent: TorrentConfig,
    pub network: NetworkConfig,
}

/// BitTorrent protocol-specific configuration.
#[derive(Debug, Clone)]
pub struct TorrentConfig {
    /// BitTorrent client identifier, the 8-byte Azureus-style prefix of the
    /// generated peer id
    pub client_id: &'static str,
}

impl Default for TorrentConfig {
    fn default() -> Self {
        Self {
            client_id: "-EB0001-",
        }
    }
}

/// Network communication and tracker configuration.
///
/// Controls HTTP timeouts and the port reported to trackers.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// TCP port reported to trackers in announce requests
    pub listen_port: u16,
    /// HTTP request timeout for tracker communication
    pub tracker_timeout: Duration,
    /// User agent for HTTP requests
    pub user_agent: &'static str,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_port: 6881,
            tracker_timeout: Duration::from_secs(30),
            user_agent: "ebbtide/0.1.0",
        }
    }
}
