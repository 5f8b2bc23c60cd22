//! Session registry and the caller-facing torrent lifecycle API.
//!
//! A [`Session`] owns every registered torrent and is the only entry point
//! for lifecycle transitions. Background work (the per-torrent control
//! loop, piece verification, connection attempts, announce timers) runs in
//! spawned tasks that share each torrent's state cell but never own the
//! torrent itself.

mod announce;
mod manager;
pub(crate) mod state;
mod verify;

#[cfg(test)]
mod test_mocks;

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;

pub use state::Activity;
use state::{TorrentCtx, TorrentEntry};

use crate::config::EbbtideConfig;
use crate::storage;
use crate::torrent::{
    AnnounceEvent, HttpTracker, InfoHash, PeerId, TorrentError, TorrentMetaInfo, TrackerClient,
};

/// Snapshot of one registered torrent.
#[derive(Debug, Clone)]
pub struct TorrentOverview {
    pub name: String,
    pub activity: Activity,
    pub verified_pieces: u32,
    pub total_pieces: u32,
    pub connected_peers: usize,
}

/// Process-wide torrent registry and lifecycle front door.
///
/// Explicitly constructed and explicitly closed; there is no ambient
/// singleton. All methods take `&self` and are safe to call from any task.
pub struct Session {
    peer_id: PeerId,
    config: EbbtideConfig,
    tracker: Arc<dyn TrackerClient>,
    torrents: RwLock<HashMap<InfoHash, Arc<TorrentEntry>>>,
}

impl Session {
    /// Creates a session announcing over HTTP(S).
    pub fn new(config: EbbtideConfig) -> Self {
        let tracker = Arc::new(HttpTracker::new(&config.network));
        Self::with_tracker(config, tracker)
    }

    /// Creates a session with an injected tracker transport.
    pub fn with_tracker(config: EbbtideConfig, tracker: Arc<dyn TrackerClient>) -> Self {
        let peer_id = PeerId::generate(config.torrent.client_id);
        tracing::info!("session initialized with peer id {peer_id}");
        Self {
            peer_id,
            config,
            tracker,
            torrents: RwLock::new(HashMap::new()),
        }
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// Registers a torrent whose data already exists under `local_path`.
    ///
    /// The local layout is checked against the declaration first: every
    /// declared file must exist, be readable, and have exactly the declared
    /// length. Any mismatch, and likewise an already-registered infohash,
    /// leaves the registry untouched and returns `false`. The check is a
    /// best-effort precondition: matching lengths say nothing about
    /// content, which is what verification is for.
    pub async fn add_torrent(&self, meta: TorrentMetaInfo, local_path: impl Into<PathBuf>) -> bool {
        let root = local_path.into();
        let info_hash = meta.info_hash();

        if let Err(e) = storage::validate_layout(&meta, &root).await {
            tracing::warn!("rejecting torrent {info_hash}: local data does not match: {e}");
            return false;
        }

        let entry = Arc::new(TorrentEntry::new(meta, root));
        match self.torrents.write().entry(info_hash) {
            Entry::Occupied(_) => {
                tracing::warn!("torrent {info_hash} is already registered");
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(entry);
                tracing::info!("registered torrent {info_hash}");
                true
            }
        }
    }

    /// Snapshot of every registered torrent, keyed by infohash.
    pub fn active_torrents(&self) -> HashMap<InfoHash, TorrentOverview> {
        self.torrents
            .read()
            .iter()
            .map(|(info_hash, entry)| {
                let (activity, verified_pieces, connected_peers) = entry.shared.read(|s| {
                    (
                        s.activity,
                        s.completion.iter().filter(|&&c| c).count() as u32,
                        s.peers.len(),
                    )
                });
                (
                    *info_hash,
                    TorrentOverview {
                        name: entry.meta.name().to_string(),
                        activity,
                        verified_pieces,
                        total_pieces: entry.meta.num_pieces(),
                        connected_peers,
                    },
                )
            })
            .collect()
    }

    /// Current lifecycle state of a torrent.
    ///
    /// # Errors
    /// - `TorrentError::TorrentNotFound` - Unknown infohash
    pub fn activity(&self, info_hash: InfoHash) -> Result<Activity, TorrentError> {
        Ok(self.entry(info_hash)?.shared.read(|s| s.activity))
    }

    /// Per-piece verification results of a torrent.
    ///
    /// # Errors
    /// - `TorrentError::TorrentNotFound` - Unknown infohash
    pub fn completion(&self, info_hash: InfoHash) -> Result<Vec<bool>, TorrentError> {
        Ok(self.entry(info_hash)?.shared.read(|s| s.completion.clone()))
    }

    /// Queues a manual peer candidate for the next admission round.
    ///
    /// Accepted in any activity state; the candidate sits in the queue
    /// until a control loop drains it.
    ///
    /// # Errors
    /// - `TorrentError::TorrentNotFound` - Unknown infohash
    pub fn add_peer(&self, info_hash: InfoHash, addr: SocketAddr) -> Result<(), TorrentError> {
        let entry = self.entry(info_hash)?;
        entry.shared.update(|s| s.potential_peers.push_back(addr));
        tracing::debug!("queued manual peer {addr} for {info_hash}");
        Ok(())
    }

    /// Starts verifying a torrent's on-disk data against its piece hashes.
    ///
    /// Returns `Ok(false)` without side effects unless the torrent is
    /// currently `Stopped`. On acceptance the torrent moves to `Verifying`
    /// and a background verifier walks the pieces, returning the torrent
    /// to `Stopped` when it completes.
    ///
    /// # Errors
    /// - `TorrentError::TorrentNotFound` - Unknown infohash
    pub fn begin_verifying(&self, info_hash: InfoHash) -> Result<bool, TorrentError> {
        let entry = self.entry(info_hash)?;

        let accepted = entry.shared.update(|s| {
            if s.activity == Activity::Stopped {
                s.activity = Activity::Verifying;
                true
            } else {
                false
            }
        });

        if accepted {
            tokio::spawn(verify::run(entry));
        }
        Ok(accepted)
    }

    /// Starts seeding a torrent.
    ///
    /// Transitions `Stopped → Running`, performs the initial announce with
    /// the started event (blocking the caller for the tracker round-trip;
    /// announce failures are absorbed and retried on the announce timer),
    /// then launches the torrent's control loop.
    ///
    /// # Errors
    /// - `TorrentError::TorrentNotFound` - Unknown infohash
    /// - `TorrentError::BadState` - The torrent is not `Stopped`
    pub async fn start_torrent(&self, info_hash: InfoHash) -> Result<(), TorrentError> {
        let entry = self.entry(info_hash)?;

        entry.shared.update(|s| match s.activity {
            Activity::Stopped => {
                s.activity = Activity::Running;
                Ok(())
            }
            actual => Err(TorrentError::BadState {
                expected: Activity::Stopped,
                actual,
            }),
        })?;

        tracing::info!("starting torrent {info_hash}");
        let ctx = Arc::new(TorrentCtx {
            entry,
            tracker: Arc::clone(&self.tracker),
            peer_id: self.peer_id,
            config: self.config.clone(),
        });

        announce::announce(&ctx, AnnounceEvent::Started).await;
        tokio::spawn(manager::run(ctx));
        Ok(())
    }

    /// Requests that a seeding torrent stop.
    ///
    /// Transitions `Running → Stopping` and returns immediately; the
    /// control loop's teardown path tears down every connection, reports
    /// the stopped event, and drives the torrent to `Stopped`.
    ///
    /// # Errors
    /// - `TorrentError::TorrentNotFound` - Unknown infohash
    /// - `TorrentError::BadState` - The torrent is not `Running`
    pub fn stop_torrent(&self, info_hash: InfoHash) -> Result<(), TorrentError> {
        let entry = self.entry(info_hash)?;

        entry.shared.update(|s| match s.activity {
            Activity::Running => {
                s.activity = Activity::Stopping;
                Ok(())
            }
            actual => Err(TorrentError::BadState {
                expected: Activity::Running,
                actual,
            }),
        })?;

        tracing::info!("stop requested for torrent {info_hash}");
        Ok(())
    }

    /// Releases session-wide resources.
    ///
    /// Torrent teardown happens per torrent via [`Session::stop_torrent`];
    /// nothing session-global needs releasing yet, but this is the final
    /// operation on a session and callers should treat it as such.
    pub fn close(self) {
        tracing::info!("session closed");
    }

    fn entry(&self, info_hash: InfoHash) -> Result<Arc<TorrentEntry>, TorrentError> {
        self.torrents
            .read()
            .get(&info_hash)
            .cloned()
            .ok_or(TorrentError::TorrentNotFound { info_hash })
    }
}
