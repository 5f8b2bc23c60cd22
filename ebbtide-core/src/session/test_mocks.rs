//! Simulated tracker transports for tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::torrent::{
    AnnounceEvent, AnnounceRequest, AnnounceResponse, TorrentError, TrackerClient,
};

/// In-memory tracker: records every announce and replies with a fixed
/// interval and peer list, or a connection failure.
pub(crate) struct ScriptedTracker {
    interval: u32,
    peers: Mutex<Vec<SocketAddr>>,
    fail: AtomicBool,
    events: Mutex<Vec<AnnounceEvent>>,
}

impl ScriptedTracker {
    pub(crate) fn ok(interval: u32) -> Self {
        Self {
            interval,
            peers: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            events: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing() -> Self {
        let tracker = Self::ok(1800);
        tracker.fail.store(true, Ordering::SeqCst);
        tracker
    }

    pub(crate) fn with_peers(self, peers: Vec<SocketAddr>) -> Self {
        *self.peers.lock() = peers;
        self
    }

    /// Every event announced so far, in order.
    pub(crate) fn events(&self) -> Vec<AnnounceEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl TrackerClient for ScriptedTracker {
    async fn announce(
        &self,
        announce_url: &str,
        request: AnnounceRequest,
    ) -> Result<AnnounceResponse, TorrentError> {
        self.events.lock().push(request.event);
        if self.fail.load(Ordering::SeqCst) {
            return Err(TorrentError::TrackerConnectionFailed {
                url: announce_url.to_string(),
            });
        }
        Ok(AnnounceResponse {
            interval: self.interval,
            peers: self.peers.lock().clone(),
        })
    }
}

/// Tracker that parks stopped-event announces until released, holding a
/// torrent observable in its teardown state.
pub(crate) struct GatedTracker {
    gate: Semaphore,
    events: Mutex<Vec<AnnounceEvent>>,
}

impl GatedTracker {
    pub(crate) fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Lets one parked stopped announce proceed.
    pub(crate) fn release_stop(&self) {
        self.gate.add_permits(1);
    }

    pub(crate) fn events(&self) -> Vec<AnnounceEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl TrackerClient for GatedTracker {
    async fn announce(
        &self,
        _announce_url: &str,
        request: AnnounceRequest,
    ) -> Result<AnnounceResponse, TorrentError> {
        self.events.lock().push(request.event);
        if request.event == AnnounceEvent::Stopped {
            let permit = self.gate.acquire().await.expect("gate never closes");
            permit.forget();
        }
        Ok(AnnounceResponse {
            interval: 1800,
            peers: Vec::new(),
        })
    }
}
