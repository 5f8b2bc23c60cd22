//! Per-torrent shared state and activity lifecycle.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::task::AbortHandle;

use crate::config::EbbtideConfig;
use crate::sync::Shared;
use crate::torrent::{PeerId, TorrentMetaInfo, TrackerClient};

/// Lifecycle state of a torrent within a session.
///
/// `Stopped` and `Verifying` never coexist with a live control loop; a
/// control loop runs exactly while the torrent is `Running` or `Stopping`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    /// No background activity
    Stopped,
    /// Piece verifier walking the data
    Verifying,
    /// Control loop announcing and admitting peers
    Running,
    /// Shutdown requested, teardown in progress
    Stopping,
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Activity::Stopped => "stopped",
            Activity::Verifying => "verifying",
            Activity::Running => "running",
            Activity::Stopping => "stopping",
        };
        write!(f, "{name}")
    }
}

/// Opaque identity of one connection attempt or established peer.
///
/// Identifies the owning task across the pending and established sets so
/// teardown can abort it without caring which set it is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ConnId(u64);

impl ConnId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// An established peer connection: remote address plus the handle that
/// forcefully terminates its task.
#[derive(Debug)]
pub(crate) struct PeerHandle {
    pub addr: SocketAddr,
    pub abort: AbortHandle,
}

/// Mutable state of one torrent, owned by a [`Shared`] cell.
///
/// Every read-modify-write of these fields goes through the cell, which is
/// what makes the control loop's checked-and-acted transitions sound.
pub(crate) struct TorrentState {
    pub activity: Activity,
    /// Per-piece verification result, written only by the verifier
    pub completion: Vec<bool>,
    /// Established peer connections
    pub peers: HashMap<ConnId, PeerHandle>,
    /// Connection attempts not yet established
    pub connections_in_progress: HashMap<ConnId, AbortHandle>,
    /// Candidate addresses not yet attempted
    pub potential_peers: VecDeque<SocketAddr>,
    /// True when the scheduled announce is due
    pub announce_due: bool,
    /// Generation counter for the announce timer; a timer only fires the
    /// flag if its generation is still current
    pub announce_epoch: u64,
}

impl TorrentState {
    pub(crate) fn new(num_pieces: u32) -> Self {
        Self {
            activity: Activity::Stopped,
            completion: vec![false; num_pieces as usize],
            peers: HashMap::new(),
            connections_in_progress: HashMap::new(),
            potential_peers: VecDeque::new(),
            announce_due: false,
            announce_epoch: 0,
        }
    }

    /// Invalidates any scheduled announce timer and lowers the due flag.
    pub(crate) fn reset_announce_timer(&mut self) {
        self.announce_due = false;
        self.announce_epoch += 1;
    }
}

/// One registered torrent: immutable metadata, its local data root, and the
/// shared mutable state cell.
pub(crate) struct TorrentEntry {
    pub meta: Arc<TorrentMetaInfo>,
    pub root: PathBuf,
    pub shared: Arc<Shared<TorrentState>>,
}

impl TorrentEntry {
    pub(crate) fn new(meta: TorrentMetaInfo, root: PathBuf) -> Self {
        let num_pieces = meta.num_pieces();
        Self {
            meta: Arc::new(meta),
            root,
            shared: Arc::new(Shared::new(TorrentState::new(num_pieces))),
        }
    }
}

/// Everything a per-torrent background task needs to do its job.
pub(crate) struct TorrentCtx {
    pub entry: Arc<TorrentEntry>,
    pub tracker: Arc<dyn TrackerClient>,
    pub peer_id: PeerId,
    pub config: EbbtideConfig,
}
