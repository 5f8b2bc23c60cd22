//! Per-torrent control loop: teardown, announce cadence, peer admission.
//!
//! One loop runs per torrent between `Running` and `Stopped`. Each
//! iteration makes a single blocking choice among the ready alternatives,
//! in fixed priority order, then performs the chosen action outside the
//! lock and goes around again.

use std::net::SocketAddr;
use std::sync::Arc;

use super::announce;
use super::state::{Activity, TorrentCtx, TorrentState};
use crate::peer::connection;
use crate::torrent::AnnounceEvent;

/// Most simultaneously established peer connections per torrent.
pub(crate) const MAX_ACTIVE_PEERS: usize = 30;

/// Most simultaneously in-flight connection attempts per torrent.
pub(crate) const MAX_PENDING_CONNECTS: usize = 10;

/// One action chosen by the control loop.
#[derive(Debug, PartialEq, Eq)]
enum Step {
    /// Teardown requested; always wins
    Cleanup,
    /// The scheduled announce became due
    Announce,
    /// Capacity available for one more connection attempt
    Admit(SocketAddr),
}

/// Runs the control loop for one torrent until it is stopped.
pub(crate) async fn run(ctx: Arc<TorrentCtx>) {
    tracing::debug!("control loop started for {}", ctx.entry.meta.info_hash());
    loop {
        match ctx.entry.shared.wait_for(decide).await {
            Step::Cleanup => {
                cleanup(&ctx).await;
                break;
            }
            Step::Announce => announce::announce(&ctx, AnnounceEvent::None).await,
            Step::Admit(addr) => admit(&ctx, addr),
        }
    }
    tracing::debug!("control loop exited for {}", ctx.entry.meta.info_hash());
}

/// Picks the highest-priority ready action, or `None` to block.
///
/// Runs under the state lock: each check and the state change it implies
/// (consuming the due flag, popping a candidate) is one indivisible step.
fn decide(state: &mut TorrentState) -> Option<Step> {
    match state.activity {
        Activity::Stopping => return Some(Step::Cleanup),
        Activity::Running => {}
        // The loop exists exactly while the torrent is Running or Stopping;
        // anything else means the state machine is corrupted.
        other @ (Activity::Stopped | Activity::Verifying) => {
            panic!("control loop observed activity '{other}'");
        }
    }

    if state.announce_due {
        state.announce_due = false;
        return Some(Step::Announce);
    }

    if state.peers.len() < MAX_ACTIVE_PEERS
        && state.connections_in_progress.len() < MAX_PENDING_CONNECTS
        && let Some(addr) = state.potential_peers.pop_front()
    {
        return Some(Step::Admit(addr));
    }

    None
}

/// Hands one popped candidate to a connection attempt.
///
/// Spawning and registering happen in one lock section; see
/// [`connection::spawn_attempt`].
fn admit(ctx: &Arc<TorrentCtx>, addr: SocketAddr) {
    ctx.entry.shared.update(|state| {
        let (id, abort) = connection::spawn_attempt(ctx, addr);
        state.connections_in_progress.insert(id, abort);
    });
    tracing::debug!("admitted connection attempt to {addr}");
}

/// Tears down every connection, reports the stopped event, and parks the
/// torrent back at `Stopped`.
async fn cleanup(ctx: &Arc<TorrentCtx>) {
    let shared = &ctx.entry.shared;
    let info_hash = ctx.entry.meta.info_hash();
    tracing::info!("tearing down torrent {info_hash}");

    shared.update(|state| {
        for abort in state.connections_in_progress.values() {
            abort.abort();
        }
    });
    shared
        .wait_for(|state| state.connections_in_progress.is_empty().then_some(()))
        .await;

    shared.update(|state| {
        for peer in state.peers.values() {
            peer.abort.abort();
        }
    });

    announce::announce_stopped(ctx).await;

    shared
        .wait_for(|state| state.peers.is_empty().then_some(()))
        .await;

    shared.update(|state| {
        state.reset_announce_timer();
        state.activity = Activity::Stopped;
    });
    tracing::info!("torrent {info_hash} stopped");
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::OnceLock;

    use proptest::prelude::*;

    use super::super::state::{ConnId, PeerHandle};
    use super::*;

    fn runtime() -> &'static tokio::runtime::Runtime {
        static RUNTIME: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
        RUNTIME.get_or_init(|| tokio::runtime::Runtime::new().unwrap())
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, 1], port))
    }

    /// A state with synthetic peer-set occupancy. The abort handles belong
    /// to finished no-op tasks.
    fn occupied_state(established: usize, pending: usize, candidates: usize) -> TorrentState {
        let rt = runtime();
        let mut state = TorrentState::new(1);
        state.activity = Activity::Running;
        state.peers = (0..established)
            .map(|i| {
                (
                    ConnId::next(),
                    PeerHandle {
                        addr: addr(i as u16 + 1),
                        abort: rt.spawn(async {}).abort_handle(),
                    },
                )
            })
            .collect::<HashMap<_, _>>();
        state.connections_in_progress = (0..pending)
            .map(|_| (ConnId::next(), rt.spawn(async {}).abort_handle()))
            .collect();
        state.potential_peers = (0..candidates).map(|i| addr(i as u16 + 1000)).collect();
        state
    }

    #[test]
    fn test_cleanup_has_priority_over_announce() {
        let mut state = occupied_state(0, 0, 0);
        state.activity = Activity::Stopping;
        state.announce_due = true;

        assert_eq!(decide(&mut state), Some(Step::Cleanup));
        // Cleanup must not consume the due flag on its way through.
        assert!(state.announce_due);
    }

    #[test]
    fn test_announce_has_priority_over_admission() {
        let mut state = occupied_state(0, 0, 3);
        state.announce_due = true;

        assert_eq!(decide(&mut state), Some(Step::Announce));
        assert!(!state.announce_due);
        assert_eq!(state.potential_peers.len(), 3);
    }

    #[test]
    fn test_admission_pops_one_candidate() {
        let mut state = occupied_state(0, 0, 2);

        assert_eq!(decide(&mut state), Some(Step::Admit(addr(1000))));
        assert_eq!(state.potential_peers.len(), 1);
    }

    #[test]
    fn test_blocks_when_nothing_ready() {
        let mut state = occupied_state(5, 2, 0);
        assert_eq!(decide(&mut state), None);
    }

    #[test]
    fn test_no_admission_at_peer_limit() {
        let mut state = occupied_state(MAX_ACTIVE_PEERS, 0, 5);
        assert_eq!(decide(&mut state), None);
        assert_eq!(state.potential_peers.len(), 5);
    }

    #[test]
    fn test_no_admission_at_pending_limit() {
        let mut state = occupied_state(0, MAX_PENDING_CONNECTS, 5);
        assert_eq!(decide(&mut state), None);
        assert_eq!(state.potential_peers.len(), 5);
    }

    #[test]
    #[should_panic(expected = "control loop observed activity")]
    fn test_stopped_under_live_loop_is_fatal() {
        let mut state = occupied_state(0, 0, 0);
        state.activity = Activity::Stopped;
        let _ = decide(&mut state);
    }

    #[test]
    #[should_panic(expected = "control loop observed activity")]
    fn test_verifying_under_live_loop_is_fatal() {
        let mut state = occupied_state(0, 0, 0);
        state.activity = Activity::Verifying;
        let _ = decide(&mut state);
    }

    proptest! {
        /// For any occupancy, admission happens exactly when both limits
        /// have headroom and a candidate exists, and never outranks an
        /// announce that is due.
        #[test]
        fn prop_admission_respects_limits(
            established in 0usize..=2 * MAX_ACTIVE_PEERS,
            pending in 0usize..=2 * MAX_PENDING_CONNECTS,
            candidates in 0usize..4,
            due in proptest::bool::ANY,
        ) {
            let mut state = occupied_state(established, pending, candidates);
            state.announce_due = due;

            match decide(&mut state) {
                Some(Step::Admit(_)) => {
                    prop_assert!(!due);
                    prop_assert!(candidates > 0);
                    prop_assert!(established < MAX_ACTIVE_PEERS);
                    prop_assert!(pending < MAX_PENDING_CONNECTS);
                }
                Some(Step::Announce) => prop_assert!(due),
                Some(Step::Cleanup) => prop_assert!(false, "no teardown was requested"),
                None => {
                    prop_assert!(!due);
                    prop_assert!(
                        candidates == 0
                            || established >= MAX_ACTIVE_PEERS
                            || pending >= MAX_PENDING_CONNECTS
                    );
                }
            }
        }
    }
}
