//! Tracker announce coordination and the announce timer.
//!
//! Every announce attempt, successful or not, rebinds the announce timer:
//! the state cell's epoch counter is bumped and a fresh timer task is armed
//! against the new epoch, so a superseded timer can never raise the current
//! due flag.

use std::sync::Arc;
use std::time::Duration;

use super::state::{TorrentCtx, TorrentState};
use crate::sync::Shared;
use crate::torrent::{AnnounceEvent, AnnounceRequest};

/// Delay before retrying after a failed announce.
pub(crate) const ANNOUNCE_RETRY_DELAY: Duration = Duration::from_secs(120);

/// Largest single sleep issued by the announce timer. Platforms with 32-bit
/// millisecond wait primitives cannot represent longer waits in one call,
/// and tracker renewal intervals are untrusted input.
const MAX_TIMER_CHUNK: Duration = Duration::from_millis(u32::MAX as u64);

/// Performs one announce exchange and rebinds the announce timer.
///
/// On success the candidate peer queue is replaced wholesale with the
/// tracker's list and the timer is armed for the renewal interval. On
/// failure the error is logged and the timer is armed for the fixed retry
/// delay; announce failures never propagate to the caller.
pub(crate) async fn announce(ctx: &TorrentCtx, event: AnnounceEvent) {
    let announce_url = ctx.entry.meta.announce();

    match ctx.tracker.announce(announce_url, request_for(ctx, event)).await {
        Ok(response) => {
            let interval = Duration::from_secs(u64::from(response.interval));
            tracing::debug!(
                "announced to {announce_url}: {} candidate peers, renewal in {}s",
                response.peers.len(),
                interval.as_secs()
            );
            let epoch = ctx.entry.shared.update(|state| {
                state.potential_peers = response.peers.into_iter().collect();
                state.reset_announce_timer();
                state.announce_epoch
            });
            arm_timer(Arc::clone(&ctx.entry.shared), epoch, interval);
        }
        Err(e) => {
            tracing::warn!(
                "announce to {announce_url} failed, retrying in {}s: {e}",
                ANNOUNCE_RETRY_DELAY.as_secs()
            );
            let epoch = ctx.entry.shared.update(|state| {
                state.reset_announce_timer();
                state.announce_epoch
            });
            arm_timer(Arc::clone(&ctx.entry.shared), epoch, ANNOUNCE_RETRY_DELAY);
        }
    }
}

/// Best-effort stopped event during teardown.
///
/// Failures are logged and no timer is armed; the teardown path resets the
/// timer cell itself.
pub(crate) async fn announce_stopped(ctx: &TorrentCtx) {
    let announce_url = ctx.entry.meta.announce();
    if let Err(e) = ctx
        .tracker
        .announce(announce_url, request_for(ctx, AnnounceEvent::Stopped))
        .await
    {
        tracing::warn!("stopped announce to {announce_url} failed: {e}");
    }
}

fn request_for(ctx: &TorrentCtx, event: AnnounceEvent) -> AnnounceRequest {
    AnnounceRequest {
        info_hash: ctx.entry.meta.info_hash(),
        peer_id: *ctx.peer_id.as_bytes(),
        port: ctx.config.network.listen_port,
        uploaded: 0,
        downloaded: 0,
        // Seeding engine: the data is complete by definition.
        left: 0,
        event,
    }
}

/// Arms the announce-due flag to raise after `delay`, unless superseded.
fn arm_timer(shared: Arc<Shared<TorrentState>>, epoch: u64, delay: Duration) {
    tokio::spawn(async move {
        sleep_chunked(delay).await;
        shared.update(|state| {
            if state.announce_epoch == epoch {
                state.announce_due = true;
            }
        });
    });
}

/// Sleeps for `total`, in chunks no larger than the platform-safe ceiling,
/// accumulating the remainder.
async fn sleep_chunked(total: Duration) {
    let mut remaining = total;
    while remaining > MAX_TIMER_CHUNK {
        tokio::time::sleep(MAX_TIMER_CHUNK).await;
        remaining -= MAX_TIMER_CHUNK;
    }
    tokio::time::sleep(remaining).await;
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::path::PathBuf;

    use tokio::task::yield_now;
    use tokio::time::{advance, timeout};

    use super::super::state::TorrentEntry;
    use super::super::test_mocks::ScriptedTracker;
    use super::*;
    use crate::config::EbbtideConfig;
    use crate::torrent::{InfoHash, PeerId, TorrentFile, TorrentMetaInfo};

    fn ctx_with(tracker: Arc<ScriptedTracker>) -> TorrentCtx {
        let meta = TorrentMetaInfo::new(
            InfoHash::new([0x55; 20]),
            "http://tracker.example.com/announce".to_string(),
            "fixture".to_string(),
            16384,
            vec![[0u8; 20]; 1],
            vec![TorrentFile {
                path: vec!["fixture".to_string()],
                length: 100,
            }],
        )
        .unwrap();

        TorrentCtx {
            entry: Arc::new(TorrentEntry::new(meta, PathBuf::from("/tmp"))),
            tracker,
            peer_id: PeerId::generate("-EB0001-"),
            config: EbbtideConfig::default(),
        }
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, 1], port))
    }

    #[tokio::test]
    async fn test_success_replaces_candidates_wholesale() {
        let tracker = Arc::new(ScriptedTracker::ok(1800).with_peers(vec![addr(1), addr(2)]));
        let ctx = ctx_with(tracker);

        // Pre-existing candidates are discarded, not merged.
        ctx.entry
            .shared
            .update(|s| s.potential_peers.push_back(addr(9)));

        announce(&ctx, AnnounceEvent::None).await;

        let candidates: Vec<_> =
            ctx.entry.shared.read(|s| s.potential_peers.iter().copied().collect());
        assert_eq!(candidates, vec![addr(1), addr(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_arms_timer_for_interval() {
        let tracker = Arc::new(ScriptedTracker::ok(300));
        let ctx = ctx_with(tracker);

        announce(&ctx, AnnounceEvent::None).await;
        // Let the timer task register its sleep before touching the clock.
        yield_now().await;
        yield_now().await;
        assert!(!ctx.entry.shared.read(|s| s.announce_due));

        advance(Duration::from_secs(299)).await;
        yield_now().await;
        assert!(!ctx.entry.shared.read(|s| s.announce_due));

        advance(Duration::from_secs(2)).await;
        yield_now().await;
        assert!(ctx.entry.shared.read(|s| s.announce_due));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_retries_no_sooner_than_delay() {
        let tracker = Arc::new(ScriptedTracker::failing());
        let ctx = ctx_with(tracker);

        announce(&ctx, AnnounceEvent::None).await;
        yield_now().await;
        yield_now().await;

        advance(ANNOUNCE_RETRY_DELAY - Duration::from_secs(1)).await;
        yield_now().await;
        assert!(!ctx.entry.shared.read(|s| s.announce_due));

        advance(Duration::from_secs(2)).await;
        yield_now().await;
        assert!(ctx.entry.shared.read(|s| s.announce_due));
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_timer_never_fires() {
        let tracker = Arc::new(ScriptedTracker::failing());
        let ctx = ctx_with(tracker);

        announce(&ctx, AnnounceEvent::None).await;
        yield_now().await;
        yield_now().await;

        // Rebinding invalidates the armed timer.
        ctx.entry.shared.update(|s| s.reset_announce_timer());

        advance(ANNOUNCE_RETRY_DELAY * 2).await;
        yield_now().await;
        assert!(!ctx.entry.shared.read(|s| s.announce_due));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_survives_multi_chunk_delays() {
        let tracker = Arc::new(ScriptedTracker::ok(u32::MAX));
        let ctx = ctx_with(tracker);

        announce(&ctx, AnnounceEvent::None).await;

        // Roughly 136 years, forcing the timer through its chunked sleeps.
        // Auto-advance walks the virtual clock through each chunk.
        timeout(
            Duration::from_secs(u64::from(u32::MAX) + 3600),
            ctx.entry.shared.wait_for(|s| s.announce_due.then_some(())),
        )
        .await
        .expect("chunked timer must eventually raise the flag");
    }

    #[tokio::test]
    async fn test_stopped_announce_failure_is_absorbed() {
        let tracker = Arc::new(ScriptedTracker::failing());
        let ctx = ctx_with(Arc::clone(&tracker));

        announce_stopped(&ctx).await;

        assert_eq!(tracker.events(), vec![AnnounceEvent::Stopped]);
        // No timer armed by the stopped event.
        assert!(!ctx.entry.shared.read(|s| s.announce_due));
        assert_eq!(ctx.entry.shared.read(|s| s.announce_epoch), 0);
    }
}
