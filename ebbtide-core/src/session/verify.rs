//! Sequential piece verification against the declared hashes.

use std::sync::Arc;

use sha1::{Digest, Sha1};

use super::state::{Activity, TorrentEntry};
use crate::storage;
use crate::torrent::PieceIndex;

/// Walks every piece of `entry` in order, hashing the on-disk bytes and
/// recording the per-piece result, then returns the torrent to `Stopped`.
///
/// A hash mismatch is a result (`false` for that piece), not an error.
/// Unreadable piece data aborts verification by panicking the task; the
/// torrent intentionally remains `Verifying` in that case.
pub(crate) async fn run(entry: Arc<TorrentEntry>) {
    let meta = &entry.meta;
    let info_hash = meta.info_hash();
    tracing::info!("verifying {} pieces of {info_hash}", meta.num_pieces());

    let mut valid = 0u32;
    for index in (0..meta.num_pieces()).map(PieceIndex::new) {
        let data = match storage::read_piece(meta, &entry.root, index).await {
            Ok(data) => data,
            Err(e) => {
                tracing::error!("piece {index} of {info_hash} is unreadable: {e}");
                panic!("verification of {info_hash} aborted: piece {index} unreadable");
            }
        };

        let mut hasher = Sha1::new();
        hasher.update(&data);
        let digest = hasher.finalize();
        let matches = meta
            .piece_hash(index)
            .is_some_and(|expected| digest.as_slice() == expected);

        entry
            .shared
            .update(|state| state.completion[index.as_u32() as usize] = matches);

        if matches {
            valid += 1;
        } else {
            tracing::debug!("piece {index} of {info_hash} failed its hash check");
        }
    }

    entry.shared.update(|state| state.activity = Activity::Stopped);
    tracing::info!(
        "verification of {info_hash} complete: {valid}/{} pieces valid",
        meta.num_pieces()
    );
}
