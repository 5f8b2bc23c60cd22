//! Connection-attempt tasks and their registration in the shared peer sets.
//!
//! A connection attempt is handed one candidate address and owns the rest of
//! that peer's lifetime: TCP connect, handshake exchange, promotion from the
//! in-progress set to the established set, and a passive service loop until
//! the remote side goes away or teardown aborts the task.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::AbortHandle;

use super::handshake::{HANDSHAKE_LEN, Handshake};
use crate::session::state::{ConnId, PeerHandle, TorrentCtx, TorrentState};
use crate::sync::Shared;
use crate::torrent::TorrentError;

const MSG_BITFIELD: u8 = 5;

/// Upper bound on an accepted message frame; anything larger is a broken or
/// hostile peer.
const MAX_MESSAGE_LEN: usize = 1 << 20;

/// Keeps the shared peer sets truthful for the lifetime of a connection
/// task.
///
/// Dropped on every exit path, including forceful abort, removing the
/// task's identity from whichever set currently holds it.
struct Registration {
    shared: Arc<Shared<TorrentState>>,
    id: ConnId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.shared.update(|state| {
            state.connections_in_progress.remove(&self.id);
            state.peers.remove(&self.id);
        });
    }
}

/// Spawns a connection attempt for `addr`, returning its identity and abort
/// handle immediately while the handshake continues in the background.
///
/// The caller must insert the returned handle into
/// `connections_in_progress` inside the same lock section that made the
/// admission decision: the attempt's own deregistration takes that lock, so
/// registration is ordered before it.
pub(crate) fn spawn_attempt(ctx: &Arc<TorrentCtx>, addr: SocketAddr) -> (ConnId, AbortHandle) {
    let id = ConnId::next();
    let registration = Registration {
        shared: Arc::clone(&ctx.entry.shared),
        id,
    };
    let ctx = Arc::clone(ctx);

    let task = tokio::spawn(async move {
        // Moved in eagerly so even an abort before the first poll
        // deregisters the attempt.
        let _registration = registration;
        match run(&ctx, id, addr).await {
            Ok(()) => tracing::debug!("peer {addr} disconnected"),
            Err(e) => tracing::debug!("peer {addr} dropped: {e}"),
        }
    });

    (id, task.abort_handle())
}

async fn run(ctx: &TorrentCtx, id: ConnId, addr: SocketAddr) -> Result<(), TorrentError> {
    let meta = &ctx.entry.meta;
    let mut stream = TcpStream::connect(addr).await?;

    stream
        .write_all(&Handshake::new(meta.info_hash(), ctx.peer_id).encode())
        .await?;

    let mut buf = [0u8; HANDSHAKE_LEN];
    stream.read_exact(&mut buf).await?;
    let theirs = Handshake::decode(&buf)?;
    if theirs.info_hash != meta.info_hash() {
        return Err(TorrentError::ProtocolError {
            message: format!("peer {addr} handshook for a different torrent"),
        });
    }

    // Handshake complete: promote from in-progress to established, moving
    // the abort handle along with the identity.
    let promoted = ctx.entry.shared.update(|state| {
        match state.connections_in_progress.remove(&id) {
            Some(abort) => {
                state.peers.insert(id, PeerHandle { addr, abort });
                true
            }
            None => false,
        }
    });
    if !promoted {
        // Teardown discarded this attempt while the handshake was in flight.
        return Ok(());
    }
    tracing::debug!("peer {addr} established for {}", meta.info_hash());

    let bitfield = ctx.entry.shared.read(|state| encode_bitfield(&state.completion));
    send_message(&mut stream, MSG_BITFIELD, &bitfield).await?;

    serve(&mut stream).await
}

/// Passive service loop: consume frames until the peer hangs up.
async fn serve(stream: &mut TcpStream) -> Result<(), TorrentError> {
    let mut header = [0u8; 4];
    loop {
        match stream.read_exact(&mut header).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        let length = u32::from_be_bytes(header) as usize;
        if length == 0 {
            // keep-alive
            continue;
        }
        if length > MAX_MESSAGE_LEN {
            return Err(TorrentError::ProtocolError {
                message: format!("oversized message frame of {length} bytes"),
            });
        }

        let mut payload = vec![0u8; length];
        stream.read_exact(&mut payload).await?;
    }
}

async fn send_message(
    stream: &mut TcpStream,
    message_id: u8,
    payload: &[u8],
) -> Result<(), TorrentError> {
    let mut frame = Vec::with_capacity(5 + payload.len());
    frame.extend_from_slice(&((payload.len() as u32 + 1).to_be_bytes()));
    frame.push(message_id);
    frame.extend_from_slice(payload);
    stream.write_all(&frame).await?;
    Ok(())
}

/// Packs per-piece booleans into the wire bitfield, high bit first.
fn encode_bitfield(completion: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; completion.len().div_ceil(8)];
    for (index, &complete) in completion.iter().enumerate() {
        if complete {
            bytes[index / 8] |= 0x80 >> (index % 8);
        }
    }
    bytes
}
