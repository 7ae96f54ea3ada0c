//! Per-connection lifecycle: accept, greeting delay, admission,
//! split reader/writer tasks, and disconnect cleanup.
//!
//! Grounded on `valence_network::connect`'s `handle_connection` ->
//! `handle_handshake` sequencing for the overall accept shape, and on
//! `packet_io.rs`'s `into_client_args` for the split reader_task/writer_task
//! pattern: the write half lives behind a bounded channel so a slow peer
//! backpressures without stalling the reader or anyone broadcasting to it.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::config::GREETING_DELAY;
use crate::dispatch;
use crate::error::RelayError;
use crate::lobby;
use crate::protocol::frame::FrameDecoder;
use crate::room::ClientId;
use crate::server::ServerState;
use crate::session::{ClientSession, OutboundHandle, OUTBOUND_QUEUE_DEPTH};

const READ_BUF_SIZE: usize = 4096;

/// Tunes the accepted socket: Nagle disabled, TCP keep-alive on with
/// a 30 s initial delay. `socket2::SockRef` borrows the fd without taking
/// ownership away from the `tokio::net::TcpStream`.
fn configure_socket(stream: &TcpStream) -> std::io::Result<()> {
    let sock_ref = socket2::SockRef::from(stream);
    sock_ref.set_nodelay(true)?;
    let keepalive = socket2::TcpKeepalive::new().with_time(Duration::from_secs(30));
    sock_ref.set_tcp_keepalive(&keepalive)?;
    Ok(())
}

/// Drives one accepted connection end to end. Returns once the connection
/// is fully torn down; the caller (the accept loop) doesn't need to await
/// anything further.
pub async fn handle_connection(
    server: Arc<ServerState>,
    stream: TcpStream,
    mut shutdown: broadcast::Receiver<()>,
) {
    if let Err(err) = configure_socket(&stream) {
        warn!(?err, "failed to configure accepted socket, continuing anyway");
    }

    let client_id = server.allocate_client_id();
    let room_id = server.get_available_room();

    let Some((slot_index, was_occupied)) = server.join_room(room_id, client_id) else {
        let err = RelayError::RoomFull;
        warn!(client_id, room_id, %err, "admission failed, closing connection");
        return;
    };

    let (read_half, write_half) = stream.into_split();
    let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
    let outbound = OutboundHandle::new(client_id, tx);
    let (kill_tx, kill_rx) = tokio::sync::oneshot::channel();

    server.register_session(ClientSession::new(
        client_id,
        outbound.clone(),
        room_id,
        slot_index,
        kill_tx,
    ));

    let writer = tokio::spawn(writer_task(write_half, rx));

    info!(client_id, room_id, slot_index, "client admitted, awaiting greeting delay");

    tokio::time::sleep(GREETING_DELAY).await;

    if let Err(err) = send_greeting(&outbound, &server, room_id, slot_index as u8) {
        debug!(client_id, ?err, "socket no longer writable after greeting delay");
        writer.abort();
        cleanup_client(&server, client_id, room_id);
        return;
    }

    if was_occupied {
        if let Some(snapshot) = server.with_room(room_id, lobby::room_snapshot_command) {
            server.broadcast_room(room_id, &snapshot, Some(client_id));
        }
    }

    server.with_session(client_id, |s| s.map_sent = true);

    reader_loop(read_half, &server, client_id, &mut shutdown, kill_rx).await;

    writer.abort();
    cleanup_client(&server, client_id, room_id);
    info!(client_id, room_id, "client disconnected");
}

/// Sends, in order, the greeting, room snapshot, map packet, and three
/// welcome chat lines. Exposed crate-wide (rather than file-private)
/// so integration tests can drive the same admission path without a real
/// socket.
pub fn send_greeting(
    outbound: &OutboundHandle,
    server: &ServerState,
    room_id: u32,
    slot_index: u8,
) -> Result<(), RelayError> {
    outbound.send_command(&lobby::greeting_command(slot_index))?;

    let snapshot = server
        .with_room(room_id, lobby::room_snapshot_command)
        .unwrap_or_default();
    outbound.send_command(&snapshot)?;

    let map = server
        .with_room(room_id, |room| lobby::map_command(&room.map))
        .unwrap_or_default();
    outbound.send_command(&map)?;

    for line in lobby::welcome_chat_lines() {
        outbound.send_command(&line)?;
    }

    Ok(())
}

async fn writer_task(
    mut write_half: tokio::net::tcp::OwnedWriteHalf,
    mut rx: mpsc::Receiver<bytes::Bytes>,
) {
    while let Some(bytes) = rx.recv().await {
        if let Err(io_err) = write_half.write_all(&bytes).await {
            let err = RelayError::from(io_err);
            debug!(%err, "write error, closing connection");
            return;
        }
    }
}

async fn reader_loop(
    mut read_half: tokio::net::tcp::OwnedReadHalf,
    server: &Arc<ServerState>,
    client_id: ClientId,
    shutdown: &mut broadcast::Receiver<()>,
    mut kill: tokio::sync::oneshot::Receiver<()>,
) {
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; READ_BUF_SIZE];

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                debug!(client_id, "reader loop exiting on shutdown signal");
                return;
            }
            _ = &mut kill => {
                debug!(client_id, "reader loop exiting on forced disconnect");
                return;
            }
            read = read_half.read(&mut buf) => {
                match read {
                    Ok(0) => return,
                    Ok(n) => {
                        decoder.queue_slice(&buf[..n]);
                        server.with_session(client_id, |s| s.touch());
                        drain_frames(server, client_id, &mut decoder);
                    }
                    Err(err) => {
                        debug!(client_id, ?err, "read error, closing connection");
                        return;
                    }
                }
            }
        }
    }
}

/// Drains every complete frame currently buffered. A single received TCP
/// chunk may contain multiple framed packets back-to-back, so this loops
/// until the decoder reports it needs more bytes. A framing error is
/// logged and stops draining this chunk without closing the connection.
fn drain_frames(server: &Arc<ServerState>, client_id: ClientId, decoder: &mut FrameDecoder) {
    loop {
        match decoder.try_next_frame() {
            Ok(Some((_counter, body))) => dispatch::handle_frame(server, client_id, &body),
            Ok(None) => return,
            Err(err) => {
                warn!(client_id, ?err, "framing error, dropping rest of this chunk");
                return;
            }
        }
    }
}

/// Disconnect cleanup: cancel the battle-ping timeout, leave the
/// room, and re-broadcast a fresh snapshot if other clients remain.
pub fn cleanup_client(server: &ServerState, client_id: ClientId, room_id: u32) {
    if let Some(handle) = server.remove_session(client_id) {
        let mut session = handle.lock();
        if let Some(ping) = session.battle_ping.take() {
            ping.shutdown();
        }
    }

    if let Some((_, still_occupied)) = server.leave_room(room_id, client_id) {
        if still_occupied {
            if let Some(snapshot) = server.with_room(room_id, lobby::room_snapshot_command) {
                server.broadcast_room(room_id, &snapshot, None);
            }
        }
    }
}
