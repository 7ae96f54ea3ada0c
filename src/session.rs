//! Per-client session state and the outbound write path every handler uses
//! to reach one connection.
//!
//! Grounded on `valence_network`'s split between a connection's read side
//! (owned by its own task) and its write side (a cloneable handle backed by
//! a bounded channel, so a slow client backpressures without blocking
//! anyone broadcasting to it) — see `PacketIo::into_client_args` and the
//! `send_packet` helpers built on top of it.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

use crate::battle_ping::BattlePingHandle;
use crate::error::RelayError;
use crate::protocol::frame::FrameEncoder;
use crate::room::{ClientId, RoomId};

/// Bound on a connection's outbound write queue. A client that stops
/// draining its socket accumulates backpressure here rather than stalling
/// the broadcaster; once full, further sends to it are dropped and logged
/// (the peer's own read timeout or a later write error tears it down).
pub const OUTBOUND_QUEUE_DEPTH: usize = 256;

/// The write half of one connection: a cloneable handle so room broadcasts
/// and the battle-ping driver can each hold a copy without owning the
/// socket. Encoding is serialized per connection via the inner mutex, since
/// the outbound counter nibble must advance exactly once per frame
/// regardless of which task is sending.
#[derive(Clone)]
pub struct OutboundHandle {
    id: ClientId,
    encoder: Arc<Mutex<FrameEncoder>>,
    tx: mpsc::Sender<Bytes>,
}

impl OutboundHandle {
    pub fn new(id: ClientId, tx: mpsc::Sender<Bytes>) -> Self {
        Self {
            id,
            encoder: Arc::new(Mutex::new(FrameEncoder::new())),
            tx,
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// The counter nibble that will be stamped on the next frame sent to
    /// this client, used to snapshot `initialPacketCounter` at battle start.
    pub fn counter(&self) -> u8 {
        self.encoder.lock().counter()
    }

    /// Encodes one command (opcode byte plus its data, as built by
    /// [`crate::lobby`] or the dispatch handlers) into a frame and queues it
    /// for the write task. Returns `Err` only for genuinely oversized
    /// payloads; a full outbound queue is logged and treated as a
    /// best-effort drop rather than an error, since the peer is
    /// already misbehaving and will be reaped independently.
    pub fn send_command(&self, data: &[u8]) -> Result<(), RelayError> {
        let bytes = {
            let mut encoder = self.encoder.lock();
            encoder.append_frame(data)?;
            encoder.take().freeze()
        };

        if self.tx.try_send(bytes).is_err() {
            warn!(client_id = self.id, "outbound queue full or closed, dropping frame");
        }

        Ok(())
    }
}

/// Per-client state the connection task and dispatch handlers share.
/// Owned by the server's client registry; looked up by id rather than held
/// directly by a room.
pub struct ClientSession {
    pub id: ClientId,
    pub outbound: OutboundHandle,
    pub room_id: RoomId,
    pub slot_index: usize,
    pub battle_initiated: bool,
    pub map_sent: bool,
    pub battle_ping: Option<BattlePingHandle>,
    /// Fires the connection's reader loop awake for an out-of-band close,
    /// used by the idle reaper. `None` once already fired or taken.
    pub kill: Option<tokio::sync::oneshot::Sender<()>>,
    last_activity_ms: AtomicI64,
    started_at: Instant,
}

impl ClientSession {
    pub fn new(
        id: ClientId,
        outbound: OutboundHandle,
        room_id: RoomId,
        slot_index: usize,
        kill: tokio::sync::oneshot::Sender<()>,
    ) -> Self {
        let started_at = Instant::now();
        Self {
            id,
            outbound,
            room_id,
            slot_index,
            battle_initiated: false,
            map_sent: false,
            battle_ping: None,
            kill: Some(kill),
            last_activity_ms: AtomicI64::new(0),
            started_at,
        }
    }

    /// Records inbound activity for the idle reaper. Called on every
    /// received chunk, not just on parsed commands, since the reaper cares
    /// about socket liveness, not protocol validity.
    pub fn touch(&self) {
        let elapsed = self.started_at.elapsed().as_millis() as i64;
        self.last_activity_ms.store(elapsed, Ordering::Relaxed);
    }

    pub fn idle_for(&self) -> std::time::Duration {
        let last = self.last_activity_ms.load(Ordering::Relaxed);
        let now = self.started_at.elapsed().as_millis() as i64;
        std::time::Duration::from_millis((now - last).max(0) as u64)
    }
}
