//! Periodic tickers: the idle reaper and the lobby-ping broadcaster.
//! Both are fire-and-forget `tokio::time::interval` loops, grounded on
//! `valence_network`'s periodic background loops (e.g.
//! `do_broadcast_to_lan_loop`) that sleep, do one pass over shared state,
//! and repeat until a shutdown signal fires.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::info;

use crate::config::{IDLE_REAP_INTERVAL, LOBBY_PING_INTERVAL};
use crate::error::RelayError;
use crate::lobby;
use crate::server::ServerState;

/// Disconnects any client that has sent no bytes for longer than
/// `idle_timeout`.
pub async fn run_idle_reaper(
    server: Arc<ServerState>,
    idle_timeout: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(IDLE_REAP_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.recv() => return,
            _ = interval.tick() => reap_idle_clients(&server, idle_timeout),
        }
    }
}

fn reap_idle_clients(server: &ServerState, idle_timeout: Duration) {
    for client_id in server.client_ids() {
        let idle = server.with_session(client_id, |s| s.idle_for());
        let Some(idle) = idle else { continue };

        if idle > idle_timeout {
            // §7's IdleTimeout kind, surfaced as its own field alongside the
            // literal "idle" reason S5's disconnect line is specified with.
            let err = RelayError::IdleTimeout;
            info!(
                r#type = "disconnect",
                reason = "idle",
                kind = %err,
                client_id,
                idle_ms = idle.as_millis() as u64,
                "disconnecting idle client"
            );
            server.disconnect(client_id);
        }
    }
}

/// Every 300 ms, increments each non-battling room's lobby-ping counter and
/// sends a bare `ping` to every client in it whose greeting has already
/// landed.
pub async fn run_lobby_ping(server: Arc<ServerState>, mut shutdown: broadcast::Receiver<()>) {
    let mut interval = tokio::time::interval(LOBBY_PING_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.recv() => return,
            _ = interval.tick() => broadcast_lobby_pings(&server),
        }
    }
}

fn broadcast_lobby_pings(server: &ServerState) {
    for room_id in server.room_ids() {
        let targets = server.with_room_mut(room_id, |room| {
            if room.in_battle || room.clients.is_empty() {
                return Vec::new();
            }
            room.lobby_ping_counter += 1;
            room.client_ids()
        });

        let Some(targets) = targets else { continue };
        if targets.is_empty() {
            continue;
        }

        let frame = lobby::ping_command();
        for client_id in targets {
            let mapped = server
                .with_session(client_id, |s| s.map_sent)
                .unwrap_or(false);
            if mapped {
                server.send_to(client_id, &frame);
            }
        }
    }
}
