//! Semantic command dispatch: wires parsed [`Command`] values to room
//! mutations, broadcasts, and battle-ping allocation. The parser upstream
//! (`protocol::command`) stays ignorant of rooms; this module is the other
//! half of that split, comparable to how `valence`'s event handlers consume
//! `valence_protocol`'s decoded packets without the decoder knowing what a
//! player or entity is.

use std::collections::HashSet;

use tracing::{debug, trace, warn};

use crate::battle_ping::BattlePingHandle;
use crate::lobby;
use crate::protocol::command::{sanitize_chat, sanitize_name, Command};
use crate::protocol::opcode::{self, Race, ReadyByte};
use crate::room::ClientId;
use crate::server::ServerState;

/// Parses `body` into individual commands and dispatches each one.
pub fn handle_frame(server: &ServerState, client_id: ClientId, body: &[u8]) {
    for command in crate::protocol::command::parse_commands(body) {
        handle_command(server, client_id, command);
    }
}

pub fn handle_command(server: &ServerState, client_id: ClientId, command: Command) {
    let Some((room_id, slot_index)) =
        server.with_session(client_id, |s| (s.room_id, s.slot_index))
    else {
        warn!(client_id, "command received for unknown session");
        return;
    };

    match command {
        Command::PlayerName { name, .. } => {
            let sanitized = sanitize_name(&name);
            server.with_room_mut(room_id, |room| {
                room.slots[slot_index].name =
                    String::from_utf8_lossy(&sanitized).into_owned();
            });
            let frame = lobby::player_name_command(slot_index as u8, &sanitized);
            server.broadcast_room(room_id, &frame, None);
        }

        Command::PlayerChat { text } => {
            let sanitized = sanitize_chat(&text);
            let frame = lobby::player_chat_command(&sanitized);
            server.broadcast_room(room_id, &frame, None);
        }

        Command::PlayerRace { race, .. } => {
            let race = Race::from_wire(race);
            server.with_room_mut(room_id, |room| {
                room.slots[slot_index].race = race;
            });
            let frame = lobby::player_race_command(slot_index as u8, race.to_wire());
            server.broadcast_room(room_id, &frame, None);
        }

        Command::PlayerColor { color, .. } => {
            server.with_room_mut(room_id, |room| {
                room.slots[slot_index].color = color;
            });
            let frame = lobby::player_color_command(slot_index as u8, color);
            server.broadcast_room(room_id, &frame, None);
        }

        Command::PlayerTeam { team, .. } => {
            server.with_room_mut(room_id, |room| {
                room.slots[slot_index].team = team;
            });
            let frame = lobby::player_team_command(slot_index as u8, team);
            server.broadcast_room(room_id, &frame, None);
        }

        Command::PlayerReady => handle_player_ready(server, client_id, room_id, slot_index),

        Command::BeginBattle => handle_begin_battle(server, client_id, room_id),

        Command::BattlePing1 { .. } => {
            let notified = server
                .with_session(client_id, |s| {
                    s.battle_ping.as_ref().map(BattlePingHandle::notify_echo)
                })
                .flatten();
            if notified != Some(true) {
                debug!(client_id, "battle_ping1 echo with no active driver");
            }
        }

        Command::BattlePing2 => {
            trace!(client_id, "battle_ping2 received, no response owed");
        }

        Command::OpaqueRelay { opcode, data } => {
            let mut frame = Vec::with_capacity(data.len() + 1);
            frame.push(opcode);
            frame.extend_from_slice(&data);
            server.broadcast_room(room_id, &frame, Some(client_id));
        }

        Command::RoomGreeting => {
            trace!(client_id, "room_greeting echo acknowledged as no-op");
        }

        Command::Ping => {
            trace!(client_id, "ping received, no response owed");
        }
    }
}

fn handle_player_ready(server: &ServerState, client_id: ClientId, room_id: u32, slot_index: usize) {
    server.with_room_mut(room_id, |room| {
        room.slots[slot_index].ready = true;
    });

    let frame = lobby::player_ready_command(slot_index as u8, ReadyByte::ReadyForBattle);
    server.broadcast_room(room_id, &frame, None);

    let all_human_ready = server
        .with_room(room_id, |room| {
            opcode::HUMAN_SLOTS
                .filter(|&i| room.slots[i].client_id.is_some())
                .all(|i| room.slots[i].ready)
        })
        .unwrap_or(false);

    if all_human_ready {
        server.with_room_mut(room_id, |room| {
            room.slots[opcode::AI_SLOT].ready = true;
        });
        let frame =
            lobby::player_ready_command(opcode::AI_SLOT as u8, ReadyByte::ReadyForBattle);
        server.broadcast_room(room_id, &frame, None);
    }

    debug!(client_id, slot_index, "player_ready processed");
}

fn handle_begin_battle(server: &ServerState, client_id: ClientId, room_id: u32) {
    let initial_counter = server
        .with_session(client_id, |s| {
            s.battle_initiated = true;
            s.outbound.counter() as u32
        })
        .unwrap_or(0);

    let outbound = server.with_session(client_id, |s| s.outbound.clone());
    if let Some(outbound) = outbound {
        let handle = BattlePingHandle::spawn(client_id, initial_counter, outbound);
        let previous = server.with_session(client_id, |s| s.battle_ping.replace(handle));
        if let Some(Some(previous)) = previous {
            previous.shutdown();
        }
    }

    let Some(room_clients) = server.with_room(room_id, |room| room.client_ids()) else {
        return;
    };

    let initiated: HashSet<ClientId> = room_clients
        .iter()
        .filter(|&&id| server.with_session(id, |s| s.battle_initiated).unwrap_or(false))
        .copied()
        .collect();

    if server.try_begin_battle(room_id, &initiated) {
        debug!(room_id, "room transitioned to in-battle");
        let frame = lobby::game_speed_command();
        server.broadcast_room(room_id, &frame, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ServerState;
    use crate::session::{ClientSession, OutboundHandle};
    use tokio::sync::mpsc;

    fn spawn_client(server: &ServerState, room_id: u32, slot_index: usize) -> ClientId {
        let id = server.allocate_client_id();
        let (tx, _rx) = mpsc::channel(16);
        let outbound = OutboundHandle::new(id, tx);
        let (kill_tx, _kill_rx) = tokio::sync::oneshot::channel();
        server.register_session(ClientSession::new(id, outbound, room_id, slot_index, kill_tx));
        id
    }

    #[tokio::test]
    async fn ready_cascade_marks_ai_slot_after_all_humans() {
        let server = ServerState::new_seeded(1);
        let room_id = server.get_available_room();
        let (slot_a, _) = server.join_room(room_id, 100).unwrap();
        let (slot_b, _) = server.join_room(room_id, 200).unwrap();
        let a = spawn_client(&server, room_id, slot_a);
        let b = spawn_client(&server, room_id, slot_b);

        handle_command(&server, a, Command::PlayerReady);
        let ai_ready = server
            .with_room(room_id, |room| room.slots[opcode::AI_SLOT].ready)
            .unwrap();
        assert!(!ai_ready);

        handle_command(&server, b, Command::PlayerReady);
        let ai_ready = server
            .with_room(room_id, |room| room.slots[opcode::AI_SLOT].ready)
            .unwrap();
        assert!(ai_ready);
    }

    #[tokio::test]
    async fn begin_battle_flips_room_once_all_initiated() {
        let server = ServerState::new_seeded(2);
        let room_id = server.get_available_room();
        let (slot_a, _) = server.join_room(room_id, 1).unwrap();
        let (slot_b, _) = server.join_room(room_id, 2).unwrap();
        let a = spawn_client(&server, room_id, slot_a);
        let b = spawn_client(&server, room_id, slot_b);

        handle_command(&server, a, Command::BeginBattle);
        assert!(!server.with_room(room_id, |r| r.in_battle).unwrap());

        handle_command(&server, b, Command::BeginBattle);
        assert!(server.with_room(room_id, |r| r.in_battle).unwrap());
    }
}
