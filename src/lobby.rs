//! Lobby sender: composes the greeting, room-snapshot, and map
//! packets sent to a newly admitted client, plus the individual broadcast
//! commands other handlers reuse to announce slot changes.
//!
//! Grounded on `valence_instance`'s world-init packet builders
//! (chunk/entity init packets are assembled as a
//! sequence of small typed writes into one buffer before being handed to the
//! encoder) generalized to this game's fixed-shape snapshot.

use crate::protocol::opcode::{self, ReadyByte};
use crate::room::{MapDescriptor, Room};

/// `initial_packet` (0x64): tells the client which slot it was assigned.
pub fn greeting_command(slot_index: u8) -> Vec<u8> {
    vec![opcode::INITIAL_PACKET, 0x0f, 0x00, slot_index, 0x00]
}

/// Default values for the sixteen `room_param` tuples. Indices not
/// called out explicitly default to zero; the mapping of index to name
/// beyond `erupting_vents`/`renewable_vents` is not load-bearing for any
/// client-visible behavior this server arbitrates, so indices 0 and 1 are
/// assigned those two names and the remainder keep their positional index.
const ROOM_PARAM_COUNT: usize = 16;

fn room_param_defaults() -> [u16; ROOM_PARAM_COUNT] {
    let mut params = [0u16; ROOM_PARAM_COUNT];
    params[0] = 1; // erupting_vents
    params[1] = 0; // renewable_vents
    params[4] = 4;
    params[5] = 4;
    params[7] = 0xb8;
    params[8] = 1;
    params
}

/// `room_map` snapshot: the full eight-slot room state in one frame.
pub fn room_snapshot_command(room: &Room) -> Vec<u8> {
    let mut data = vec![opcode::ROOM_MAP, 0x00, 0x00];

    for slot_index in 0..opcode::ROOM_SLOT_COUNT {
        data.push(opcode::PLAYER_INIT);
        data.push(0x00);
        data.push(slot_index as u8);
    }

    for (slot_index, slot) in room.slots.iter().enumerate() {
        let slot_index = slot_index as u8;

        data.push(opcode::PLAYER_NAME);
        data.push(slot_index);
        data.push(0x00);
        data.extend_from_slice(&slot.name.as_bytes()[..slot.name.len().min(32)]);
        data.push(0x00);

        data.push(opcode::PLAYER_RACE);
        data.push(slot.race.to_wire());
        data.push(slot_index);

        data.push(opcode::PLAYER_TYPE);
        data.push(slot.slot_type.to_wire());
        data.push(slot_index);

        data.push(opcode::PLAYER_COLOR);
        data.push(slot.color);
        data.push(slot_index);

        data.push(opcode::PLAYER_TEAM2);
        data.push(slot.team);
        data.push(slot_index);

        data.push(opcode::PLAYER_READY);
        data.push(ready_byte(slot.ready) as u8);
        data.push(slot_index);
    }

    for (index, value) in room_param_defaults().iter().enumerate() {
        data.push(opcode::ROOM_PARAM);
        data.push(index as u8);
        data.push(0x00);
        data.push((value & 0xff) as u8);
        data.push((value >> 8) as u8);
    }

    data
}

fn ready_byte(ready: bool) -> ReadyByte {
    if ready {
        ReadyByte::Ready
    } else {
        ReadyByte::NotReady
    }
}

/// `room_map` map packet: which map the room will play, reusing the
/// same opcode as the snapshot but a distinct payload shape.
pub fn map_command(map: &MapDescriptor) -> Vec<u8> {
    let mut data = vec![opcode::ROOM_MAP, map.kind as u8, map.player_count as u8];
    data.extend_from_slice(map.filename.as_bytes());
    data.push(0x00);
    data.extend_from_slice(map.display_name.as_bytes());
    data
}

/// The three chat-style welcome lines sent once after the map packet.
pub fn welcome_chat_lines() -> [Vec<u8>; 3] {
    [
        chat_command(b"Welcome to Dark Colony."),
        chat_command(b"Waiting in the lobby for other players to join."),
        chat_command(b"Type a message and press enter to chat."),
    ]
}

fn chat_command(text: &[u8]) -> Vec<u8> {
    player_chat_command(text)
}

/// `player_chat` broadcast, reused for both the server's own welcome
/// lines and relayed client chat.
pub fn player_chat_command(text: &[u8]) -> Vec<u8> {
    let mut data = vec![opcode::PLAYER_CHAT];
    data.extend_from_slice(text);
    data.push(0x00);
    data
}

/// `player_name` broadcast: renormalized to the sanitized ASCII the
/// server accepted.
pub fn player_name_command(slot_index: u8, name: &[u8]) -> Vec<u8> {
    let mut data = vec![opcode::PLAYER_NAME, slot_index, 0x00];
    data.extend_from_slice(name);
    data.push(0x00);
    data
}

pub fn player_race_command(slot_index: u8, race_byte: u8) -> Vec<u8> {
    vec![opcode::PLAYER_RACE, race_byte, slot_index]
}

pub fn player_color_command(slot_index: u8, color: u8) -> Vec<u8> {
    vec![opcode::PLAYER_COLOR, color, slot_index]
}

pub fn player_team_command(slot_index: u8, team: u8) -> Vec<u8> {
    vec![opcode::PLAYER_TEAM, team, slot_index]
}

pub fn player_ready_command(slot_index: u8, ready: ReadyByte) -> Vec<u8> {
    vec![opcode::PLAYER_READY, ready as u8, slot_index]
}

/// `game_speed` broadcast sent once at battle start: fixed payload
/// meaning 200%.
pub fn game_speed_command() -> Vec<u8> {
    vec![opcode::GAME_SPEED, 0x21, 0x00, 0x00, 0x00]
}

/// `ping` (0x71): the bare lobby keep-alive, no data.
pub fn ping_command() -> Vec<u8> {
    vec![opcode::PING]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn greeting_encodes_assigned_slot() {
        // slot 3 -> frame data `64 0f 00 03 00`.
        assert_eq!(greeting_command(3), vec![0x64, 0x0f, 0x00, 0x03, 0x00]);
    }

    #[test]
    fn map_command_matches_default_map_bytes() {
        let map = MapDescriptor::default();
        let data = map_command(&map);
        // payload starts `44 38 50 4c 41 59 30 31 2e 53 43 4e 00 41 72
        // 6d 61 67 65 64 64 6f 6e 0a` (room_map opcode then 'D' '8'
        // "PLAY01.SCN\0" "Armagedon\n..."). The opcode byte precedes this
        // in our representation; the remainder must match exactly.
        assert_eq!(
            &data[1..25],
            &[
                0x44, 0x38, 0x50, 0x4c, 0x41, 0x59, 0x30, 0x31, 0x2e, 0x53, 0x43, 0x4e, 0x00,
                0x41, 0x72, 0x6d, 0x61, 0x67, 0x65, 0x64, 0x64, 0x6f, 0x6e, 0x0a,
            ]
        );
    }

    #[test]
    fn snapshot_begins_with_placeholder_bytes_and_eight_player_inits() {
        let mut rng = StdRng::seed_from_u64(7);
        let room = crate::room::RoomManager::new(&mut rng);
        let room = room.get(1).unwrap();

        let data = room_snapshot_command(room);
        assert_eq!(data[0], opcode::ROOM_MAP);
        assert_eq!(&data[1..3], &[0x00, 0x00]);

        for slot in 0..8u8 {
            let offset = 3 + slot as usize * 3;
            assert_eq!(data[offset], opcode::PLAYER_INIT);
            assert_eq!(data[offset + 1], 0x00);
            assert_eq!(data[offset + 2], slot);
        }
    }

    #[test]
    fn game_speed_matches_fixed_broadcast_payload() {
        // broadcast payload `13 21 00 00 00`.
        assert_eq!(game_speed_command(), vec![0x13, 0x21, 0x00, 0x00, 0x00]);
    }
}
