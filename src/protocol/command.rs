//! The command parser: splits a frame body into individual commands
//! and gives each a typed shape. This module is deliberately ignorant of
//! rooms, sessions, or broadcasting — it only knows how to carve bytes into
//! [`Command`] values, mirroring the split between `valence_protocol`'s pure
//! packet decoding and the event-handling crates built on top of it.

use tracing::warn;

use crate::protocol::opcode::{self, Opcode};

/// One parsed command together with its originating opcode. Variable-length
/// text fields are owned, since commands often outlive the frame buffer they
/// were parsed from once queued onto a broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    PlayerName { slot: u8, name: Vec<u8> },
    PlayerChat { text: Vec<u8> },
    PlayerRace { race: u8, slot: u8 },
    PlayerColor { color: u8, slot: u8 },
    PlayerTeam { team: u8, slot: u8 },
    /// The client-sent form carries no slot; the sender's own slot is
    /// implicit.
    PlayerReady,
    BeginBattle,
    BattlePing1 { sequence: u32, ack: u32 },
    BattlePing2,
    /// One of the thirteen unit/button/battle_chat/game_speed opcodes,
    /// forwarded byte-for-byte with no server-side interpretation.
    OpaqueRelay { opcode: Opcode, data: Vec<u8> },
    RoomGreeting,
    Ping,
}

/// Splits `body` (a single frame's stripped payload) into zero or more
/// commands. Malformed trailing bytes and opcodes with no known length stop
/// parsing of the remainder of `body` rather than failing the whole frame:
/// they are logged and skipped, the frame is not rejected.
pub fn parse_commands(body: &[u8]) -> Vec<Command> {
    let mut commands = Vec::new();

    // room_greeting is recognized by a 0x6f (room_param's own opcode) prefix
    // at the very start of a frame: the client echoing bytes from its own
    // room snapshot back at the server. It carries no further frame
    // structure the server cares about, so the whole body is consumed as a
    // single no-op rather than parsed tuple-by-tuple.
    if body.first() == Some(&opcode::ROOM_PARAM) {
        commands.push(Command::RoomGreeting);
        return commands;
    }

    let mut cursor = body;

    while !cursor.is_empty() {
        let opcode = cursor[0];
        let rest = &cursor[1..];

        match opcode {
            opcode::PLAYER_NAME => match parse_name_shaped(rest) {
                Some((slot, name, remainder)) => {
                    commands.push(Command::PlayerName { slot, name });
                    cursor = remainder;
                }
                None => break,
            },
            opcode::PLAYER_CHAT => match split_at_terminator(rest) {
                Some((text, remainder)) => {
                    commands.push(Command::PlayerChat {
                        text: text.to_vec(),
                    });
                    cursor = remainder;
                }
                None => break,
            },
            opcode::PLAYER_RACE => match take_pair(rest) {
                Some(((race, slot), remainder)) => {
                    commands.push(Command::PlayerRace { race, slot });
                    cursor = remainder;
                }
                None => break,
            },
            opcode::PLAYER_COLOR => match take_pair(rest) {
                Some(((color, slot), remainder)) => {
                    commands.push(Command::PlayerColor { color, slot });
                    cursor = remainder;
                }
                None => break,
            },
            opcode::PLAYER_TEAM => match take_pair(rest) {
                Some(((team, slot), remainder)) => {
                    commands.push(Command::PlayerTeam { team, slot });
                    cursor = remainder;
                }
                None => break,
            },
            opcode::PLAYER_READY => {
                commands.push(Command::PlayerReady);
                cursor = rest;
            }
            opcode::BEGIN_BATTLE => match take_n(rest, 3) {
                Some((_, remainder)) => {
                    commands.push(Command::BeginBattle);
                    cursor = remainder;
                }
                None => break,
            },
            opcode::BATTLE_PING1 => match take_n(rest, 8) {
                Some((data, remainder)) => {
                    let sequence = u32::from_le_bytes(data[0..4].try_into().unwrap());
                    let ack = u32::from_le_bytes(data[4..8].try_into().unwrap());
                    commands.push(Command::BattlePing1 { sequence, ack });
                    cursor = remainder;
                }
                None => break,
            },
            opcode::BATTLE_PING2 => match take_n(rest, 6) {
                Some((_, remainder)) => {
                    commands.push(Command::BattlePing2);
                    cursor = remainder;
                }
                None => break,
            },
            opcode::PING => {
                commands.push(Command::Ping);
                cursor = rest;
            }
            op if opcode::is_opaque_relay(op) => {
                let mut data = rest.to_vec();
                if op == opcode::UNIT_MOVE && data.last() == Some(&0x00) {
                    data.pop();
                }
                commands.push(Command::OpaqueRelay { opcode: op, data });
                cursor = &[];
            }
            unknown => {
                warn!(opcode = format!("0x{unknown:02x}"), data = ?rest, "unknown command opcode");
                break;
            }
        }
    }

    commands
}

fn take_n(data: &[u8], n: usize) -> Option<(&[u8], &[u8])> {
    if data.len() < n {
        return None;
    }
    Some(data.split_at(n))
}

fn take_pair(data: &[u8]) -> Option<((u8, u8), &[u8])> {
    let (pair, remainder) = take_n(data, 2)?;
    Some(((pair[0], pair[1]), remainder))
}

/// Splits off bytes up to and including the first `0x00`, returning the
/// bytes before it (without the terminator) and the remainder after it.
fn split_at_terminator(data: &[u8]) -> Option<(&[u8], &[u8])> {
    let pos = data.iter().position(|&b| b == 0x00)?;
    Some((&data[..pos], &data[pos + 1..]))
}

/// `player_name`'s shape: `[slot][0x00][ascii][0x00]`.
fn parse_name_shaped(data: &[u8]) -> Option<(u8, Vec<u8>, &[u8])> {
    let (slot, rest) = take_n(data, 1)?;
    let slot = slot[0];
    let rest = rest.strip_prefix(&[0x00])?;
    let (name, remainder) = split_at_terminator(rest)?;
    Some((slot, name.to_vec(), remainder))
}

/// Sanitizes a display name: drop non-printable bytes, truncate to 32
/// bytes.
pub fn sanitize_name(raw: &[u8]) -> Vec<u8> {
    let mut out: Vec<u8> = raw
        .iter()
        .copied()
        .filter(|&b| (0x20..0x7f).contains(&b))
        .collect();
    out.truncate(32);
    out
}

/// Sanitizes chat text: drop CR/LF, truncate to 120 bytes.
pub fn sanitize_chat(raw: &[u8]) -> Vec<u8> {
    let mut out: Vec<u8> = raw
        .iter()
        .copied()
        .filter(|&b| b != b'\r' && b != b'\n')
        .collect();
    out.truncate(120);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_player_name_command() {
        let body = [opcode::PLAYER_NAME, 0x02, 0x00, b'F', b'o', b'o', 0x00];
        let commands = parse_commands(&body);
        assert_eq!(
            commands,
            vec![Command::PlayerName {
                slot: 2,
                name: b"Foo".to_vec()
            }]
        );
    }

    #[test]
    fn parses_player_chat_command() {
        let body = [opcode::PLAYER_CHAT, b'h', b'i', 0x00];
        let commands = parse_commands(&body);
        assert_eq!(
            commands,
            vec![Command::PlayerChat {
                text: b"hi".to_vec()
            }]
        );
    }

    #[test]
    fn parses_player_ready_with_no_payload() {
        let body = [opcode::PLAYER_READY];
        assert_eq!(parse_commands(&body), vec![Command::PlayerReady]);
    }

    #[test]
    fn parses_begin_battle_fixed_payload() {
        let body = [opcode::BEGIN_BATTLE, 0x06, 0x00, 0x02];
        assert_eq!(parse_commands(&body), vec![Command::BeginBattle]);
    }

    #[test]
    fn parses_battle_ping1_counters() {
        let body = [
            opcode::BATTLE_PING1,
            0x01, 0x00, 0x00, 0x00,
            0x05, 0x00, 0x00, 0x00,
        ];
        assert_eq!(
            parse_commands(&body),
            vec![Command::BattlePing1 {
                sequence: 1,
                ack: 5
            }]
        );
    }

    #[test]
    fn unit_move_strips_trailing_zero() {
        let body = [opcode::UNIT_MOVE, 0x01, 0x02, 0x00];
        assert_eq!(
            parse_commands(&body),
            vec![Command::OpaqueRelay {
                opcode: opcode::UNIT_MOVE,
                data: vec![0x01, 0x02]
            }]
        );
    }

    #[test]
    fn unit_attack_keeps_full_payload_when_no_trailing_zero() {
        let body = [opcode::UNIT_ATTACK, 0x01, 0x02, 0x03];
        assert_eq!(
            parse_commands(&body),
            vec![Command::OpaqueRelay {
                opcode: opcode::UNIT_ATTACK,
                data: vec![0x01, 0x02, 0x03]
            }]
        );
    }

    #[test]
    fn unknown_opcode_is_skipped_without_panicking() {
        let body = [0xf0u8, 0x01, 0x02];
        assert!(parse_commands(&body).is_empty());
    }

    #[test]
    fn room_param_prefix_at_frame_start_is_a_bare_greeting_echo() {
        let body = [opcode::ROOM_PARAM, 0x00, 0x00, 0x00, 0x01];
        assert_eq!(parse_commands(&body), vec![Command::RoomGreeting]);
    }

    #[test]
    fn sanitize_name_truncates_and_drops_control_bytes() {
        let raw = [b'A', 0x01, b'B', b'\n', b'C'];
        assert_eq!(sanitize_name(&raw), b"ABC");

        let long = vec![b'x'; 40];
        assert_eq!(sanitize_name(&long).len(), 32);
    }

    #[test]
    fn sanitize_chat_drops_newlines() {
        assert_eq!(sanitize_chat(b"hi\r\nthere"), b"hithere");
    }
}
