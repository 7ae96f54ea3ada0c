//! Fixed byte tables for the Dark Colony wire protocol: command opcodes and
//! the handful of enum values carried inside command payloads.

/// A single command opcode. Every command in the protocol is identified by
/// one byte; none share a non-trivial prefix, so matching is always a plain
/// equality check against the first byte of a command region.
pub type Opcode = u8;

pub const BATTLE_PING1: Opcode = 0x02;
pub const BATTLE_PING2: Opcode = 0x08;
pub const INITIAL_PACKET: Opcode = 0x64;
pub const PLAYER_CHAT: Opcode = 0x65;
pub const PLAYER_RACE: Opcode = 0x66;
pub const PLAYER_NAME: Opcode = 0x67;
pub const PLAYER_READY: Opcode = 0x68;
pub const ROOM_MAP: Opcode = 0x69;
pub const PLAYER_TYPE: Opcode = 0x6a;
pub const PLAYER_COLOR: Opcode = 0x6b;
pub const PLAYER_INIT: Opcode = 0x6c;
pub const PLAYER_TEAM: Opcode = 0x6d;
pub const PLAYER_TEAM2: Opcode = 0x6e;
pub const ROOM_PARAM: Opcode = 0x6f;
pub const PING: Opcode = 0x71;
pub const BEGIN_BATTLE: Opcode = 0x76;

/// Opaque relay opcodes: forwarded byte-for-byte to every other
/// client in the room with no server-side interpretation, except
/// [`UNIT_MOVE`] which has the one-byte trailing-zero rule described there.
pub const UNIT_ATTACK: Opcode = 0x09;
pub const UNIT_MOVE: Opcode = 0x0a;
pub const UNIT_SELECT: Opcode = 0x0b;
pub const UNIT_SELECT_DATA: Opcode = 0x0c;
pub const UNIT_DESTINATION: Opcode = 0x0d;
pub const UNIT_DESTINATION_DATA: Opcode = 0x0e;
pub const UNIT_INSPIRE: Opcode = 0x0f;
pub const BUTTON_UNIT: Opcode = 0x10;
pub const BUTTON_BUILDING: Opcode = 0x11;
pub const BUTTON_UPGRADE: Opcode = 0x12;
// The game_speed broadcast's first payload byte is 0x13, which displaces
// it ahead of the two opcodes that would otherwise follow it alphabetically.
pub const GAME_SPEED: Opcode = 0x13;
pub const BUTTON_SUPERWEAPON: Opcode = 0x14;
pub const BATTLE_CHAT: Opcode = 0x15;

/// Opcodes forwarded byte-for-byte to every other client in the room.
pub const OPAQUE_RELAY: &[Opcode] = &[
    UNIT_ATTACK,
    UNIT_MOVE,
    UNIT_SELECT,
    UNIT_SELECT_DATA,
    UNIT_DESTINATION,
    UNIT_DESTINATION_DATA,
    UNIT_INSPIRE,
    BUTTON_UNIT,
    BUTTON_BUILDING,
    BUTTON_UPGRADE,
    BUTTON_SUPERWEAPON,
    BATTLE_CHAT,
    GAME_SPEED,
];

pub fn is_opaque_relay(opcode: Opcode) -> bool {
    OPAQUE_RELAY.contains(&opcode)
}

/// Race values carried in [`PLAYER_RACE`] payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Race {
    Aliens = 0,
    Humans = 1,
}

impl Race {
    pub fn from_wire(byte: u8) -> Self {
        if byte == 1 {
            Race::Humans
        } else {
            Race::Aliens
        }
    }

    pub fn to_wire(self) -> u8 {
        self as u8
    }
}

/// Slot occupant type values carried in [`PLAYER_TYPE`] payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SlotType {
    AiEasy = 0,
    AiHard = 1,
    Gamer = 2,
    None = 3,
}

impl SlotType {
    pub fn to_wire(self) -> u8 {
        self as u8
    }

    pub fn is_active(self) -> bool {
        matches!(self, SlotType::AiEasy | SlotType::AiHard | SlotType::Gamer)
    }
}

/// The `ready` byte values used on the wire. Note this is distinct from
/// the bool a [`crate::room::PlayerSlot::ready`] field stores; `ReadyByte`
/// models the three values actually seen on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyByte {
    Ready = 0,
    NotReady = 1,
    ReadyForBattle = 2,
}

pub const ROOM_SLOT_COUNT: usize = 8;
pub const HUMAN_SLOTS: std::ops::Range<usize> = 1..ROOM_SLOT_COUNT;
pub const AI_SLOT: usize = 0;
pub const COLOR_COUNT: usize = 8;
pub const TEAM_COUNT: usize = 8;

pub const MAX_PAYLOAD_LEN: usize = 4092;
pub const MAX_FRAME_LEN: usize = 4095;
