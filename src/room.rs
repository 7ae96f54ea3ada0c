//! The room/slot state machine: player slots, rooms, and the
//! room manager that allocates, looks up, and tears them down.
//!
//! Grounded on `valence_player_list`'s registry shape (it keeps a map of
//! player UUID -> display data that every connected client's
//! view is kept in sync with) generalized to this game's fixed eight-slot
//! layout, and on the `other_examples` lobby implementations
//! (`room_manager.rs`, `room_state.rs`) for the allocate/lookup/teardown
//! split. Randomness is injected via an `&mut impl Rng` parameter rather
//! than called from a thread-local RNG inside these methods, so tests can
//! pass a seeded `StdRng` and get deterministic slot/color/race assignment.

use std::collections::HashMap;
use std::collections::HashSet;

use rand::Rng;

use crate::protocol::opcode::{Race, SlotType, AI_SLOT, COLOR_COUNT, HUMAN_SLOTS, ROOM_SLOT_COUNT};

pub type RoomId = u32;
pub type ClientId = u64;

/// One of the eight fixed positions in a room.
#[derive(Debug, Clone)]
pub struct PlayerSlot {
    pub client_id: Option<ClientId>,
    pub name: String,
    pub race: Race,
    pub slot_type: SlotType,
    pub team: u8,
    pub color: u8,
    pub ready: bool,
}

impl PlayerSlot {
    fn ai_created(rng: &mut impl Rng) -> Self {
        Self {
            client_id: None,
            name: "spectator".to_owned(),
            race: random_race(rng),
            slot_type: SlotType::Gamer,
            team: 0,
            color: 0,
            ready: false,
        }
    }

    /// Slot 0's defaults when a room is reset after emptying, distinct from
    /// [`PlayerSlot::ai_created`]'s defaults for a newly-created room — a
    /// deliberately preserved divergence, not an oversight.
    fn ai_reset() -> Self {
        Self {
            client_id: None,
            name: "battle_bot".to_owned(),
            race: Race::Humans,
            slot_type: SlotType::AiHard,
            team: 0,
            color: 0,
            ready: false,
        }
    }

    fn human_empty(index: usize, rng: &mut impl Rng) -> Self {
        Self {
            client_id: None,
            name: format!("Player{index}"),
            race: random_race(rng),
            slot_type: SlotType::None,
            team: index as u8,
            color: index as u8,
            ready: true,
        }
    }

    pub fn is_active(&self) -> bool {
        self.slot_type.is_active()
    }

    pub fn is_free(&self) -> bool {
        self.client_id.is_none() && matches!(self.slot_type, SlotType::None)
    }
}

fn random_race(rng: &mut impl Rng) -> Race {
    if rng.gen_bool(0.5) {
        Race::Humans
    } else {
        Race::Aliens
    }
}

/// The map descriptor sent in the map packet. Only one default map
/// is modeled; the protocol supports choosing a map, but nothing
/// in this game's client-visible commands lets a lobby member change it, so
/// there is no mutator beyond room creation.
#[derive(Debug, Clone)]
pub struct MapDescriptor {
    pub kind: char,
    pub player_count: char,
    pub filename: String,
    pub display_name: String,
}

impl Default for MapDescriptor {
    fn default() -> Self {
        let mut display_name = String::from("Armageddon\n");
        display_name.push_str(&" ".repeat(33));
        display_name.push_str("(8 Player Desert Map )");

        Self {
            kind: 'D',
            player_count: '8',
            filename: "PLAY01.SCN".to_owned(),
            display_name,
        }
    }
}

/// A container for up to 8 players sharing a map and game session.
pub struct Room {
    pub id: RoomId,
    pub clients: HashSet<ClientId>,
    pub in_battle: bool,
    pub slots: [PlayerSlot; ROOM_SLOT_COUNT],
    pub map: MapDescriptor,
    pub lobby_ping_counter: u32,
}

impl Room {
    fn new_created(id: RoomId, rng: &mut impl Rng) -> Self {
        Self {
            id,
            clients: HashSet::new(),
            in_battle: false,
            slots: std::array::from_fn(|i| {
                if i == AI_SLOT {
                    PlayerSlot::ai_created(rng)
                } else {
                    PlayerSlot::human_empty(i, rng)
                }
            }),
            map: MapDescriptor::default(),
            lobby_ping_counter: 0,
        }
    }

    /// Free human slot count: slots 1..7 with no client and `type == none`.
    pub fn free_human_slot_count(&self) -> usize {
        HUMAN_SLOTS
            .filter(|&i| self.slots[i].is_free())
            .count()
    }

    /// Joinable iff not in-battle and has >=1 free slot.
    pub fn is_joinable(&self) -> bool {
        !self.in_battle && self.free_human_slot_count() >= 1
    }

    /// Resets a room to its initial state after its last client leaves.
    /// Room 1 is reset in place rather than deleted; rooms with id
    /// > 1 are deleted by the caller after this reset restores invariants
    /// for reuse bookkeeping (color/slot state) even though the `Room`
    /// itself is about to be dropped.
    pub fn reset_to_initial(&mut self, rng: &mut impl Rng) {
        self.in_battle = false;
        self.lobby_ping_counter = 0;
        self.slots = std::array::from_fn(|i| {
            if i == AI_SLOT {
                PlayerSlot::ai_reset()
            } else {
                PlayerSlot::human_empty(i, rng)
            }
        });
        self.map = MapDescriptor::default();
    }

    /// All client ids currently in the room, in no particular order. Used
    /// by the room manager to fan broadcasts out without holding the rooms
    /// lock across the per-recipient writes.
    pub fn client_ids(&self) -> Vec<ClientId> {
        self.clients.iter().copied().collect()
    }

    /// Assigns an uninhabited human slot to `client_id`, assigning the
    /// lowest unused color. Returns the slot index and
    /// whether the room already had other clients before this join.
    fn add_client(&mut self, client_id: ClientId, rng: &mut impl Rng) -> Option<(usize, bool)> {
        let free: Vec<usize> = HUMAN_SLOTS.filter(|&i| self.slots[i].is_free()).collect();
        if free.is_empty() {
            return None;
        }

        let was_occupied = !self.clients.is_empty();

        let slot_index = free[rng.gen_range(0..free.len())];
        let color = self.lowest_unused_color(rng);

        let slot = &mut self.slots[slot_index];
        slot.client_id = Some(client_id);
        slot.slot_type = SlotType::Gamer;
        slot.ready = false;
        slot.color = color;

        self.clients.insert(client_id);

        Some((slot_index, was_occupied))
    }

    fn lowest_unused_color(&self, rng: &mut impl Rng) -> u8 {
        let used: HashSet<u8> = self
            .slots
            .iter()
            .filter(|s| s.is_active())
            .map(|s| s.color)
            .collect();

        (0..COLOR_COUNT as u8)
            .find(|c| !used.contains(c))
            .unwrap_or_else(|| rng.gen_range(0..COLOR_COUNT as u8))
    }

    /// Removes `client_id` from the room, resetting its slot. Returns
    /// the freed slot index if the client was found.
    fn remove_client(&mut self, client_id: ClientId) -> Option<usize> {
        self.clients.remove(&client_id);

        let slot_index = self
            .slots
            .iter()
            .position(|s| s.client_id == Some(client_id))?;

        let slot = &mut self.slots[slot_index];
        slot.client_id = None;
        slot.slot_type = SlotType::None;
        slot.ready = true;

        Some(slot_index)
    }
}

/// Allocation, lookup, slot assignment, color assignment, and teardown for
/// the process-wide room set. Broadcast fan-out is a sibling concern
/// handled by the connection layer, which has the per-client write channels
/// this type deliberately doesn't know about: rooms hold client *ids*, not
/// handles.
pub struct RoomManager {
    rooms: HashMap<RoomId, Room>,
    next_room_id: RoomId,
}

impl RoomManager {
    /// Creates the manager with room 1 already present and joinable at
    /// startup.
    pub fn new(rng: &mut impl Rng) -> Self {
        let mut rooms = HashMap::new();
        rooms.insert(1, Room::new_created(1, rng));
        Self {
            rooms,
            next_room_id: 2,
        }
    }

    pub fn get(&self, id: RoomId) -> Option<&Room> {
        self.rooms.get(&id)
    }

    pub fn get_mut(&mut self, id: RoomId) -> Option<&mut Room> {
        self.rooms.get_mut(&id)
    }

    pub fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.keys().copied().collect()
    }

    /// The lowest-id non-battling room with a free slot, creating a fresh
    /// one if none qualifies.
    pub fn get_available_room(&mut self, rng: &mut impl Rng) -> RoomId {
        let mut ids: Vec<RoomId> = self.rooms.keys().copied().collect();
        ids.sort_unstable();

        if let Some(&id) = ids.iter().find(|&&id| self.rooms[&id].is_joinable()) {
            return id;
        }

        let id = self.next_room_id;
        self.next_room_id += 1;
        self.rooms.insert(id, Room::new_created(id, rng));
        id
    }

    /// Joins `client_id` into `room_id`. Returns the assigned slot index and
    /// whether the room had other clients present before the join, or
    /// `None` if the room has no free slot (should not happen given
    /// [`RoomManager::get_available_room`]'s admission predicate, but the
    /// caller treats this defensively).
    pub fn join(
        &mut self,
        room_id: RoomId,
        client_id: ClientId,
        rng: &mut impl Rng,
    ) -> Option<(usize, bool)> {
        self.rooms.get_mut(&room_id)?.add_client(client_id, rng)
    }

    /// Removes `client_id` from `room_id` and tears the room down if it is
    /// now empty (deleting it unless it's room 1, which persists).
    /// Returns the freed slot index and whether the room still has other
    /// clients in it.
    pub fn leave(
        &mut self,
        room_id: RoomId,
        client_id: ClientId,
        rng: &mut impl Rng,
    ) -> Option<(usize, bool)> {
        let room = self.rooms.get_mut(&room_id)?;
        let slot_index = room.remove_client(client_id)?;

        let still_occupied = !room.clients.is_empty();

        if !still_occupied {
            room.reset_to_initial(rng);
            if room_id != 1 {
                self.rooms.remove(&room_id);
            }
        }

        Some((slot_index, still_occupied))
    }

    /// Marks `begin_battle` transition: sets `in_battle` iff every client
    /// currently in the room is in `initiated`. Returns whether the
    /// transition just happened (i.e. this call is what flipped the flag).
    pub fn try_begin_battle(
        &mut self,
        room_id: RoomId,
        initiated: &HashSet<ClientId>,
    ) -> bool {
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return false;
        };

        if room.in_battle {
            return false;
        }

        let all_initiated = room.clients.iter().all(|c| initiated.contains(c));

        if all_initiated && !room.clients.is_empty() {
            room.in_battle = true;
            true
        } else {
            false
        }
    }
}
