//! The single server owner struct: wraps the rooms map and the clients map
//! so neither lives as top-level state, and is passed by reference into
//! every handler. Rooms hold client ids, never client handles, and vice
//! versa; both sides resolve through here.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::warn;

use crate::room::{ClientId, Room, RoomId, RoomManager};
use crate::session::ClientSession;

pub struct ServerState {
    rooms: Mutex<RoomManager>,
    clients: Mutex<HashMap<ClientId, Arc<Mutex<ClientSession>>>>,
    next_client_id: AtomicU64,
    /// The one RNG backing every slot/color/race draw for the lifetime of
    /// the server, seeded once at construction (§9: "Seed the RNG from a
    /// clock source; tests inject a deterministic seed"). Kept behind its
    /// own mutex rather than reseeding per call, so `new_seeded` actually
    /// makes every draw after the first reproducible, not just room 1's.
    rng: Mutex<StdRng>,
}

impl ServerState {
    pub fn new() -> Arc<Self> {
        let mut rng = StdRng::from_entropy();
        let rooms = RoomManager::new(&mut rng);
        Arc::new(Self {
            rooms: Mutex::new(rooms),
            clients: Mutex::new(HashMap::new()),
            next_client_id: AtomicU64::new(1),
            rng: Mutex::new(rng),
        })
    }

    /// Constructor taking an explicit seed, so slot/race/color assignment
    /// is reproducible. Used by unit tests and integration tests alike;
    /// not `cfg(test)`-gated since integration tests under `tests/` link
    /// the library without it.
    pub fn new_seeded(seed: u64) -> Arc<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let rooms = RoomManager::new(&mut rng);
        Arc::new(Self {
            rooms: Mutex::new(rooms),
            clients: Mutex::new(HashMap::new()),
            next_client_id: AtomicU64::new(1),
            rng: Mutex::new(rng),
        })
    }

    pub fn allocate_client_id(&self) -> ClientId {
        self.next_client_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn get_available_room(&self) -> RoomId {
        let mut rng = self.rng.lock();
        self.rooms.lock().get_available_room(&mut *rng)
    }

    pub fn join_room(&self, room_id: RoomId, client_id: ClientId) -> Option<(usize, bool)> {
        let mut rng = self.rng.lock();
        self.rooms.lock().join(room_id, client_id, &mut *rng)
    }

    pub fn leave_room(&self, room_id: RoomId, client_id: ClientId) -> Option<(usize, bool)> {
        let mut rng = self.rng.lock();
        self.rooms.lock().leave(room_id, client_id, &mut *rng)
    }

    pub fn try_begin_battle(
        &self,
        room_id: RoomId,
        initiated: &std::collections::HashSet<ClientId>,
    ) -> bool {
        self.rooms.lock().try_begin_battle(room_id, initiated)
    }

    pub fn with_room<R>(&self, room_id: RoomId, f: impl FnOnce(&Room) -> R) -> Option<R> {
        self.rooms.lock().get(room_id).map(f)
    }

    pub fn with_room_mut<R>(&self, room_id: RoomId, f: impl FnOnce(&mut Room) -> R) -> Option<R> {
        self.rooms.lock().get_mut(room_id).map(f)
    }

    pub fn register_session(&self, session: ClientSession) {
        let id = session.id;
        self.clients.lock().insert(id, Arc::new(Mutex::new(session)));
    }

    pub fn remove_session(&self, id: ClientId) -> Option<Arc<Mutex<ClientSession>>> {
        self.clients.lock().remove(&id)
    }

    pub fn session_handle(&self, id: ClientId) -> Option<Arc<Mutex<ClientSession>>> {
        self.clients.lock().get(&id).cloned()
    }

    pub fn with_session<R>(&self, id: ClientId, f: impl FnOnce(&mut ClientSession) -> R) -> Option<R> {
        let handle = self.session_handle(id)?;
        let mut session = handle.lock();
        Some(f(&mut session))
    }

    /// All client ids for every connected client, for tickers that sweep
    /// the whole process, e.g. the idle reaper.
    pub fn client_ids(&self) -> Vec<ClientId> {
        self.clients.lock().keys().copied().collect()
    }

    /// Forces a client's connection to close from outside its own reader
    /// task, e.g. the idle reaper. A no-op if the client already
    /// disconnected or was already killed.
    pub fn disconnect(&self, id: ClientId) {
        let kill = self.with_session(id, |s| s.kill.take());
        if let Some(Some(kill)) = kill {
            let _ = kill.send(());
        }
    }

    pub fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.lock().room_ids()
    }

    /// Sends one already-composed command to a single client, logging and
    /// dropping silently if the client has since disconnected (a
    /// best-effort send racing a concurrent teardown, not an error).
    pub fn send_to(&self, id: ClientId, data: &[u8]) {
        let Some(handle) = self.session_handle(id) else {
            return;
        };
        let outbound = handle.lock().outbound.clone();
        if let Err(err) = outbound.send_command(data) {
            warn!(client_id = id, ?err, "failed to encode outbound command");
        }
    }

    /// Broadcasts one command to every client in `room_id` except `except`.
    /// Each recipient is written independently; one failed send does not
    /// prevent the others.
    pub fn broadcast_room(&self, room_id: RoomId, data: &[u8], except: Option<ClientId>) {
        let Some(targets) = self.with_room(room_id, |room| room.client_ids()) else {
            return;
        };

        for client_id in targets {
            if Some(client_id) == except {
                continue;
            }
            self.send_to(client_id, data);
        }
    }
}
