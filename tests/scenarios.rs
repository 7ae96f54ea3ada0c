//! End-to-end scenario tests driving the admission and dispatch paths
//! through a mock client channel instead of a real socket, grounded on
//! `valence/src/unit_test/util.rs`'s `MockClientConnection`/
//! `MockClientHelper` harness: a fake connection backed by a
//! channel/buffer that the production handlers write through unmodified.

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use colony_relay::connection;
use colony_relay::dispatch::handle_command;
use colony_relay::protocol::command::Command;
use colony_relay::protocol::frame::FrameDecoder;
use colony_relay::protocol::opcode;
use colony_relay::room::ClientId;
use colony_relay::server::ServerState;
use colony_relay::session::{ClientSession, OutboundHandle};

/// A client registered against a [`ServerState`] with no real socket: its
/// outbound frames land in `rx` instead of a TCP write half.
struct MockClient {
    id: ClientId,
    rx: mpsc::Receiver<Bytes>,
}

impl MockClient {
    /// Drains every frame currently queued, decoding each into its opcode
    /// and command data for assertions.
    fn drain_frames(&mut self) -> Vec<(u8, Vec<u8>)> {
        let mut decoder = FrameDecoder::new();
        while let Ok(bytes) = self.rx.try_recv() {
            decoder.queue_slice(&bytes);
        }
        let mut out = Vec::new();
        while let Ok(Some((_counter, body))) = decoder.try_next_frame() {
            if body.is_empty() {
                continue;
            }
            out.push((body[0], body[1..].to_vec()));
        }
        out
    }
}

fn mock_client(server: &ServerState, room_id: u32, slot_index: usize) -> MockClient {
    let id = server.allocate_client_id();
    let (tx, rx) = mpsc::channel(64);
    let outbound = OutboundHandle::new(id, tx);
    let (kill_tx, _kill_rx) = oneshot::channel();
    server.register_session(ClientSession::new(id, outbound, room_id, slot_index, kill_tx));
    MockClient { id, rx }
}

#[tokio::test]
async fn greeting_shape_for_a_fresh_room() {
    let server = ServerState::new_seeded(1);
    let room_id = server.get_available_room();
    let (slot_index, _) = server.join_room(room_id, 1).unwrap();
    let mut client = mock_client(&server, room_id, slot_index);

    let outbound = server.with_session(client.id, |s| s.outbound.clone()).unwrap();
    connection::send_greeting(&outbound, &server, room_id, slot_index as u8).unwrap();

    let frames = client.drain_frames();
    assert_eq!(frames.len(), 6, "greeting + snapshot + map + 3 welcome lines");

    assert_eq!(frames[0].0, opcode::INITIAL_PACKET);
    assert_eq!(frames[0].1, vec![0x0f, 0x00, slot_index as u8, 0x00]);

    assert_eq!(frames[1].0, opcode::ROOM_MAP);
    assert_eq!(&frames[1].1[..2], &[0x00, 0x00]);

    assert_eq!(frames[2].0, opcode::ROOM_MAP);
    assert_eq!(frames[2].1[0], b'D');
    assert_eq!(frames[2].1[1], b'8');

    for frame in &frames[3..] {
        assert_eq!(frame.0, opcode::PLAYER_CHAT);
    }
}

#[tokio::test]
async fn name_change_is_broadcast_to_both_clients() {
    let server = ServerState::new_seeded(2);
    let room_id = server.get_available_room();
    let (slot_a, _) = server.join_room(room_id, 10).unwrap();
    let (slot_b, _) = server.join_room(room_id, 20).unwrap();
    let mut a = mock_client(&server, room_id, slot_a);
    let mut b = mock_client(&server, room_id, slot_b);

    handle_command(
        &server,
        a.id,
        Command::PlayerName {
            slot: slot_a as u8,
            name: b"Foo".to_vec(),
        },
    );

    for client in [&mut a, &mut b] {
        let frames = client.drain_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].0, opcode::PLAYER_NAME);
        assert_eq!(
            frames[0].1,
            vec![slot_a as u8, 0x00, b'F', b'o', b'o', 0x00]
        );
    }

    let stored = server
        .with_room(room_id, |room| room.slots[slot_a].name.clone())
        .unwrap();
    assert_eq!(stored, "Foo");
}

#[tokio::test]
async fn ready_cascade_marks_ai_slot_last() {
    let server = ServerState::new_seeded(3);
    let room_id = server.get_available_room();
    let (slot_a, _) = server.join_room(room_id, 1).unwrap();
    let (slot_b, _) = server.join_room(room_id, 2).unwrap();
    let mut a = mock_client(&server, room_id, slot_a);
    let mut b = mock_client(&server, room_id, slot_b);

    handle_command(&server, a.id, Command::PlayerReady);
    let frames_a = a.drain_frames();
    assert_eq!(frames_a.len(), 1);
    assert_eq!(frames_a[0].1, vec![0x02, slot_a as u8]);

    let ai_ready = server
        .with_room(room_id, |r| r.slots[opcode::AI_SLOT].ready)
        .unwrap();
    assert!(!ai_ready);

    handle_command(&server, b.id, Command::PlayerReady);
    let frames_b = b.drain_frames();
    // ready broadcast for slot b, plus the AI-slot cascade broadcast.
    assert_eq!(frames_b.len(), 2);
    assert_eq!(frames_b[0].1, vec![0x02, slot_b as u8]);
    assert_eq!(frames_b[1].1, vec![0x02, opcode::AI_SLOT as u8]);

    let ai_ready = server
        .with_room(room_id, |r| r.slots[opcode::AI_SLOT].ready)
        .unwrap();
    assert!(ai_ready);
}

#[tokio::test]
async fn battle_start_broadcasts_game_speed_once_both_initiated() {
    let server = ServerState::new_seeded(4);
    let room_id = server.get_available_room();
    let (slot_a, _) = server.join_room(room_id, 1).unwrap();
    let (slot_b, _) = server.join_room(room_id, 2).unwrap();
    let mut a = mock_client(&server, room_id, slot_a);
    let mut b = mock_client(&server, room_id, slot_b);

    handle_command(&server, a.id, Command::BeginBattle);
    assert!(!server.with_room(room_id, |r| r.in_battle).unwrap());
    // Let the spawned battle-ping task run its first iteration before
    // inspecting what it queued.
    tokio::task::yield_now().await;
    let frames_a = a.drain_frames();
    assert!(frames_a.iter().any(|(op, _)| *op == opcode::BATTLE_PING1));

    handle_command(&server, b.id, Command::BeginBattle);
    assert!(server.with_room(room_id, |r| r.in_battle).unwrap());

    let frames_b = b.drain_frames();
    assert!(frames_b
        .iter()
        .any(|(op, data)| *op == opcode::GAME_SPEED && data == &[0x21, 0x00, 0x00, 0x00]));
}

#[tokio::test]
async fn opaque_relay_excludes_the_sender() {
    let server = ServerState::new_seeded(5);
    let room_id = server.get_available_room();
    let (slot_a, _) = server.join_room(room_id, 1).unwrap();
    let (slot_b, _) = server.join_room(room_id, 2).unwrap();
    let mut a = mock_client(&server, room_id, slot_a);
    let mut b = mock_client(&server, room_id, slot_b);

    handle_command(
        &server,
        a.id,
        Command::OpaqueRelay {
            opcode: opcode::UNIT_ATTACK,
            data: vec![1, 2, 3],
        },
    );

    assert!(a.drain_frames().is_empty());
    let frames_b = b.drain_frames();
    assert_eq!(frames_b, vec![(opcode::UNIT_ATTACK, vec![1, 2, 3])]);
}

#[tokio::test]
async fn disconnect_resets_slot_and_notifies_remaining_clients() {
    let server = ServerState::new_seeded(6);
    let room_id = server.get_available_room();
    let (slot_a, _) = server.join_room(room_id, 1).unwrap();
    let (slot_b, _) = server.join_room(room_id, 2).unwrap();
    let a = mock_client(&server, room_id, slot_a);
    let mut b = mock_client(&server, room_id, slot_b);
    b.drain_frames();

    connection::cleanup_client(&server, a.id, room_id);

    let slot_state = server
        .with_room(room_id, |room| {
            (
                room.slots[slot_a].client_id,
                room.slots[slot_a].ready,
            )
        })
        .unwrap();
    assert_eq!(slot_state, (None, true));

    let frames_b = b.drain_frames();
    assert_eq!(frames_b.len(), 1);
    assert_eq!(frames_b[0].0, opcode::ROOM_MAP);
}
