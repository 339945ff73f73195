//! Integration tests for the room system: registry, actors, game flow.

use std::sync::Arc;
use std::time::Duration;

use quizhall_protocol::{JsonCodec, PackId, Role, RoomId, UserId};
use quizhall_room::{GameState, LeaveOutcome, RoomError, RoomLimits, RoomRegistry};
use quizhall_store::{MemoryStore, UserStats};
use quizhall_transport::{ConnectionId, ConnectionSender, Outbound};
use serde_json::Value;
use tokio::sync::mpsc;

const PACK: &str = r#"{
    "title": "Basics",
    "questions": [
        {
            "title": "2 + 2?",
            "image_url": "",
            "value": 100,
            "answers": [{"text": "4", "correct": true}, {"text": "5", "correct": false}]
        },
        {
            "title": "Capital of Peru?",
            "value": 50,
            "answers": [{"text": "Quito", "correct": false}, {"text": "Lima", "correct": true}]
        }
    ]
}"#;

const ROOM: RoomId = RoomId(42);
const OWNER: UserId = UserId(1);
const ALICE: UserId = UserId(2);
const BOB: UserId = UserId(3);

type Rx = mpsc::Receiver<Outbound>;

async fn setup_with(limits: RoomLimits, max_users: u32) -> (Arc<MemoryStore>, RoomRegistry<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    store.insert_user(OWNER, "owner").await;
    store.insert_user(ALICE, "alice").await;
    store.insert_user(BOB, "bob").await;
    store.insert_pack(PackId(7), PACK).await;
    store.insert_room(ROOM, OWNER, PackId(7), max_users).await;
    let registry = RoomRegistry::new(Arc::clone(&store), Arc::new(JsonCodec), limits);
    (store, registry)
}

async fn setup() -> (Arc<MemoryStore>, RoomRegistry<MemoryStore>) {
    setup_with(RoomLimits::default(), 8).await
}

fn conn(id: u64) -> (ConnectionSender, Rx) {
    ConnectionSender::channel(ConnectionId::new(id), 32)
}

/// Receives the next frame as JSON, failing the test after a second.
async fn next_event(rx: &mut Rx) -> Value {
    match tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
        Ok(Some(Outbound::Text(text))) => serde_json::from_str(&text).expect("valid JSON"),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

/// Skips frames until one of type `ty` arrives.
async fn expect_event(rx: &mut Rx, ty: &str) -> Value {
    loop {
        let event = next_event(rx).await;
        if event["type"] == ty {
            return event;
        }
    }
}

fn assert_quiet(rx: &mut Rx) {
    if let Ok(frame) = rx.try_recv() {
        panic!("expected no frame, got {frame:?}");
    }
}

/// Joins `user` to the room and drains their join frames.
async fn join(registry: &RoomRegistry<MemoryStore>, user: UserId, conn_id: u64) -> Rx {
    let (sender, mut rx) = conn(conn_id);
    let (room, _) = registry.get_or_create(ROOM).await.unwrap();
    room.join(user, sender).await.unwrap();
    expect_event(&mut rx, "users_list").await;
    rx
}

#[tokio::test]
async fn test_first_joiner_owns_second_sees_roster() {
    let (store, registry) = setup().await;

    let (owner_tx, mut owner_rx) = conn(1);
    let (room, created) = registry.get_or_create(ROOM).await.unwrap();
    assert!(created);
    assert_eq!(room.join(OWNER, owner_tx).await.unwrap(), Role::Owner);

    let joined = next_event(&mut owner_rx).await;
    assert_eq!(joined["type"], "joined_room");
    assert_eq!(joined["payload"]["role"], "owner");
    let roster = next_event(&mut owner_rx).await;
    assert_eq!(roster["payload"]["users"].as_array().unwrap().len(), 1);

    let (alice_tx, mut alice_rx) = conn(2);
    let (room, created) = registry.get_or_create(ROOM).await.unwrap();
    assert!(!created);
    assert_eq!(room.join(ALICE, alice_tx).await.unwrap(), Role::Player);

    let joined = next_event(&mut alice_rx).await;
    assert_eq!(joined["payload"]["role"], "player");
    for rx in [&mut owner_rx, &mut alice_rx] {
        let roster = next_event(rx).await;
        assert_eq!(roster["type"], "users_list");
        let users = roster["payload"]["users"].as_array().unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0]["name"], "owner");
        assert_eq!(users[1]["name"], "alice");
    }

    assert_eq!(store.member_room(ALICE).await, Some(ROOM));
    assert_eq!(store.room_record(ROOM).await.unwrap().current_users, 2);
}

#[tokio::test]
async fn test_rejoin_reattaches_without_roster_change() {
    let (_store, registry) = setup().await;
    let _owner_rx = join(&registry, OWNER, 1).await;
    let mut old_rx = join(&registry, ALICE, 2).await;

    let (new_tx, mut new_rx) = conn(3);
    let room = registry.get(ROOM).await.unwrap();
    assert_eq!(room.join(ALICE, new_tx).await.unwrap(), Role::Player);

    let joined = next_event(&mut new_rx).await;
    assert_eq!(joined["type"], "joined_room");
    let info = room.info().await.unwrap();
    assert_eq!(info.participants, 2);

    // Only the new connection receives room events now.
    room.start_game(OWNER).await.unwrap();
    expect_event(&mut new_rx, "game_started").await;
    assert_quiet(&mut old_rx);
}

#[tokio::test]
async fn test_non_owner_cannot_start_game() {
    let (_store, registry) = setup().await;
    let mut owner_rx = join(&registry, OWNER, 1).await;
    let mut alice_rx = join(&registry, ALICE, 2).await;
    expect_event(&mut owner_rx, "users_list").await;

    let room = registry.get(ROOM).await.unwrap();
    let err = room.start_game(ALICE).await.unwrap_err();
    assert!(matches!(err, RoomError::NotOwner));
    assert_eq!(err.code(), 403);
    assert!(!err.closes_connection());

    // Round-trip through the actor so anything it sent is already queued.
    assert_eq!(room.game_state().await.unwrap(), GameState::Lobby);
    assert_quiet(&mut owner_rx);
    assert_quiet(&mut alice_rx);
}

#[tokio::test]
async fn test_start_game_twice_broadcasts_twice() {
    let (_store, registry) = setup().await;
    let mut owner_rx = join(&registry, OWNER, 1).await;
    let room = registry.get(ROOM).await.unwrap();

    room.start_game(OWNER).await.unwrap();
    room.start_game(OWNER).await.unwrap();

    expect_event(&mut owner_rx, "game_started").await;
    expect_event(&mut owner_rx, "game_started").await;
    assert_eq!(room.game_state().await.unwrap(), GameState::InProgress);
    assert_eq!(room.info().await.unwrap().cursor, 0);
}

#[tokio::test]
async fn test_full_game_ranks_and_persists_once() {
    let (store, registry) = setup().await;
    let mut owner_rx = join(&registry, OWNER, 1).await;
    let mut alice_rx = join(&registry, ALICE, 2).await;
    let room = registry.get(ROOM).await.unwrap();

    assert!(matches!(
        room.next_question(OWNER).await,
        Err(RoomError::GameNotStarted)
    ));
    room.start_game(OWNER).await.unwrap();

    room.next_question(OWNER).await.unwrap();
    let question = expect_event(&mut alice_rx, "question").await;
    assert_eq!(question["payload"]["question"]["title"], "2 + 2?");
    assert!(question["payload"]["question"]["image_url"].is_null());
    room.answer(ALICE, 0).await.unwrap();
    room.answer(OWNER, 1).await.unwrap();

    room.next_question(OWNER).await.unwrap();
    room.answer(ALICE, 1).await.unwrap();
    room.answer(OWNER, 1).await.unwrap();

    // Cursor at the end: finish.
    room.next_question(OWNER).await.unwrap();
    for rx in [&mut owner_rx, &mut alice_rx] {
        let done = expect_event(rx, "questions_done").await;
        let ranking = done["payload"]["ranking"].as_array().unwrap();
        assert_eq!(ranking[0]["id"], ALICE.0);
        assert_eq!(ranking[0]["score"], 150);
        assert_eq!(ranking[1]["id"], OWNER.0);
        assert_eq!(ranking[1]["score"], 50);
    }

    let info = room.info().await.unwrap();
    assert_eq!(info.state, GameState::Finished);
    assert_eq!(info.cursor, info.question_count);

    assert_eq!(
        store.user_stats(ALICE).await,
        Some(UserStats {
            matches_won: 1,
            matches_played: 1
        })
    );
    assert_eq!(
        store.user_stats(OWNER).await,
        Some(UserStats {
            matches_won: 0,
            matches_played: 1
        })
    );

    // Finished is terminal: no second questions_done, no more counters.
    assert!(matches!(
        room.next_question(OWNER).await,
        Err(RoomError::GameFinished)
    ));
    assert!(matches!(
        room.answer(ALICE, 0).await,
        Err(RoomError::NoActiveQuestion)
    ));
    assert_quiet(&mut alice_rx);
    assert_eq!(store.user_stats(ALICE).await.unwrap().matches_won, 1);
}

#[tokio::test]
async fn test_ranking_ties_keep_join_order() {
    let (_store, registry) = setup().await;
    let mut owner_rx = join(&registry, OWNER, 1).await;
    let _alice_rx = join(&registry, ALICE, 2).await;
    let _bob_rx = join(&registry, BOB, 3).await;
    let room = registry.get(ROOM).await.unwrap();

    room.start_game(OWNER).await.unwrap();
    room.next_question(OWNER).await.unwrap();
    room.answer(BOB, 0).await.unwrap();
    room.answer(ALICE, 0).await.unwrap();
    room.next_question(OWNER).await.unwrap();
    room.next_question(OWNER).await.unwrap();

    let done = expect_event(&mut owner_rx, "questions_done").await;
    let ids: Vec<u64> = done["payload"]["ranking"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, vec![ALICE.0, BOB.0, OWNER.0]);
}

#[tokio::test]
async fn test_duplicate_answer_scores_once() {
    let (_store, registry) = setup().await;
    let mut owner_rx = join(&registry, OWNER, 1).await;
    let room = registry.get(ROOM).await.unwrap();

    assert!(matches!(
        room.answer(OWNER, 0).await,
        Err(RoomError::NoActiveQuestion)
    ));

    room.start_game(OWNER).await.unwrap();
    assert!(matches!(
        room.answer(OWNER, 0).await,
        Err(RoomError::NoActiveQuestion)
    ));

    room.next_question(OWNER).await.unwrap();
    room.answer(OWNER, 0).await.unwrap();
    let err = room.answer(OWNER, 0).await.unwrap_err();
    assert!(matches!(err, RoomError::AlreadyAnswered));
    assert_eq!(err.code(), 409);

    let users = room.users().await.unwrap();
    assert_eq!(users[0].score, 100);

    let roster = expect_event(&mut owner_rx, "users_list").await;
    assert_eq!(roster["payload"]["users"][0]["score"], 100);
}

#[tokio::test]
async fn test_wrong_or_out_of_range_answer_scores_nothing() {
    let (_store, registry) = setup().await;
    let _owner_rx = join(&registry, OWNER, 1).await;
    let _alice_rx = join(&registry, ALICE, 2).await;
    let room = registry.get(ROOM).await.unwrap();

    room.start_game(OWNER).await.unwrap();
    room.next_question(OWNER).await.unwrap();
    room.answer(ALICE, 99).await.unwrap();
    room.answer(OWNER, 1).await.unwrap();

    assert!(room.users().await.unwrap().iter().all(|p| p.score == 0));
}

#[tokio::test]
async fn test_non_participant_cannot_answer() {
    let (_store, registry) = setup().await;
    let _owner_rx = join(&registry, OWNER, 1).await;
    let room = registry.get(ROOM).await.unwrap();
    room.start_game(OWNER).await.unwrap();
    room.next_question(OWNER).await.unwrap();

    assert!(matches!(
        room.answer(BOB, 0).await,
        Err(RoomError::NotAParticipant(..))
    ));
}

#[tokio::test]
async fn test_player_leave_rebroadcasts_roster() {
    let (store, registry) = setup().await;
    let mut owner_rx = join(&registry, OWNER, 1).await;
    let mut alice_rx = join(&registry, ALICE, 2).await;
    expect_event(&mut owner_rx, "users_list").await;
    let room = registry.get(ROOM).await.unwrap();

    assert_eq!(room.leave(ALICE).await.unwrap(), LeaveOutcome::Left);

    let left = next_event(&mut alice_rx).await;
    assert_eq!(left["type"], "left_room");
    assert_eq!(left["payload"]["room_id"], ROOM.0);

    let roster = next_event(&mut owner_rx).await;
    assert_eq!(roster["payload"]["users"].as_array().unwrap().len(), 1);

    assert_eq!(store.member_room(ALICE).await, None);
    assert_eq!(store.room_record(ROOM).await.unwrap().current_users, 1);
    assert_eq!(registry.memberships().room_of(ALICE).await, None);

    assert!(matches!(
        room.leave(ALICE).await,
        Err(RoomError::NotAParticipant(..))
    ));
}

#[tokio::test]
async fn test_owner_leave_tears_room_down() {
    let (store, registry) = setup().await;
    let mut owner_rx = join(&registry, OWNER, 1).await;
    let mut alice_rx = join(&registry, ALICE, 2).await;
    let room = registry.get(ROOM).await.unwrap();

    assert_eq!(room.leave(OWNER).await.unwrap(), LeaveOutcome::RoomClosed);
    registry.delete(ROOM).await;

    for rx in [&mut owner_rx, &mut alice_rx] {
        let deleted = expect_event(rx, "room_deleted").await;
        assert_eq!(deleted["payload"]["room_id"], ROOM.0);
        assert_eq!(rx.recv().await, Some(Outbound::Close));
    }

    assert!(registry.get(ROOM).await.is_none());
    assert!(store.room_record(ROOM).await.is_none());
    assert_eq!(store.member_count(ROOM).await, 0);
    assert_eq!(registry.memberships().room_of(ALICE).await, None);

    // The old handle is dead and the room can't be recreated.
    assert!(matches!(
        room.start_game(OWNER).await,
        Err(RoomError::Unavailable(_))
    ));
    assert!(matches!(
        registry.get_or_create(ROOM).await,
        Err(RoomError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_owner_disconnect_tears_room_down() {
    let (_store, registry) = setup().await;
    let _owner_rx = join(&registry, OWNER, 1).await;
    let mut alice_rx = join(&registry, ALICE, 2).await;
    let room = registry.get(ROOM).await.unwrap();

    // A stale connection id changes nothing.
    assert_eq!(
        room.disconnect(OWNER, ConnectionId::new(99)).await.unwrap(),
        LeaveOutcome::Detached
    );
    assert_eq!(room.info().await.unwrap().participants, 2);

    assert_eq!(
        room.disconnect(OWNER, ConnectionId::new(1)).await.unwrap(),
        LeaveOutcome::RoomClosed
    );
    expect_event(&mut alice_rx, "room_deleted").await;
    assert!(matches!(room.info().await, Err(RoomError::Unavailable(_))));
}

#[tokio::test]
async fn test_owner_dropped_by_backpressure_still_closes_room() {
    let (_store, registry) = setup().await;
    // Room for exactly the owner's join frames; nothing ever drains it.
    let (owner_tx, _owner_rx) = ConnectionSender::channel(ConnectionId::new(1), 2);
    let (room, _) = registry.get_or_create(ROOM).await.unwrap();
    room.join(OWNER, owner_tx).await.unwrap();
    let mut alice_rx = join(&registry, ALICE, 2).await;

    let info = room.info().await.unwrap();
    assert_eq!(info.participants, 2);
    assert_eq!(info.connections, 1, "owner should have been dropped from the fanout");

    assert_eq!(
        room.disconnect(OWNER, ConnectionId::new(1)).await.unwrap(),
        LeaveOutcome::RoomClosed
    );
    expect_event(&mut alice_rx, "room_deleted").await;
    assert_eq!(registry.memberships().room_of(ALICE).await, None);
}

#[tokio::test]
async fn test_owner_stale_connection_after_rejoin_keeps_room() {
    let (_store, registry) = setup().await;
    let _old_rx = join(&registry, OWNER, 1).await;
    let (new_tx, _new_rx) = conn(3);
    let room = registry.get(ROOM).await.unwrap();
    room.join(OWNER, new_tx).await.unwrap();

    assert_eq!(
        room.disconnect(OWNER, ConnectionId::new(1)).await.unwrap(),
        LeaveOutcome::Detached
    );
    assert_eq!(room.info().await.unwrap().participants, 1);
    assert_eq!(
        room.disconnect(OWNER, ConnectionId::new(3)).await.unwrap(),
        LeaveOutcome::RoomClosed
    );
}

#[tokio::test]
async fn test_player_disconnect_keeps_participant() {
    let (_store, registry) = setup().await;
    let _owner_rx = join(&registry, OWNER, 1).await;
    let _alice_rx = join(&registry, ALICE, 2).await;
    let room = registry.get(ROOM).await.unwrap();

    assert_eq!(
        room.disconnect(ALICE, ConnectionId::new(2)).await.unwrap(),
        LeaveOutcome::Detached
    );
    let info = room.info().await.unwrap();
    assert_eq!(info.participants, 2);
    assert_eq!(info.connections, 1);
}

#[tokio::test]
async fn test_capacity_is_enforced() {
    let (_store, registry) = setup_with(RoomLimits::default(), 2).await;
    let _owner_rx = join(&registry, OWNER, 1).await;
    let _alice_rx = join(&registry, ALICE, 2).await;

    let (bob_tx, _bob_rx) = conn(3);
    let room = registry.get(ROOM).await.unwrap();
    let err = room.join(BOB, bob_tx).await.unwrap_err();
    assert!(matches!(err, RoomError::RoomFull(_)));
    assert_eq!(err.code(), 503);

    let info = room.info().await.unwrap();
    assert!(info.participants <= info.capacity);
    assert_eq!(registry.memberships().room_of(BOB).await, None);
}

#[tokio::test]
async fn test_capacity_clamped_by_process_limit() {
    let limits = RoomLimits {
        max_users_in_room: 1,
        ..RoomLimits::default()
    };
    let (_store, registry) = setup_with(limits, 8).await;
    let _owner_rx = join(&registry, OWNER, 1).await;

    let (alice_tx, _rx) = conn(2);
    let room = registry.get(ROOM).await.unwrap();
    assert!(matches!(
        room.join(ALICE, alice_tx).await,
        Err(RoomError::RoomFull(_))
    ));
}

#[tokio::test]
async fn test_user_cannot_be_in_two_rooms() {
    let (store, registry) = setup().await;
    store.insert_room(RoomId(43), BOB, PackId(7), 8).await;
    let _owner_rx = join(&registry, OWNER, 1).await;

    let (tx, _rx) = conn(2);
    let (other, _) = registry.get_or_create(RoomId(43)).await.unwrap();
    let err = other.join(OWNER, tx).await.unwrap_err();
    assert!(matches!(err, RoomError::AlreadyInAnotherRoom(OWNER, ROOM)));
    assert_eq!(err.code(), 409);
    assert!(err.closes_connection());
    assert_eq!(other.info().await.unwrap().participants, 0);
}

#[tokio::test]
async fn test_concurrent_joins_to_different_rooms_admit_once() {
    let (store, registry) = setup().await;
    store.insert_room(RoomId(43), BOB, PackId(7), 8).await;
    let (a, _) = registry.get_or_create(ROOM).await.unwrap();
    let (b, _) = registry.get_or_create(RoomId(43)).await.unwrap();

    let (tx_a, _rx_a) = conn(1);
    let (tx_b, _rx_b) = conn(2);
    let (ra, rb) = tokio::join!(a.join(ALICE, tx_a), b.join(ALICE, tx_b));

    assert!(ra.is_ok() ^ rb.is_ok(), "exactly one join must win");
    let in_a = a.info().await.unwrap().participants;
    let in_b = b.info().await.unwrap().participants;
    assert_eq!(in_a + in_b, 1);
}

#[tokio::test]
async fn test_ban_removes_and_blocks_until_unban() {
    let (store, registry) = setup().await;
    let mut owner_rx = join(&registry, OWNER, 1).await;
    let mut alice_rx = join(&registry, ALICE, 2).await;
    expect_event(&mut owner_rx, "users_list").await;
    let room = registry.get(ROOM).await.unwrap();

    assert!(matches!(room.ban(ALICE, OWNER).await, Err(RoomError::NotOwner)));
    assert!(matches!(room.ban(OWNER, OWNER).await, Err(RoomError::CannotBanSelf)));

    room.ban(OWNER, ALICE).await.unwrap();
    let banned = next_event(&mut alice_rx).await;
    assert_eq!(banned["type"], "user_banned");
    let roster = next_event(&mut owner_rx).await;
    assert_eq!(roster["payload"]["users"].as_array().unwrap().len(), 1);

    let info = room.info().await.unwrap();
    assert_eq!(info.participants, 1);
    assert_eq!(info.banned, vec![ALICE]);
    assert_eq!(store.member_room(ALICE).await, None);

    let (tx, _rx) = conn(3);
    let err = room.join(ALICE, tx).await.unwrap_err();
    assert!(matches!(err, RoomError::Banned(..)));
    assert_eq!(err.code(), 403);

    room.unban(OWNER, ALICE).await.unwrap();
    let (tx, _rx) = conn(4);
    assert_eq!(room.join(ALICE, tx).await.unwrap(), Role::Player);
}

#[tokio::test]
async fn test_ban_of_absent_user_is_preemptive() {
    let (_store, registry) = setup().await;
    let _owner_rx = join(&registry, OWNER, 1).await;
    let room = registry.get(ROOM).await.unwrap();

    room.ban(OWNER, BOB).await.unwrap();
    let (tx, _rx) = conn(2);
    assert!(matches!(room.join(BOB, tx).await, Err(RoomError::Banned(..))));
}

#[tokio::test]
async fn test_finished_room_refuses_newcomers() {
    let (_store, registry) = setup().await;
    let _owner_rx = join(&registry, OWNER, 1).await;
    let room = registry.get(ROOM).await.unwrap();
    room.start_game(OWNER).await.unwrap();
    for _ in 0..3 {
        room.next_question(OWNER).await.unwrap();
    }

    let (tx, _rx) = conn(2);
    let err = room.join(ALICE, tx).await.unwrap_err();
    assert!(matches!(err, RoomError::InvalidState(_)));
    assert_eq!(err.code(), 400);

    // Existing participants can still re-attach.
    let (tx, _rx) = conn(3);
    assert_eq!(room.join(OWNER, tx).await.unwrap(), Role::Owner);
}

#[tokio::test]
async fn test_concurrent_get_or_create_creates_once() {
    let (_store, registry) = setup().await;
    let registry = Arc::new(registry);

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let registry = Arc::clone(&registry);
        tasks.push(tokio::spawn(async move {
            registry.get_or_create(ROOM).await.unwrap()
        }));
    }

    let mut created = 0;
    for task in tasks {
        let (_handle, was_created) = task.await.unwrap();
        if was_created {
            created += 1;
        }
    }
    assert_eq!(created, 1);
    assert_eq!(registry.room_count().await, 1);
}

#[tokio::test]
async fn test_room_limit_is_enforced() {
    let limits = RoomLimits {
        max_rooms: 1,
        ..RoomLimits::default()
    };
    let (store, registry) = setup_with(limits, 8).await;
    store.insert_room(RoomId(43), BOB, PackId(7), 8).await;

    registry.get_or_create(ROOM).await.unwrap();
    let err = registry.get_or_create(RoomId(43)).await.unwrap_err();
    assert!(matches!(err, RoomError::TooManyRooms));
    assert_eq!(err.code(), 503);

    // The existing room is still reachable.
    registry.get_or_create(ROOM).await.unwrap();
}

#[tokio::test]
async fn test_failed_creation_leaves_no_slot() {
    let (store, registry) = setup().await;
    store.insert_room(RoomId(50), OWNER, PackId(99), 8).await;

    assert!(matches!(
        registry.get_or_create(RoomId(404)).await,
        Err(RoomError::NotFound(_))
    ));
    let err = registry.get_or_create(RoomId(50)).await.unwrap_err();
    assert!(matches!(err, RoomError::Pack(..)));
    assert!(err.closes_connection());

    assert_eq!(registry.room_count().await, 0);
}

#[tokio::test]
async fn test_storage_failure_during_join() {
    let (store, registry) = setup().await;
    let (room, _) = registry.get_or_create(ROOM).await.unwrap();
    store.set_unavailable(true);

    let (tx, _rx) = conn(1);
    let err = room.join(OWNER, tx).await.unwrap_err();
    assert!(matches!(err, RoomError::Storage(_)));
    assert_eq!(err.code(), 500);
    assert_eq!(registry.memberships().room_of(OWNER).await, None);

    store.set_unavailable(false);
    let (tx, _rx) = conn(2);
    assert_eq!(room.join(OWNER, tx).await.unwrap(), Role::Owner);
}

#[tokio::test]
async fn test_read_actions_reply_without_broadcast() {
    let (_store, registry) = setup().await;
    let mut owner_rx = join(&registry, OWNER, 1).await;
    let room = registry.get(ROOM).await.unwrap();

    let users = room.users().await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].role, Role::Owner);
    assert_eq!(room.game_state().await.unwrap().flags(), (false, false));
    assert_quiet(&mut owner_rx);
}

#[tokio::test]
async fn test_shutdown_all_closes_connections() {
    let (_store, registry) = setup().await;
    let mut owner_rx = join(&registry, OWNER, 1).await;

    registry.shutdown_all().await;
    assert_eq!(owner_rx.recv().await, Some(Outbound::Close));
    assert_eq!(registry.room_count().await, 0);
}

#[tokio::test]
async fn test_failed_match_counters_still_finish_the_game() {
    let (store, registry) = setup().await;
    let _owner_rx = join(&registry, OWNER, 1).await;
    let mut alice_rx = join(&registry, ALICE, 2).await;
    let room = registry.get(ROOM).await.unwrap();
    room.start_game(OWNER).await.unwrap();
    room.next_question(OWNER).await.unwrap();
    room.next_question(OWNER).await.unwrap();

    store.set_unavailable(true);
    let err = room.next_question(OWNER).await.unwrap_err();
    assert!(matches!(err, RoomError::Storage(_)));
    assert!(err.closes_connection());
    store.set_unavailable(false);

    expect_event(&mut alice_rx, "questions_done").await;
    assert_eq!(room.info().await.unwrap().state, GameState::Finished);
    assert!(matches!(
        room.next_question(OWNER).await,
        Err(RoomError::GameFinished)
    ));
}

#[tokio::test]
async fn test_current_users_mirror_failure_does_not_undo_membership() {
    let (store, registry) = setup().await;
    let _owner_rx = join(&registry, OWNER, 1).await;
    store.fail_operation("set_current_users", true).await;

    let _alice_rx = join(&registry, ALICE, 2).await;
    let room = registry.get(ROOM).await.unwrap();
    assert_eq!(room.info().await.unwrap().participants, 2);
    assert_eq!(store.member_room(ALICE).await, Some(ROOM));
    assert_eq!(registry.memberships().room_of(ALICE).await, Some(ROOM));

    assert_eq!(room.leave(ALICE).await.unwrap(), LeaveOutcome::Left);
    assert_eq!(room.info().await.unwrap().participants, 1);
    assert_eq!(store.member_room(ALICE).await, None);
    assert_eq!(registry.memberships().room_of(ALICE).await, None);
}

#[tokio::test]
async fn test_failed_membership_write_leaves_join_undone() {
    let (store, registry) = setup().await;
    let _owner_rx = join(&registry, OWNER, 1).await;
    let room = registry.get(ROOM).await.unwrap();
    store.fail_operation("add_member", true).await;

    let (tx, _rx) = conn(2);
    assert!(matches!(room.join(ALICE, tx).await, Err(RoomError::Storage(_))));
    assert_eq!(room.info().await.unwrap().participants, 1);
    assert_eq!(store.member_room(ALICE).await, None);
    assert_eq!(registry.memberships().room_of(ALICE).await, None);
    assert_eq!(store.room_record(ROOM).await.unwrap().current_users, 1);
}

#[tokio::test]
async fn test_failed_membership_delete_keeps_participant() {
    let (store, registry) = setup().await;
    let _owner_rx = join(&registry, OWNER, 1).await;
    let _alice_rx = join(&registry, ALICE, 2).await;
    let room = registry.get(ROOM).await.unwrap();
    store.fail_operation("remove_member", true).await;

    assert!(matches!(room.leave(ALICE).await, Err(RoomError::Storage(_))));
    assert!(matches!(room.ban(OWNER, ALICE).await, Err(RoomError::Storage(_))));

    let info = room.info().await.unwrap();
    assert_eq!(info.participants, 2);
    assert!(info.banned.is_empty());
    assert_eq!(store.member_room(ALICE).await, Some(ROOM));
    assert_eq!(registry.memberships().room_of(ALICE).await, Some(ROOM));
    assert_eq!(store.room_record(ROOM).await.unwrap().current_users, 2);
}
