//! Coordinator semantics tested directly against the in-memory store.

use roomd::error::RoomError;
use roomd::rooms::{RoomCoordinator, RoomRepository};
use roomd::store::{MemoryStore, Store};
use std::sync::Arc;
use std::time::Duration;

fn setup() -> (RoomCoordinator, Arc<dyn Store>) {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let coordinator = RoomCoordinator::new(Arc::clone(&store), false, Duration::from_secs(3));
    (coordinator, store)
}

/// Mark a user online so invitations to them pass the liveness check.
async fn bring_online(store: &Arc<dyn Store>, user_id: u64) {
    store
        .list_push(&format!("sockets:user:{user_id}"), "test-socket")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_book_fetch_round_trip() {
    let (coordinator, _) = setup();

    let room = coordinator.book(1, true).await.unwrap();
    let fetched = coordinator.fetch(&room.id).await.unwrap();
    assert_eq!(fetched, room);
    assert!(coordinator.is_member_of_any(1).await.unwrap());
}

#[tokio::test]
async fn test_fetch_many_returns_present_rooms() {
    let (coordinator, _) = setup();

    let a = coordinator.book(1, true).await.unwrap();
    let b = coordinator.book(2, false).await.unwrap();

    let ids = vec![a.id.clone(), "missing".to_string(), b.id.clone()];
    let rooms = coordinator.fetch_many(&ids).await.unwrap();
    assert_eq!(rooms, vec![a, b]);
}

#[tokio::test]
async fn test_duplicate_join_rejected() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let coordinator = RoomCoordinator::new(Arc::clone(&store), true, Duration::from_secs(3));

    let room = coordinator.book(1, true).await.unwrap();
    coordinator.join(2, &room.id).await.unwrap();
    assert!(matches!(
        coordinator.join(2, &room.id).await,
        Err(RoomError::AlreadyInvitedOrMember)
    ));
}

#[tokio::test]
async fn test_leave_reassigns_ownership_in_join_order() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let coordinator = RoomCoordinator::new(Arc::clone(&store), true, Duration::from_secs(3));

    let room = coordinator.book(1, true).await.unwrap();
    coordinator.join(2, &room.id).await.unwrap();
    coordinator.join(3, &room.id).await.unwrap();

    let after = coordinator.leave(1, &room.id).await.unwrap();
    assert_eq!(after.owner_id, 2);
    assert_eq!(after.member_ids, vec![2, 3]);
    assert!(!coordinator.is_member_of_any(1).await.unwrap());
}

#[tokio::test]
async fn test_last_leave_deletes_room() {
    let (coordinator, _) = setup();

    let room = coordinator.book(1, true).await.unwrap();
    let after = coordinator.leave(1, &room.id).await.unwrap();
    assert!(after.member_ids.is_empty());

    assert!(matches!(
        coordinator.fetch(&room.id).await,
        Err(RoomError::NotFound)
    ));
    assert!(!coordinator.is_member_of_any(1).await.unwrap());
}

#[tokio::test]
async fn test_leave_non_member_rejected() {
    let (coordinator, _) = setup();

    let room = coordinator.book(1, true).await.unwrap();
    assert!(matches!(
        coordinator.leave(2, &room.id).await,
        Err(RoomError::NotMember)
    ));
}

#[tokio::test]
async fn test_leave_all_resolves_rooms_from_index() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let coordinator = RoomCoordinator::new(Arc::clone(&store), true, Duration::from_secs(3));

    let a = coordinator.book(1, true).await.unwrap();
    let b = coordinator.book(1, true).await.unwrap();
    coordinator.join(2, &a.id).await.unwrap();

    let left = coordinator.leave_all(1, None).await.unwrap();
    assert_eq!(left.len(), 2);
    assert!(!coordinator.is_member_of_any(1).await.unwrap());

    // Room a survives with the other member as owner; room b is gone.
    let a_after = coordinator.fetch(&a.id).await.unwrap();
    assert_eq!(a_after.owner_id, 2);
    assert!(matches!(
        coordinator.fetch(&b.id).await,
        Err(RoomError::NotFound)
    ));
}

#[tokio::test]
async fn test_leave_all_with_no_rooms_is_noop() {
    let (coordinator, _) = setup();
    assert!(coordinator.leave_all(9, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_leave_all_drops_dangling_index_entries() {
    let (coordinator, store) = setup();

    let room = coordinator.book(1, true).await.unwrap();
    // A stale entry pointing at a room the user is not actually in.
    let ghost = coordinator.book(2, true).await.unwrap();
    store
        .list_push("rooms:user:1", &ghost.id)
        .await
        .unwrap();

    let left = coordinator.leave_all(1, None).await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].id, room.id);

    // The ghost room is untouched, the stale entry is gone.
    let ghost_after = coordinator.fetch(&ghost.id).await.unwrap();
    assert_eq!(ghost_after.member_ids, vec![2]);
    assert!(!coordinator.is_member_of_any(1).await.unwrap());
}

#[tokio::test]
async fn test_kick_self_degrades_to_leave() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let coordinator = RoomCoordinator::new(Arc::clone(&store), true, Duration::from_secs(3));

    let room = coordinator.book(1, true).await.unwrap();
    coordinator.join(2, &room.id).await.unwrap();

    // Not the owner, but kicking yourself is a leave.
    let outcome = coordinator.kick(2, 2, &room.id).await.unwrap();
    assert_eq!(outcome.room.member_ids, vec![1]);
    assert_eq!(outcome.room.refused_ids, vec![2]);
}

#[tokio::test]
async fn test_kick_keeps_reverse_index_consistent() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let coordinator = RoomCoordinator::new(Arc::clone(&store), true, Duration::from_secs(3));
    let repo = RoomRepository::new(Arc::clone(&store));

    let room = coordinator.book(1, true).await.unwrap();
    coordinator.join(2, &room.id).await.unwrap();

    coordinator.kick(1, 2, &room.id).await.unwrap();
    assert!(repo.member_room_ids(2).await.unwrap().is_empty());
    assert_eq!(repo.member_room_ids(1).await.unwrap(), vec![room.id]);
}

#[tokio::test]
async fn test_invite_then_accept_admits_guest() {
    let (coordinator, store) = setup();
    bring_online(&store, 2).await;

    let room = coordinator.book(1, false).await.unwrap();
    let outcome = coordinator.invite(1, 2, &room.id).await.unwrap();
    assert_eq!(outcome.room.waiting_ids, vec![2]);
    assert_eq!(outcome.guest_socket_ids, vec!["test-socket".to_string()]);

    let respond = coordinator.respond_invitation(2, true, &room.id).await.unwrap();
    assert_eq!(respond.room.member_ids, vec![1, 2]);
    assert!(respond.room.waiting_ids.is_empty());
    assert!(respond.left_rooms.is_empty());
    assert!(coordinator.is_member_of_any(2).await.unwrap());
}

#[tokio::test]
async fn test_accept_under_single_room_policy_vacates_others() {
    let (coordinator, store) = setup();
    bring_online(&store, 2).await;

    let old = coordinator.book(2, true).await.unwrap();
    let new = coordinator.book(1, false).await.unwrap();

    coordinator.invite(1, 2, &new.id).await.unwrap();
    let outcome = coordinator.respond_invitation(2, true, &new.id).await.unwrap();

    assert_eq!(outcome.room.member_ids, vec![1, 2]);
    assert_eq!(outcome.left_rooms.len(), 1);
    assert_eq!(outcome.left_rooms[0].id, old.id);
    assert!(matches!(
        coordinator.fetch(&old.id).await,
        Err(RoomError::NotFound)
    ));
}

#[tokio::test]
async fn test_waiting_guest_is_not_a_member() {
    let (coordinator, store) = setup();
    bring_online(&store, 2).await;

    let room = coordinator.book(1, false).await.unwrap();
    coordinator.invite(1, 2, &room.id).await.unwrap();

    // An invitation alone grants no membership.
    assert!(!coordinator.is_member_of_any(2).await.unwrap());
    assert!(matches!(
        coordinator.leave(2, &room.id).await,
        Err(RoomError::NotMember)
    ));
}

#[tokio::test]
async fn test_concurrent_entries_respect_single_room_policy() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let coordinator = Arc::new(RoomCoordinator::new(
        Arc::clone(&store),
        false,
        Duration::from_secs(3),
    ));

    let room = coordinator.book(1, true).await.unwrap();

    // The same user books a new room and joins an existing one at once.
    // The entry guard serializes them, so exactly one may land.
    let book = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.book(2, true).await })
    };
    let join = {
        let coordinator = Arc::clone(&coordinator);
        let room_id = room.id.clone();
        tokio::spawn(async move { coordinator.join(2, &room_id).await })
    };

    let entered = [book.await.unwrap().is_ok(), join.await.unwrap().is_ok()];
    assert_eq!(entered.iter().filter(|ok| **ok).count(), 1);

    let repo = RoomRepository::new(Arc::clone(&store));
    assert_eq!(repo.member_room_ids(2).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_joins_do_not_lose_members() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let coordinator = Arc::new(RoomCoordinator::new(
        Arc::clone(&store),
        true,
        Duration::from_secs(3),
    ));

    let room = coordinator.book(1, true).await.unwrap();

    let mut tasks = Vec::new();
    for user in 2..10u64 {
        let coordinator = Arc::clone(&coordinator);
        let room_id = room.id.clone();
        tasks.push(tokio::spawn(async move {
            coordinator.join(user, &room_id).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let after = coordinator.fetch(&room.id).await.unwrap();
    assert_eq!(after.member_ids.len(), 9);
    for user in 2..10u64 {
        assert!(after.is_member(user));
    }
}
