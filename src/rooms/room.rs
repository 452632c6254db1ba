//! The room record and identifier generation.

use chrono::Utc;
use roomd_proto::{RoomView, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A room: the unit of group membership, ownership, and invitation state.
///
/// Persisted as one JSON-encoded record per room. Invariants maintained by
/// the coordinator:
///
/// - the owner is always a member while the room exists
/// - `member_ids` and `waiting_ids` are disjoint
/// - a room with no members is deleted, never stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    /// Opaque identifier, immutable after creation.
    pub id: String,
    /// Public rooms admit any joiner; private rooms require invitation.
    pub is_public: bool,
    /// Current owner.
    pub owner_id: UserId,
    /// Members in insertion order, duplicate-free.
    pub member_ids: Vec<UserId>,
    /// Invited users who have not responded, disjoint from members.
    pub waiting_ids: Vec<UserId>,
    /// Users who left, were kicked, or declined. Historical; a refused
    /// user can be re-invited.
    pub refused_ids: Vec<UserId>,
}

fn remove_first(list: &mut Vec<UserId>, user: UserId) -> bool {
    match list.iter().position(|&u| u == user) {
        Some(pos) => {
            list.remove(pos);
            true
        }
        None => false,
    }
}

impl Room {
    /// Create a room with the booker as sole member and owner.
    pub fn create(owner_id: UserId, is_public: bool) -> Self {
        Self {
            id: generate_room_id(),
            is_public,
            owner_id,
            member_ids: vec![owner_id],
            waiting_ids: Vec::new(),
            refused_ids: Vec::new(),
        }
    }

    /// Whether the user is currently a member.
    pub fn is_member(&self, user: UserId) -> bool {
        self.member_ids.contains(&user)
    }

    /// Whether the user is invited and has not responded.
    pub fn is_waiting(&self, user: UserId) -> bool {
        self.waiting_ids.contains(&user)
    }

    /// Remove the user from the member list. Returns `false` if absent.
    pub fn remove_member(&mut self, user: UserId) -> bool {
        remove_first(&mut self.member_ids, user)
    }

    /// Remove the user from the waiting list. Returns `false` if absent.
    pub fn remove_waiting(&mut self, user: UserId) -> bool {
        remove_first(&mut self.waiting_ids, user)
    }

    /// Move the user into membership, clearing any waiting or stale
    /// refused entry so a member never also appears refused.
    pub fn admit(&mut self, user: UserId) {
        remove_first(&mut self.waiting_ids, user);
        remove_first(&mut self.refused_ids, user);
        if !self.is_member(user) {
            self.member_ids.push(user);
        }
    }

    /// Record the user as refused (left, kicked, or declined).
    pub fn refuse(&mut self, user: UserId) {
        if !self.refused_ids.contains(&user) {
            self.refused_ids.push(user);
        }
    }

    /// Snapshot for the wire.
    pub fn view(&self) -> RoomView {
        RoomView {
            id: self.id.clone(),
            is_public: self.is_public,
            owner_id: self.owner_id,
            member_ids: self.member_ids.clone(),
            waiting_ids: self.waiting_ids.clone(),
            refused_ids: self.refused_ids.clone(),
        }
    }
}

/// Generate a room id: millisecond timestamp plus a random suffix.
///
/// The timestamp keeps ids roughly sortable by creation time; the suffix
/// keeps them unique when many rooms are booked in the same millisecond
/// across processes.
pub fn generate_room_id() -> String {
    let ms = Utc::now().timestamp_millis();
    let uuid = Uuid::new_v4().simple().to_string();
    format!("{ms}-{}", &uuid[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_sets_booker_as_sole_owner_member() {
        let room = Room::create(7, true);
        assert_eq!(room.member_ids, vec![7]);
        assert_eq!(room.owner_id, 7);
        assert!(room.waiting_ids.is_empty());
        assert!(room.refused_ids.is_empty());
        assert!(room.is_public);
    }

    #[test]
    fn test_admit_clears_waiting_and_refused() {
        let mut room = Room::create(1, false);
        room.waiting_ids.push(2);
        room.refused_ids.push(2);

        room.admit(2);
        assert_eq!(room.member_ids, vec![1, 2]);
        assert!(room.waiting_ids.is_empty());
        assert!(room.refused_ids.is_empty());
    }

    #[test]
    fn test_admit_is_idempotent_for_members() {
        let mut room = Room::create(1, true);
        room.admit(1);
        assert_eq!(room.member_ids, vec![1]);
    }

    #[test]
    fn test_refuse_does_not_duplicate() {
        let mut room = Room::create(1, true);
        room.refuse(9);
        room.refuse(9);
        assert_eq!(room.refused_ids, vec![9]);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = generate_room_id();
        let b = generate_room_id();
        assert_ne!(a, b);
    }
}
