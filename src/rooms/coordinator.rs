//! Room lifecycle and membership coordination.
//!
//! All durable state lives in the shared store, so any number of
//! coordinator instances across any number of processes can serve the
//! same rooms. Each mutation follows the same shape: take the room's
//! lease, read the record, compute the next record in memory, commit the
//! record and its reverse-index updates as one atomic bundle, release
//! the lease.
//!
//! Entering a room (booking, joining, accepting an invitation) also
//! takes a per-user entry guard before any room lease. Room leases alone
//! cannot enforce the single-active-room policy: two entries by the same
//! user into different rooms hold different leases, and both would pass
//! a policy check read outside them.
//!
//! The coordinator never talks to the transport. Every mutation returns
//! the updated room plus whatever the caller needs for notification
//! fan-out (socket ids of a kicked member or invited guest, rooms
//! vacated by an exclusivity switch).

use super::repository::RoomRepository;
use super::room::Room;
use crate::error::{RoomError, RoomResult};
use crate::store::{Batch, Lease, Store};
use roomd_proto::{SocketId, UserId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Result of a kick: the room after removal plus the sockets the caller
/// must force out of the room's broadcast group.
#[derive(Debug)]
pub struct KickOutcome {
    pub room: Room,
    pub kicked_socket_ids: Vec<SocketId>,
}

/// Result of an invitation: the room plus the guest's sockets to notify.
#[derive(Debug)]
pub struct InviteOutcome {
    pub room: Room,
    pub guest_socket_ids: Vec<SocketId>,
}

/// Result of an invitation response. `left_rooms` holds the rooms the
/// guest vacated as a side effect of the single-active-room policy.
#[derive(Debug)]
pub struct RespondOutcome {
    pub room: Room,
    pub left_rooms: Vec<Room>,
}

/// The room coordinator. Stateless: safe to share across any number of
/// concurrent connection tasks.
pub struct RoomCoordinator {
    store: Arc<dyn Store>,
    repo: RoomRepository,
    allow_multiple_rooms: bool,
    lease_ttl: Duration,
}

impl RoomCoordinator {
    /// Build a coordinator over a store handle.
    pub fn new(store: Arc<dyn Store>, allow_multiple_rooms: bool, lease_ttl: Duration) -> Self {
        Self {
            repo: RoomRepository::new(Arc::clone(&store)),
            store,
            allow_multiple_rooms,
            lease_ttl,
        }
    }

    async fn lease(&self, room_id: &str) -> RoomResult<Lease> {
        Ok(Lease::room(Arc::clone(&self.store), room_id, self.lease_ttl).await?)
    }

    /// The entry guard: serializes one user's entries into rooms so the
    /// membership-policy check and the entry it permits act as one step.
    /// Always taken before any room lease.
    async fn entry_guard(&self, user: UserId) -> RoomResult<Lease> {
        Ok(Lease::user(Arc::clone(&self.store), user, self.lease_ttl).await?)
    }

    /// Reject when the single-active-room policy forbids entering another
    /// room. Callers hold the user's entry guard, so two concurrent
    /// entries into different rooms cannot both pass this check.
    async fn ensure_may_enter(&self, user: UserId) -> RoomResult<()> {
        if !self.allow_multiple_rooms && self.repo.is_member_of_any(user).await? {
            return Err(RoomError::PolicyViolation);
        }
        Ok(())
    }

    /// Whether the user currently belongs to any room.
    pub async fn is_member_of_any(&self, user: UserId) -> RoomResult<bool> {
        Ok(self.repo.is_member_of_any(user).await?)
    }

    /// Create a room with the booker as sole member and owner.
    pub async fn book(&self, booker: UserId, is_public: bool) -> RoomResult<Room> {
        let guard = self.entry_guard(booker).await?;
        let result = self.book_guarded(booker, is_public).await;
        guard.release().await;
        result
    }

    async fn book_guarded(&self, booker: UserId, is_public: bool) -> RoomResult<Room> {
        self.ensure_may_enter(booker).await?;

        let room = Room::create(booker, is_public);
        self.repo.create(&room).await?;

        info!(user_id = booker, room_id = %room.id, is_public, "Room booked");
        Ok(room)
    }

    /// Fetch a room by id.
    pub async fn fetch(&self, room_id: &str) -> RoomResult<Room> {
        self.repo.fetch(room_id).await
    }

    /// Fetch many rooms, silently dropping missing ids.
    pub async fn fetch_many(&self, room_ids: &[String]) -> RoomResult<Vec<Room>> {
        self.repo.fetch_many(room_ids).await
    }

    /// Add the joiner to a public room.
    pub async fn join(&self, joiner: UserId, room_id: &str) -> RoomResult<Room> {
        let guard = self.entry_guard(joiner).await?;
        let result = self.join_guarded(joiner, room_id).await;
        guard.release().await;
        result
    }

    async fn join_guarded(&self, joiner: UserId, room_id: &str) -> RoomResult<Room> {
        self.ensure_may_enter(joiner).await?;

        let lease = self.lease(room_id).await?;
        let result = self.join_locked(joiner, room_id).await;
        lease.release().await;
        result
    }

    async fn join_locked(&self, joiner: UserId, room_id: &str) -> RoomResult<Room> {
        let mut room = self.repo.fetch(room_id).await?;

        if !room.is_public {
            return Err(RoomError::PrivateRoom);
        }
        if room.is_member(joiner) {
            return Err(RoomError::AlreadyInvitedOrMember);
        }

        room.admit(joiner);

        let mut batch = Batch::new();
        self.repo.write_room(&room, &mut batch)?;
        self.repo.index_add(joiner, &room.id, &mut batch);
        self.repo.apply(batch).await?;

        info!(user_id = joiner, room_id = %room.id, "User joined room");
        Ok(room)
    }

    /// Remove the leaver from a room they belong to. Deletes the room
    /// when it empties; otherwise reassigns ownership to the first
    /// remaining member if the owner left.
    pub async fn leave(&self, leaver: UserId, room_id: &str) -> RoomResult<Room> {
        let lease = self.lease(room_id).await?;
        let result = self.leave_locked(leaver, room_id).await;
        lease.release().await;
        result
    }

    async fn leave_locked(&self, leaver: UserId, room_id: &str) -> RoomResult<Room> {
        let mut room = self.repo.fetch(room_id).await?;
        let mut batch = Batch::new();
        self.apply_leave(&mut room, leaver, &mut batch)?;
        self.repo.apply(batch).await?;

        info!(user_id = leaver, room_id = %room.id, remaining = room.member_ids.len(), "User left room");
        Ok(room)
    }

    /// Leave semantics for one room, queued onto an existing bundle.
    fn apply_leave(&self, room: &mut Room, leaver: UserId, batch: &mut Batch) -> RoomResult<()> {
        if !room.remove_member(leaver) {
            return Err(RoomError::NotMember);
        }
        room.refuse(leaver);

        if room.member_ids.is_empty() {
            // Last member out deletes the room.
            self.repo.delete_room(room, batch);
        } else {
            if room.owner_id == leaver {
                room.owner_id = room.member_ids[0];
            }
            self.repo.write_room(room, batch)?;
        }
        self.repo.index_remove(leaver, &room.id, batch);
        Ok(())
    }

    /// Remove the leaver from many rooms in one batched write. With no
    /// explicit ids, the rooms are resolved from the reverse index.
    /// Returns the rooms actually vacated; never fails on a no-op.
    pub async fn leave_all(
        &self,
        leaver: UserId,
        room_ids: Option<Vec<String>>,
    ) -> RoomResult<Vec<Room>> {
        let mut ids = match room_ids {
            Some(ids) => ids,
            None => self.repo.member_room_ids(leaver).await?,
        };
        ids.sort();
        ids.dedup();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        // Leases are taken in sorted id order so two concurrent multi-room
        // operations cannot deadlock.
        let mut leases = Vec::with_capacity(ids.len());
        for id in &ids {
            match self.lease(id).await {
                Ok(lease) => leases.push(lease),
                Err(e) => {
                    for lease in leases {
                        lease.release().await;
                    }
                    return Err(e);
                }
            }
        }

        let result = self.leave_all_locked(leaver, &ids).await;
        for lease in leases {
            lease.release().await;
        }
        result
    }

    async fn leave_all_locked(&self, leaver: UserId, ids: &[String]) -> RoomResult<Vec<Room>> {
        let mut rooms = self.repo.fetch_many(ids).await?;
        let mut batch = Batch::new();
        let mut left = Vec::with_capacity(rooms.len());

        for room in rooms.iter_mut() {
            match self.apply_leave(room, leaver, &mut batch) {
                Ok(()) => left.push(room.clone()),
                // A dangling reverse-index entry: the index said member,
                // the record disagrees. Drop the entry and move on.
                Err(RoomError::NotMember) => {
                    warn!(user_id = leaver, room_id = %room.id, "Dropping dangling room index entry");
                    self.repo.index_remove(leaver, &room.id, &mut batch);
                }
                Err(e) => return Err(e),
            }
        }

        self.repo.apply(batch).await?;
        info!(user_id = leaver, rooms = left.len(), "User left rooms");
        Ok(left)
    }

    /// Remove a member from a room. Kicking yourself degrades to a
    /// leave; otherwise the kicker must own the room.
    pub async fn kick(
        &self,
        kicker: UserId,
        member: UserId,
        room_id: &str,
    ) -> RoomResult<KickOutcome> {
        if kicker == member {
            let room = self.leave(kicker, room_id).await?;
            let kicked_socket_ids = self.repo.socket_ids(kicker).await?;
            return Ok(KickOutcome {
                room,
                kicked_socket_ids,
            });
        }

        let lease = self.lease(room_id).await?;
        let result = self.kick_locked(kicker, member, room_id).await;
        lease.release().await;
        result
    }

    async fn kick_locked(
        &self,
        kicker: UserId,
        member: UserId,
        room_id: &str,
    ) -> RoomResult<KickOutcome> {
        let mut room = self.repo.fetch(room_id).await?;

        if room.owner_id != kicker {
            return Err(RoomError::NotOwner);
        }
        if !room.remove_member(member) {
            return Err(RoomError::NotMember);
        }
        room.refuse(member);

        let mut batch = Batch::new();
        self.repo.write_room(&room, &mut batch)?;
        self.repo.index_remove(member, &room.id, &mut batch);
        self.repo.apply(batch).await?;

        let kicked_socket_ids = self.repo.socket_ids(member).await?;
        info!(user_id = kicker, target_id = member, room_id = %room.id, "Member kicked");
        Ok(KickOutcome {
            room,
            kicked_socket_ids,
        })
    }

    /// Hand ownership to another member.
    pub async fn transfer_ownership(
        &self,
        owner: UserId,
        candidate: UserId,
        room_id: &str,
    ) -> RoomResult<Room> {
        let lease = self.lease(room_id).await?;
        let result = self.transfer_locked(owner, candidate, room_id).await;
        lease.release().await;
        result
    }

    async fn transfer_locked(
        &self,
        owner: UserId,
        candidate: UserId,
        room_id: &str,
    ) -> RoomResult<Room> {
        let mut room = self.repo.fetch(room_id).await?;

        if room.owner_id != owner {
            return Err(RoomError::NotOwner);
        }
        if candidate == owner || !room.is_member(candidate) {
            return Err(RoomError::InvalidCandidate);
        }

        room.owner_id = candidate;

        let mut batch = Batch::new();
        self.repo.write_room(&room, &mut batch)?;
        self.repo.apply(batch).await?;

        info!(user_id = owner, new_owner_id = candidate, room_id = %room.id, "Ownership transferred");
        Ok(room)
    }

    /// Invite an online guest into a room the inviter belongs to.
    pub async fn invite(
        &self,
        inviter: UserId,
        guest: UserId,
        room_id: &str,
    ) -> RoomResult<InviteOutcome> {
        let lease = self.lease(room_id).await?;
        let result = self.invite_locked(inviter, guest, room_id).await;
        lease.release().await;
        result
    }

    async fn invite_locked(
        &self,
        inviter: UserId,
        guest: UserId,
        room_id: &str,
    ) -> RoomResult<InviteOutcome> {
        let mut room = self.repo.fetch(room_id).await?;

        let guest_socket_ids = self.repo.socket_ids(guest).await?;
        if guest_socket_ids.is_empty() {
            return Err(RoomError::GuestOffline);
        }
        if !room.is_member(inviter) {
            return Err(RoomError::NotMember);
        }
        if room.is_member(guest) || room.is_waiting(guest) {
            return Err(RoomError::AlreadyInvitedOrMember);
        }

        room.waiting_ids.push(guest);
        // A fresh invite reopens a previously refused user.
        room.refused_ids.retain(|&u| u != guest);

        let mut batch = Batch::new();
        self.repo.write_room(&room, &mut batch)?;
        self.repo.apply(batch).await?;

        info!(user_id = inviter, guest_id = guest, room_id = %room.id, "Guest invited");
        Ok(InviteOutcome {
            room,
            guest_socket_ids,
        })
    }

    /// Accept or decline a pending invitation. Accepting under the
    /// single-active-room policy first vacates the guest's other rooms;
    /// those rooms are part of the returned outcome.
    pub async fn respond_invitation(
        &self,
        guest: UserId,
        accept: bool,
        room_id: &str,
    ) -> RoomResult<RespondOutcome> {
        // Accepting is an entry, so it takes the guest's entry guard
        // before the room lease. Declining touches no membership.
        if !accept {
            return self.respond_entry(guest, false, room_id).await;
        }
        let guard = self.entry_guard(guest).await?;
        let result = self.respond_entry(guest, true, room_id).await;
        guard.release().await;
        result
    }

    async fn respond_entry(
        &self,
        guest: UserId,
        accept: bool,
        room_id: &str,
    ) -> RoomResult<RespondOutcome> {
        let lease = self.lease(room_id).await?;
        let result = self.respond_locked(guest, accept, room_id).await;
        lease.release().await;
        result
    }

    async fn respond_locked(
        &self,
        guest: UserId,
        accept: bool,
        room_id: &str,
    ) -> RoomResult<RespondOutcome> {
        let mut room = self.repo.fetch(room_id).await?;

        if !room.remove_waiting(guest) {
            return Err(RoomError::NotInvited);
        }

        let mut left_rooms = Vec::new();
        if accept {
            if !self.allow_multiple_rooms {
                // A waiting guest is never a member here (members and
                // waiting are disjoint), so these leases cannot collide
                // with the one we already hold.
                let mut others = self.repo.member_room_ids(guest).await?;
                others.retain(|id| id != room_id);
                if !others.is_empty() {
                    left_rooms = self.leave_all(guest, Some(others)).await?;
                }
            }

            room.admit(guest);

            let mut batch = Batch::new();
            self.repo.write_room(&room, &mut batch)?;
            self.repo.index_add(guest, &room.id, &mut batch);
            self.repo.apply(batch).await?;

            info!(user_id = guest, room_id = %room.id, left = left_rooms.len(), "Invitation accepted");
        } else {
            room.refuse(guest);

            let mut batch = Batch::new();
            self.repo.write_room(&room, &mut batch)?;
            self.repo.apply(batch).await?;

            info!(user_id = guest, room_id = %room.id, "Invitation declined");
        }

        Ok(RespondOutcome { room, left_rooms })
    }
}
