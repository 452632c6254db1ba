//! Room persistence: key naming, record encoding, atomic write bundles.
//!
//! The repository is the only place that knows how rooms and their
//! reverse indexes are laid out in the store. Mutations are expressed as
//! [`Batch`] bundles so a record write and its index updates commit in
//! one all-or-nothing round trip.

use super::Room;
use crate::error::{RoomError, RoomResult};
use crate::store::{Batch, Store, StoreError, StoreResult};
use roomd_proto::{SocketId, UserId};
use std::sync::Arc;
use tracing::warn;

/// Store key layout.
///
/// - `room:{id}` — JSON room record
/// - `rooms:user:{uid}` — list of room ids the user belongs to
/// - `sockets:user:{uid}` — list of the user's live socket ids, written
///   by the session layer and only read here
pub(crate) mod keys {
    use roomd_proto::UserId;

    pub fn room(id: &str) -> String {
        format!("room:{id}")
    }

    pub fn user_rooms(user: UserId) -> String {
        format!("rooms:user:{user}")
    }

    pub fn user_sockets(user: UserId) -> String {
        format!("sockets:user:{user}")
    }
}

/// Serializes rooms to and from the shared store.
#[derive(Clone)]
pub struct RoomRepository {
    store: Arc<dyn Store>,
}

impl RoomRepository {
    /// Wrap a store handle.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    fn encode(room: &Room) -> StoreResult<String> {
        serde_json::to_string(room).map_err(|e| StoreError::UnexpectedValue {
            key: keys::room(&room.id),
            reason: e.to_string(),
        })
    }

    fn decode(id: &str, json: &str) -> StoreResult<Room> {
        serde_json::from_str(json).map_err(|e| StoreError::UnexpectedValue {
            key: keys::room(id),
            reason: e.to_string(),
        })
    }

    /// Fetch a room by id.
    pub async fn fetch(&self, id: &str) -> RoomResult<Room> {
        match self.store.get(&keys::room(id)).await? {
            Some(json) => Ok(Self::decode(id, &json)?),
            None => Err(RoomError::NotFound),
        }
    }

    /// Fetch many rooms, silently dropping ids with no record. Corrupt
    /// records are also dropped, with a warning; they are a recoverable
    /// inconsistency, not a reason to fail the whole read.
    pub async fn fetch_many(&self, ids: &[String]) -> RoomResult<Vec<Room>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let record_keys: Vec<String> = ids.iter().map(|id| keys::room(id)).collect();
        let values = self.store.get_many(&record_keys).await?;

        let mut rooms = Vec::with_capacity(ids.len());
        for (id, value) in ids.iter().zip(values) {
            let Some(json) = value else { continue };
            match Self::decode(id, &json) {
                Ok(room) => rooms.push(room),
                Err(e) => warn!(room_id = %id, error = %e, "Skipping corrupt room record"),
            }
        }
        Ok(rooms)
    }

    /// Room ids the user currently belongs to, per the reverse index.
    pub async fn member_room_ids(&self, user: UserId) -> StoreResult<Vec<String>> {
        self.store.list_range(&keys::user_rooms(user)).await
    }

    /// Whether the user belongs to any room, per the reverse index.
    pub async fn is_member_of_any(&self, user: UserId) -> StoreResult<bool> {
        Ok(self.store.list_len(&keys::user_rooms(user)).await? > 0)
    }

    /// The user's live socket ids, per the session layer's index.
    pub async fn socket_ids(&self, user: UserId) -> StoreResult<Vec<SocketId>> {
        self.store.list_range(&keys::user_sockets(user)).await
    }

    /// Queue a room record write.
    pub fn write_room(&self, room: &Room, batch: &mut Batch) -> StoreResult<()> {
        batch.set(keys::room(&room.id), Self::encode(room)?);
        Ok(())
    }

    /// Queue a room record deletion.
    pub fn delete_room(&self, room: &Room, batch: &mut Batch) {
        batch.delete(keys::room(&room.id));
    }

    /// Queue a reverse-index entry for `user → room`.
    pub fn index_add(&self, user: UserId, room_id: &str, batch: &mut Batch) {
        batch.list_push(keys::user_rooms(user), room_id);
    }

    /// Queue removal of the reverse-index entry for `user → room`.
    pub fn index_remove(&self, user: UserId, room_id: &str, batch: &mut Batch) {
        batch.list_remove(keys::user_rooms(user), room_id);
    }

    /// Execute a queued bundle.
    pub async fn apply(&self, batch: Batch) -> StoreResult<()> {
        self.store.apply(batch).await
    }

    /// Persist a freshly booked room and its owner's index entry.
    pub async fn create(&self, room: &Room) -> RoomResult<()> {
        let mut batch = Batch::new();
        self.write_room(room, &mut batch)?;
        self.index_add(room.owner_id, &room.id, &mut batch);
        Ok(self.apply(batch).await?)
    }
}
