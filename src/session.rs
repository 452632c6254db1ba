//! Live socket sessions and notification delivery.
//!
//! Tracks every websocket connection on this instance, its identified
//! user, and the outbound channel to its writer task. The registry also
//! maintains the `sockets:user:{uid}` index in the shared store so
//! coordinators on any instance can see which users are online and
//! which socket ids to address.
//!
//! Delivery is instance-local: an event sent to a user or socket only
//! reaches connections held by this process. Peers learn of membership
//! changes on their own instances' fan-out paths.

use crate::rooms::{Room, repository::keys};
use crate::store::{Store, StoreResult};
use dashmap::DashMap;
use roomd_proto::{ServerEvent, SocketId, UserId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// One live connection: its identified user, if any, and the channel to
/// its writer task.
struct Session {
    user_id: Option<UserId>,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

/// Registry of this instance's live sessions.
pub struct SessionRegistry {
    store: Arc<dyn Store>,
    sockets: DashMap<SocketId, Session>,
    /// Local sockets per identified user.
    users: DashMap<UserId, Vec<SocketId>>,
}

impl SessionRegistry {
    /// Build an empty registry over a store handle.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            sockets: DashMap::new(),
            users: DashMap::new(),
        }
    }

    /// Track a freshly accepted, not yet identified connection.
    pub fn register(&self, socket_id: SocketId, tx: mpsc::UnboundedSender<ServerEvent>) {
        self.sockets.insert(socket_id, Session { user_id: None, tx });
    }

    /// Bind a socket to its user and publish it in the shared online
    /// index.
    pub async fn identify(&self, socket_id: &SocketId, user_id: UserId) -> StoreResult<()> {
        match self.sockets.get_mut(socket_id) {
            Some(mut session) => session.user_id = Some(user_id),
            None => {
                // Connection already gone; nothing to index.
                debug!(socket_id = %socket_id, user_id, "Identify on departed socket");
                return Ok(());
            }
        }
        self.users
            .entry(user_id)
            .or_default()
            .push(socket_id.clone());
        self.store
            .list_push(&keys::user_sockets(user_id), socket_id)
            .await
    }

    /// Drop a departed socket and its shared index entry. Returns the
    /// user it was identified as, for membership cleanup.
    pub async fn disconnect(&self, socket_id: &SocketId) -> StoreResult<Option<UserId>> {
        let Some((_, session)) = self.sockets.remove(socket_id) else {
            return Ok(None);
        };
        let Some(user_id) = session.user_id else {
            return Ok(None);
        };

        if let Some(mut sockets) = self.users.get_mut(&user_id) {
            sockets.retain(|s| s != socket_id);
        }
        self.users.remove_if(&user_id, |_, sockets| sockets.is_empty());

        self.store
            .list_remove(&keys::user_sockets(user_id), socket_id)
            .await?;
        Ok(Some(user_id))
    }

    /// The identified user of a socket.
    pub fn user_of(&self, socket_id: &SocketId) -> Option<UserId> {
        self.sockets.get(socket_id).and_then(|s| s.user_id)
    }

    /// Whether the user still has any other live socket on this
    /// instance.
    pub fn has_local_sockets(&self, user_id: UserId) -> bool {
        self.users
            .get(&user_id)
            .is_some_and(|sockets| !sockets.is_empty())
    }

    /// Number of live connections on this instance.
    pub fn connected_count(&self) -> usize {
        self.sockets.len()
    }

    /// The user's live socket ids across all instances, per the shared
    /// index.
    pub async fn online_sockets(&self, user_id: UserId) -> StoreResult<Vec<SocketId>> {
        self.store.list_range(&keys::user_sockets(user_id)).await
    }

    /// Deliver an event to one socket. Returns whether the socket was
    /// still present; the writer side handles closed channels.
    pub fn send_to_socket(&self, socket_id: &SocketId, event: ServerEvent) -> bool {
        let Some(session) = self.sockets.get(socket_id) else {
            return false;
        };
        if session.tx.send(event).is_err() {
            warn!(socket_id = %socket_id, "Dropping event for closing socket");
            return false;
        }
        true
    }

    /// Deliver an event to every local socket of a user. Returns the
    /// number of sockets reached.
    pub fn send_to_user(&self, user_id: UserId, event: &ServerEvent) -> usize {
        let Some(sockets) = self.users.get(&user_id) else {
            return 0;
        };
        sockets
            .iter()
            .filter(|socket_id| self.send_to_socket(socket_id, event.clone()))
            .count()
    }

    /// Deliver an event to every local socket of every room member.
    /// Returns the number of sockets reached.
    pub fn send_to_room(&self, room: &Room, event: &ServerEvent) -> usize {
        room.member_ids
            .iter()
            .map(|&member| self.send_to_user(member, event))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use roomd_proto::RoomChangeKind;

    fn registry() -> (Arc<SessionRegistry>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(SessionRegistry::new(store.clone() as Arc<dyn Store>));
        (registry, store)
    }

    async fn connect(
        registry: &SessionRegistry,
        socket_id: &str,
        user_id: UserId,
    ) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register(socket_id.to_string(), tx);
        registry
            .identify(&socket_id.to_string(), user_id)
            .await
            .unwrap();
        rx
    }

    #[tokio::test]
    async fn test_identify_publishes_socket_index() {
        let (registry, store) = registry();
        let _rx = connect(&registry, "s1", 7).await;

        assert_eq!(registry.user_of(&"s1".to_string()), Some(7));
        assert_eq!(
            store.list_range(&keys::user_sockets(7)).await.unwrap(),
            vec!["s1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_disconnect_clears_index_and_returns_user() {
        let (registry, store) = registry();
        let _rx = connect(&registry, "s1", 7).await;

        let user = registry.disconnect(&"s1".to_string()).await.unwrap();
        assert_eq!(user, Some(7));
        assert!(store.list_range(&keys::user_sockets(7)).await.unwrap().is_empty());
        assert!(!registry.has_local_sockets(7));
    }

    #[tokio::test]
    async fn test_disconnect_of_unidentified_socket_is_none() {
        let (registry, _) = registry();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.register("s1".to_string(), tx);

        assert_eq!(registry.disconnect(&"s1".to_string()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_send_to_user_reaches_every_local_socket() {
        let (registry, _) = registry();
        let mut rx1 = connect(&registry, "s1", 7).await;
        let mut rx2 = connect(&registry, "s2", 7).await;

        registry.send_to_user(7, &ServerEvent::Identified { user_id: 7 });
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_send_to_room_counts_member_sockets_only() {
        let (registry, _) = registry();
        let mut rx1 = connect(&registry, "s1", 1).await;
        let mut rx2 = connect(&registry, "s2", 2).await;
        let mut rx3 = connect(&registry, "s3", 3).await;

        let mut room = Room::create(1, true);
        room.admit(2);

        let event = ServerEvent::RoomChanges {
            change: RoomChangeKind::Join,
            actor_id: 2,
            room: room.view(),
        };
        assert_eq!(registry.send_to_room(&room, &event), 2);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
        assert!(rx3.try_recv().is_err());
    }
}
