//! Network layer: websocket gateway and per-connection tasks.

mod connection;
mod gateway;

pub use connection::Connection;
pub use gateway::Gateway;

use crate::rooms::RoomCoordinator;
use crate::session::SessionRegistry;

/// Shared handles every connection task needs.
pub struct ServerContext {
    pub coordinator: RoomCoordinator,
    pub sessions: SessionRegistry,
}
