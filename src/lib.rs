//! roomd - room lifecycle and membership coordinator.
//!
//! A websocket-fronted coordinator for ephemeral multi-member rooms.
//! All room state lives in a shared key-value store, so any number of
//! stateless roomd instances can serve the same rooms concurrently.

pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod network;
pub mod rooms;
pub mod session;
pub mod store;
