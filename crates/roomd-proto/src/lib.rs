//! # roomd-proto
//!
//! Wire event types shared by the roomd server and its clients.
//!
//! Every frame exchanged over a roomd WebSocket connection is a single
//! JSON object tagged by an `event` field. Client-to-server frames decode
//! into [`ClientEvent`]; server-to-client frames encode from
//! [`ServerEvent`]. The crate does no I/O: transports frame the JSON
//! however they like (roomd itself uses WebSocket text frames).
//!
//! ```rust
//! use roomd_proto::{ClientEvent, ServerEvent};
//!
//! let frame = r#"{"event":"join_room","room_id":"1700000000000-4f2a"}"#;
//! let event = ClientEvent::decode(frame).expect("valid frame");
//! assert_eq!(event.name(), "join_room");
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

mod event;

pub use event::{
    ClientEvent, ProtoError, RoomChangeKind, RoomView, ServerEvent, SocketId, UserId,
};
