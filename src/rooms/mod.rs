//! Room domain: records, persistence, and the coordinator.

mod coordinator;
pub(crate) mod repository;
mod room;

pub use coordinator::{InviteOutcome, KickOutcome, RespondOutcome, RoomCoordinator};
pub use repository::RoomRepository;
pub use room::Room;
