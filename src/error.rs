//! Unified error handling for roomd.
//!
//! This module provides the error taxonomy for room coordination, with
//! client rejection generation and metric labeling.

use crate::store::StoreError;
use roomd_proto::ServerEvent;
use thiserror::Error;

/// Errors that can occur during a room coordination operation.
///
/// Every variant except [`RoomError::Store`] is a domain-rule violation:
/// detected synchronously before any write is issued, reported once, never
/// retried. `Store` failures are the only retry-eligible class and mean the
/// final state of the operation is unknown.
#[derive(Debug, Error)]
pub enum RoomError {
    #[error("Room does not exist!")]
    NotFound,

    #[error("Please leave your current room first!")]
    PolicyViolation,

    #[error("This room is private!")]
    PrivateRoom,

    #[error("You are not in this room!")]
    NotMember,

    #[error("You are not the owner of this room!")]
    NotOwner,

    #[error("The new owner must be another member of this room!")]
    InvalidCandidate,

    #[error("Please only invite online users!")]
    GuestOffline,

    #[error("This user is already a member or has been invited!")]
    AlreadyInvitedOrMember,

    #[error("You are not invited to this room!")]
    NotInvited,

    #[error("Please identify first!")]
    NotIdentified,

    #[error("This connection is already identified!")]
    AlreadyIdentified,

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl RoomError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::PolicyViolation => "policy_violation",
            Self::PrivateRoom => "private_room",
            Self::NotMember => "not_member",
            Self::NotOwner => "not_owner",
            Self::InvalidCandidate => "invalid_candidate",
            Self::GuestOffline => "guest_offline",
            Self::AlreadyInvitedOrMember => "already_invited_or_member",
            Self::NotInvited => "not_invited",
            Self::NotIdentified => "not_identified",
            Self::AlreadyIdentified => "already_identified",
            Self::Store(_) => "store_unavailable",
        }
    }

    /// Convert to a client-visible rejection frame.
    ///
    /// Domain errors carry their human-readable rule text. Store failures
    /// surface as a generic retryable message; the detail stays in the logs.
    pub fn to_reject(&self, event: Option<&str>) -> ServerEvent {
        let message = match self {
            Self::Store(_) => "Service temporarily unavailable, please retry.".to_string(),
            other => other.to_string(),
        };

        ServerEvent::Error {
            event: event.map(str::to_string),
            code: self.error_code().to_string(),
            message,
        }
    }
}

/// Result type for coordinator operations.
pub type RoomResult<T> = Result<T, RoomError>;
