//! Event definitions and JSON framing.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// User identifier. Assigned by whatever authentication layer fronts roomd.
pub type UserId = u64;

/// Socket identifier. Unique per live connection, process-independent.
pub type SocketId = String;

/// Errors produced while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// The frame was not valid JSON or did not match any known event.
    #[error("invalid frame: {0}")]
    Json(#[from] serde_json::Error),
}

/// Actions a client may request.
///
/// The `event` tag matches the event names the original socket.io surface
/// exposed, so existing clients can migrate frame-for-frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    /// First frame on every connection: binds the socket to a user.
    Identify {
        /// Acting user for all subsequent frames on this socket.
        user_id: UserId,
    },
    /// Create a room with the sender as sole member and owner.
    CreateRoom {
        /// Public rooms admit any joiner; private rooms require invitation.
        #[serde(default)]
        is_public: bool,
    },
    /// Join a public room.
    JoinRoom {
        /// Target room.
        room_id: String,
    },
    /// Leave a room the sender belongs to.
    LeaveRoom {
        /// Target room.
        room_id: String,
    },
    /// Remove a member from a room. Kicking yourself degrades to a leave.
    KickOutOfRoom {
        /// Target room.
        room_id: String,
        /// Member to remove.
        member_id: UserId,
    },
    /// Hand room ownership to another member.
    TransferOwnership {
        /// Target room.
        room_id: String,
        /// Member to promote.
        candidate_id: UserId,
    },
    /// Invite an online user into a room the sender belongs to.
    InviteToRoom {
        /// Target room.
        room_id: String,
        /// User to invite.
        guest_id: UserId,
    },
    /// Accept or decline a pending invitation.
    RespondInvitation {
        /// Room the sender was invited to.
        room_id: String,
        /// `true` accepts, `false` declines.
        accept: bool,
    },
    /// Relay a message to the current members of a room.
    SendGroupMessage {
        /// Target room.
        room_id: String,
        /// Message body. Not persisted.
        content: String,
    },
}

impl ClientEvent {
    /// Decode a single JSON frame.
    pub fn decode(frame: &str) -> Result<Self, ProtoError> {
        Ok(serde_json::from_str(frame)?)
    }

    /// Encode to a JSON frame.
    pub fn encode(&self) -> Result<String, ProtoError> {
        Ok(serde_json::to_string(self)?)
    }

    /// The `event` tag, used in error replies and metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Identify { .. } => "identify",
            Self::CreateRoom { .. } => "create_room",
            Self::JoinRoom { .. } => "join_room",
            Self::LeaveRoom { .. } => "leave_room",
            Self::KickOutOfRoom { .. } => "kick_out_of_room",
            Self::TransferOwnership { .. } => "transfer_ownership",
            Self::InviteToRoom { .. } => "invite_to_room",
            Self::RespondInvitation { .. } => "respond_invitation",
            Self::SendGroupMessage { .. } => "send_group_message",
        }
    }
}

/// What a `room_changes` broadcast describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomChangeKind {
    /// Room was created.
    Create,
    /// A member entered (`join_room` or an accepted invitation).
    Join,
    /// A member left on their own.
    Leave,
    /// A member was removed by the owner.
    Kick,
    /// Ownership moved to another member.
    Owner,
    /// A guest was added to the waiting list.
    Invite,
}

/// Snapshot of a room as sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomView {
    /// Opaque room identifier.
    pub id: String,
    /// Whether the room admits uninvited joiners.
    pub is_public: bool,
    /// Current owner. Always one of `member_ids`.
    pub owner_id: UserId,
    /// Current members, in insertion order.
    pub member_ids: Vec<UserId>,
    /// Invited users who have not responded yet.
    pub waiting_ids: Vec<UserId>,
    /// Users who left, were kicked, or declined an invitation.
    pub refused_ids: Vec<UserId>,
}

/// Frames the server pushes to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Acknowledges a successful `identify`.
    Identified {
        /// The bound user.
        user_id: UserId,
    },
    /// A room the recipient belongs to (or was removed from) changed.
    RoomChanges {
        /// What happened.
        change: RoomChangeKind,
        /// Who caused it.
        actor_id: UserId,
        /// The room after the change.
        room: RoomView,
    },
    /// The recipient was invited to a room.
    RoomInvitation {
        /// Room the recipient may now accept or decline.
        room_id: String,
        /// Member who sent the invitation.
        inviter_id: UserId,
    },
    /// A relayed group message.
    GroupMessage {
        /// Originating room.
        room_id: String,
        /// Member who sent it.
        sender_id: UserId,
        /// Message body.
        content: String,
    },
    /// A request was rejected. The connection stays open.
    Error {
        /// The `event` tag of the offending frame, if it decoded.
        /// Serialized as `cause`: the enum's own tag already claims
        /// `event` on the wire.
        #[serde(rename = "cause")]
        event: Option<String>,
        /// Stable machine-readable code naming the violated rule.
        code: String,
        /// Human-readable explanation.
        message: String,
    },
}

impl ServerEvent {
    /// Decode a single JSON frame.
    pub fn decode(frame: &str) -> Result<Self, ProtoError> {
        Ok(serde_json::from_str(frame)?)
    }

    /// Encode to a JSON frame.
    pub fn encode(&self) -> Result<String, ProtoError> {
        Ok(serde_json::to_string(self)?)
    }
}
