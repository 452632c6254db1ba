//! Per-connection task: frame decoding, dispatch, notification fan-out.
//!
//! Each websocket connection runs one `Connection`. A writer task drains
//! the session's outbound channel into the socket; the reader loop
//! decodes frames, routes them through the coordinator, and fans the
//! resulting notifications out to the local sockets concerned. A
//! rejected frame produces one `error` event and leaves the connection
//! open.

use crate::error::{RoomError, RoomResult};
use crate::metrics;
use crate::network::ServerContext;
use crate::rooms::Room;
use futures_util::{SinkExt, StreamExt};
use roomd_proto::{ClientEvent, RoomChangeKind, ServerEvent, SocketId, UserId};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// One live client connection.
pub struct Connection {
    socket_id: SocketId,
    addr: SocketAddr,
    ctx: Arc<ServerContext>,
}

impl Connection {
    pub fn new(socket_id: SocketId, addr: SocketAddr, ctx: Arc<ServerContext>) -> Self {
        Self {
            socket_id,
            addr,
            ctx,
        }
    }

    /// Drive the connection until the peer hangs up.
    pub async fn run(self, ws_stream: WebSocketStream<TcpStream>) -> anyhow::Result<()> {
        let (mut sink, mut stream) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
        self.ctx.sessions.register(self.socket_id.clone(), tx);
        metrics::set_connected_sockets(self.ctx.sessions.connected_count());

        let writer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event.encode() {
                    Ok(frame) => {
                        if sink.send(Message::Text(frame)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to encode outbound frame"),
                }
            }
            let _ = sink.close().await;
        });

        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Text(frame)) => self.handle_frame(&frame).await,
                Ok(Message::Close(_)) => break,
                // Ping/pong are answered by tungstenite itself.
                Ok(_) => {}
                Err(e) => {
                    debug!(socket_id = %self.socket_id, addr = %self.addr, error = %e, "Read error");
                    break;
                }
            }
        }

        self.cleanup().await;
        writer.abort();
        metrics::set_connected_sockets(self.ctx.sessions.connected_count());
        Ok(())
    }

    /// Decode and dispatch one inbound frame. Rejections become `error`
    /// events; they never close the connection.
    async fn handle_frame(&self, frame: &str) {
        let event = match ClientEvent::decode(frame) {
            Ok(event) => event,
            Err(e) => {
                debug!(socket_id = %self.socket_id, error = %e, "Undecodable frame");
                metrics::record_event_error("unknown", "invalid_frame");
                self.ctx.sessions.send_to_socket(
                    &self.socket_id,
                    ServerEvent::Error {
                        event: None,
                        code: "invalid_frame".to_string(),
                        message: "Unrecognized event!".to_string(),
                    },
                );
                return;
            }
        };

        let name = event.name();
        let started = Instant::now();
        match self.dispatch(event).await {
            Ok(()) => metrics::record_event(name, started.elapsed().as_secs_f64()),
            Err(e) => {
                debug!(socket_id = %self.socket_id, event = name, code = e.error_code(), "Event rejected");
                metrics::record_event_error(name, e.error_code());
                self.ctx
                    .sessions
                    .send_to_socket(&self.socket_id, e.to_reject(Some(name)));
            }
        }
    }

    async fn dispatch(&self, event: ClientEvent) -> RoomResult<()> {
        if let ClientEvent::Identify { user_id } = event {
            return self.identify(user_id).await;
        }

        let Some(user_id) = self.ctx.sessions.user_of(&self.socket_id) else {
            return Err(RoomError::NotIdentified);
        };

        match event {
            ClientEvent::Identify { .. } => unreachable!("handled above"),
            ClientEvent::CreateRoom { is_public } => self.create_room(user_id, is_public).await,
            ClientEvent::JoinRoom { room_id } => self.join_room(user_id, &room_id).await,
            ClientEvent::LeaveRoom { room_id } => self.leave_room(user_id, &room_id).await,
            ClientEvent::KickOutOfRoom { room_id, member_id } => {
                self.kick(user_id, member_id, &room_id).await
            }
            ClientEvent::TransferOwnership {
                room_id,
                candidate_id,
            } => self.transfer_ownership(user_id, candidate_id, &room_id).await,
            ClientEvent::InviteToRoom { room_id, guest_id } => {
                self.invite(user_id, guest_id, &room_id).await
            }
            ClientEvent::RespondInvitation { room_id, accept } => {
                self.respond_invitation(user_id, accept, &room_id).await
            }
            ClientEvent::SendGroupMessage { room_id, content } => {
                self.send_group_message(user_id, &room_id, content).await
            }
        }
    }

    async fn identify(&self, user_id: UserId) -> RoomResult<()> {
        if self.ctx.sessions.user_of(&self.socket_id).is_some() {
            return Err(RoomError::AlreadyIdentified);
        }
        self.ctx.sessions.identify(&self.socket_id, user_id).await?;
        info!(socket_id = %self.socket_id, user_id, "Socket identified");
        self.ctx
            .sessions
            .send_to_socket(&self.socket_id, ServerEvent::Identified { user_id });
        Ok(())
    }

    fn broadcast_change(&self, change: RoomChangeKind, actor_id: UserId, room: &Room) {
        let event = ServerEvent::RoomChanges {
            change,
            actor_id,
            room: room.view(),
        };
        let reached = self.ctx.sessions.send_to_room(room, &event);
        metrics::record_fanout(reached);
    }

    async fn create_room(&self, user_id: UserId, is_public: bool) -> RoomResult<()> {
        let room = self.ctx.coordinator.book(user_id, is_public).await?;
        self.broadcast_change(RoomChangeKind::Create, user_id, &room);
        Ok(())
    }

    async fn join_room(&self, user_id: UserId, room_id: &str) -> RoomResult<()> {
        let room = self.ctx.coordinator.join(user_id, room_id).await?;
        self.broadcast_change(RoomChangeKind::Join, user_id, &room);
        Ok(())
    }

    async fn leave_room(&self, user_id: UserId, room_id: &str) -> RoomResult<()> {
        let room = self.ctx.coordinator.leave(user_id, room_id).await?;
        // The leaver is no longer a member, so they get their own copy.
        self.broadcast_change(RoomChangeKind::Leave, user_id, &room);
        let event = ServerEvent::RoomChanges {
            change: RoomChangeKind::Leave,
            actor_id: user_id,
            room: room.view(),
        };
        self.ctx.sessions.send_to_user(user_id, &event);
        Ok(())
    }

    async fn kick(&self, user_id: UserId, member_id: UserId, room_id: &str) -> RoomResult<()> {
        let outcome = self.ctx.coordinator.kick(user_id, member_id, room_id).await?;
        self.broadcast_change(RoomChangeKind::Kick, user_id, &outcome.room);

        let event = ServerEvent::RoomChanges {
            change: RoomChangeKind::Kick,
            actor_id: user_id,
            room: outcome.room.view(),
        };
        for socket_id in &outcome.kicked_socket_ids {
            // Only this instance's sockets are reachable; peers notify
            // their own.
            self.ctx.sessions.send_to_socket(socket_id, event.clone());
        }
        Ok(())
    }

    async fn transfer_ownership(
        &self,
        user_id: UserId,
        candidate_id: UserId,
        room_id: &str,
    ) -> RoomResult<()> {
        let room = self
            .ctx
            .coordinator
            .transfer_ownership(user_id, candidate_id, room_id)
            .await?;
        self.broadcast_change(RoomChangeKind::Owner, user_id, &room);
        Ok(())
    }

    async fn invite(&self, user_id: UserId, guest_id: UserId, room_id: &str) -> RoomResult<()> {
        let outcome = self.ctx.coordinator.invite(user_id, guest_id, room_id).await?;
        self.broadcast_change(RoomChangeKind::Invite, user_id, &outcome.room);

        let invitation = ServerEvent::RoomInvitation {
            room_id: outcome.room.id.clone(),
            inviter_id: user_id,
        };
        for socket_id in &outcome.guest_socket_ids {
            self.ctx.sessions.send_to_socket(socket_id, invitation.clone());
        }
        Ok(())
    }

    async fn respond_invitation(
        &self,
        user_id: UserId,
        accept: bool,
        room_id: &str,
    ) -> RoomResult<()> {
        let outcome = self
            .ctx
            .coordinator
            .respond_invitation(user_id, accept, room_id)
            .await?;

        for left in &outcome.left_rooms {
            self.broadcast_change(RoomChangeKind::Leave, user_id, left);
        }

        // Members see the updated waiting list either way; a declining
        // guest is not a member, so they get their own copy.
        self.broadcast_change(RoomChangeKind::Join, user_id, &outcome.room);
        if !accept {
            let event = ServerEvent::RoomChanges {
                change: RoomChangeKind::Join,
                actor_id: user_id,
                room: outcome.room.view(),
            };
            self.ctx.sessions.send_to_user(user_id, &event);
        }
        Ok(())
    }

    async fn send_group_message(
        &self,
        user_id: UserId,
        room_id: &str,
        content: String,
    ) -> RoomResult<()> {
        let room = self.ctx.coordinator.fetch(room_id).await?;
        if !room.is_member(user_id) {
            return Err(RoomError::NotMember);
        }

        let event = ServerEvent::GroupMessage {
            room_id: room.id.clone(),
            sender_id: user_id,
            content,
        };
        let reached = self.ctx.sessions.send_to_room(&room, &event);
        metrics::record_fanout(reached);
        Ok(())
    }

    /// Tear down the session and, when this was the user's last socket
    /// anywhere, vacate their rooms.
    async fn cleanup(&self) {
        let user_id = match self.ctx.sessions.disconnect(&self.socket_id).await {
            Ok(Some(user_id)) => user_id,
            Ok(None) => return,
            Err(e) => {
                warn!(socket_id = %self.socket_id, error = %e, "Failed to unregister socket");
                return;
            }
        };

        match self.ctx.sessions.online_sockets(user_id).await {
            Ok(sockets) if sockets.is_empty() => {
                match self.ctx.coordinator.leave_all(user_id, None).await {
                    Ok(left) => {
                        for room in &left {
                            self.broadcast_change(RoomChangeKind::Leave, user_id, room);
                        }
                    }
                    Err(e) => {
                        warn!(user_id, error = %e, "Failed to vacate rooms on disconnect");
                    }
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(user_id, error = %e, "Failed to read online sockets on disconnect");
            }
        }
    }
}
