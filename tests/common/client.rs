//! Test websocket client.
//!
//! Sends client events and asserts on received server events.

use futures_util::{SinkExt, StreamExt};
use roomd_proto::{ClientEvent, RoomView, ServerEvent, UserId};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// A test client over one websocket connection.
pub struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    /// Connect to a test server without identifying.
    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let (ws, _) = connect_async(format!("ws://{addr}")).await?;
        Ok(Self { ws })
    }

    /// Send one client event.
    pub async fn send(&mut self, event: &ClientEvent) -> anyhow::Result<()> {
        self.send_raw(&event.encode()?).await
    }

    /// Send a raw text frame.
    #[allow(dead_code)]
    pub async fn send_raw(&mut self, frame: &str) -> anyhow::Result<()> {
        self.ws.send(Message::Text(frame.to_string())).await?;
        Ok(())
    }

    /// Receive a single server event.
    pub async fn recv(&mut self) -> anyhow::Result<ServerEvent> {
        self.recv_timeout(Duration::from_secs(5)).await
    }

    /// Receive a server event with a timeout.
    pub async fn recv_timeout(&mut self, dur: Duration) -> anyhow::Result<ServerEvent> {
        loop {
            let msg = timeout(dur, self.ws.next())
                .await?
                .ok_or_else(|| anyhow::anyhow!("connection closed"))??;
            match msg {
                Message::Text(frame) => return Ok(ServerEvent::decode(&frame)?),
                // Skip control frames.
                _ => continue,
            }
        }
    }

    /// Receive events until the predicate matches, returning everything
    /// seen including the match.
    pub async fn recv_until<F>(&mut self, mut predicate: F) -> anyhow::Result<Vec<ServerEvent>>
    where
        F: FnMut(&ServerEvent) -> bool,
    {
        let mut events = Vec::new();
        loop {
            let event = self.recv().await?;
            let done = predicate(&event);
            events.push(event);
            if done {
                return Ok(events);
            }
        }
    }

    /// Assert that no event arrives within a short window.
    #[allow(dead_code)]
    pub async fn expect_silence(&mut self) -> anyhow::Result<()> {
        match self.recv_timeout(Duration::from_millis(200)).await {
            Ok(event) => anyhow::bail!("unexpected event: {event:?}"),
            Err(_) => Ok(()),
        }
    }

    /// Identify this connection and wait for the acknowledgement.
    pub async fn identify(&mut self, user_id: UserId) -> anyhow::Result<()> {
        self.send(&ClientEvent::Identify { user_id }).await?;
        let event = self.recv().await?;
        match event {
            ServerEvent::Identified { user_id: bound } if bound == user_id => Ok(()),
            other => anyhow::bail!("identify failed: {other:?}"),
        }
    }

    /// Create a room and return its first broadcast view.
    pub async fn create_room(&mut self, is_public: bool) -> anyhow::Result<RoomView> {
        self.send(&ClientEvent::CreateRoom { is_public }).await?;
        let event = self.recv().await?;
        match event {
            ServerEvent::RoomChanges { room, .. } => Ok(room),
            other => anyhow::bail!("create_room failed: {other:?}"),
        }
    }

    /// Receive one event and expect it to be an error with this code.
    pub async fn expect_error(&mut self, code: &str) -> anyhow::Result<()> {
        let event = self.recv().await?;
        match event {
            ServerEvent::Error { code: got, .. } if got == code => Ok(()),
            other => anyhow::bail!("expected {code} error, got: {other:?}"),
        }
    }

    /// Close the connection.
    #[allow(dead_code)]
    pub async fn close(mut self) -> anyhow::Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}
