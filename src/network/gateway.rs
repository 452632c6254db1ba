//! Gateway - TCP listener that accepts incoming websocket connections.
//!
//! The Gateway binds to a socket and spawns a Connection task for each
//! incoming client. TLS termination is expected to happen upstream.

use crate::network::{Connection, ServerContext};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_hdr_async;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// The Gateway accepts incoming TCP connections and spawns handlers.
pub struct Gateway {
    listener: TcpListener,
    allow_origins: Vec<String>,
    ctx: Arc<ServerContext>,
}

impl Gateway {
    /// Bind the gateway to the specified address.
    pub async fn bind(
        addr: SocketAddr,
        allow_origins: Vec<String>,
        ctx: Arc<ServerContext>,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "WebSocket listener bound");
        Ok(Self {
            listener,
            allow_origins,
            ctx,
        })
    }

    /// The bound address, with the OS-assigned port when bound to port 0.
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the gateway, accepting connections forever.
    #[instrument(skip(self), name = "gateway")]
    pub async fn run(self) -> anyhow::Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    // Socket ids must be unique across instances: peers
                    // see them through the shared online index.
                    let socket_id = Uuid::new_v4().simple().to_string();
                    info!(%addr, socket_id = %socket_id, "Connection accepted");

                    let ctx = Arc::clone(&self.ctx);
                    let allowed = self.allow_origins.clone();

                    tokio::spawn(async move {
                        // CORS validation callback for the websocket handshake
                        let cors_callback = |req: &http::Request<()>,
                                             response: http::Response<()>| {
                            // If allow_origins is empty, allow all origins
                            if allowed.is_empty() {
                                return Ok(response);
                            }

                            if let Some(origin) =
                                req.headers().get("Origin").and_then(|o| o.to_str().ok())
                            {
                                if allowed.iter().any(|a| a == origin || a == "*") {
                                    return Ok(response);
                                }
                                warn!(%addr, origin = %origin, "WebSocket CORS rejected");
                            }

                            Err(http::Response::builder()
                                .status(http::StatusCode::FORBIDDEN)
                                .body(Some("CORS origin not allowed".to_string()))
                                .unwrap())
                        };

                        match accept_hdr_async(stream, cors_callback).await {
                            Ok(ws_stream) => {
                                let connection = Connection::new(socket_id.clone(), addr, ctx);
                                if let Err(e) = connection.run(ws_stream).await {
                                    error!(socket_id = %socket_id, %addr, error = %e, "Connection error");
                                }
                                info!(socket_id = %socket_id, %addr, "Connection closed");
                            }
                            Err(e) => {
                                warn!(%addr, error = %e, "WebSocket handshake failed");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}
