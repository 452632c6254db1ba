//! Test server management.
//!
//! Runs an in-process roomd instance over the in-memory store for
//! integration testing.

use roomd::network::{Gateway, ServerContext};
use roomd::rooms::RoomCoordinator;
use roomd::session::SessionRegistry;
use roomd::store::{MemoryStore, Store};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// A test server instance.
pub struct TestServer {
    addr: SocketAddr,
    store: Arc<dyn Store>,
    gateway_task: JoinHandle<()>,
}

impl TestServer {
    /// Start a server on an OS-assigned port with default room policy.
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_with_policy(false).await
    }

    /// Start a server with an explicit multiple-rooms policy.
    pub async fn start_with_policy(allow_multiple_rooms: bool) -> anyhow::Result<Self> {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let ctx = Arc::new(ServerContext {
            coordinator: RoomCoordinator::new(
                Arc::clone(&store),
                allow_multiple_rooms,
                Duration::from_secs(3),
            ),
            sessions: SessionRegistry::new(Arc::clone(&store)),
        });

        let gateway = Gateway::bind("127.0.0.1:0".parse()?, Vec::new(), ctx).await?;
        let addr = gateway.local_addr()?;
        let gateway_task = tokio::spawn(async move {
            let _ = gateway.run().await;
        });

        Ok(Self {
            addr,
            store,
            gateway_task,
        })
    }

    /// The server's listen address.
    #[allow(dead_code)]
    pub fn address(&self) -> SocketAddr {
        self.addr
    }

    /// The shared store backing this server, for seeding and inspection.
    #[allow(dead_code)]
    pub fn store(&self) -> Arc<dyn Store> {
        Arc::clone(&self.store)
    }

    /// Connect and identify a new test client.
    pub async fn connect(&self, user_id: u64) -> anyhow::Result<super::client::TestClient> {
        let mut client = super::client::TestClient::connect(self.addr).await?;
        client.identify(user_id).await?;
        Ok(client)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.gateway_task.abort();
    }
}
