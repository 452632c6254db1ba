//! roomd - room lifecycle and membership coordinator.
//!
//! Stateless websocket front over a shared store: run as many instances
//! as needed, they coordinate through the store.

use roomd::config::Config;
use roomd::network::{Gateway, ServerContext};
use roomd::rooms::RoomCoordinator;
use roomd::session::SessionRegistry;
use roomd::store::{RedisStore, Store};
use roomd::http;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    info!(
        server = %config.server.name,
        listen = %config.listen.address,
        "Starting roomd"
    );

    // Connect to the shared store
    let store: Arc<dyn Store> = Arc::new(RedisStore::connect(&config.store.url).await?);
    info!("Store connection established");

    // Prometheus metrics are optional; metrics_port = 0 disables them.
    http::spawn_metrics_server(config.server.metrics_port.unwrap_or(9090));

    let ctx = Arc::new(ServerContext {
        coordinator: RoomCoordinator::new(
            Arc::clone(&store),
            config.rooms.allow_multiple_rooms,
            Duration::from_millis(config.store.lease_ttl_ms),
        ),
        sessions: SessionRegistry::new(store),
    });

    let gateway = Gateway::bind(
        config.listen.address,
        config.listen.allow_origins.clone(),
        ctx,
    )
    .await?;
    gateway.run().await?;

    Ok(())
}
