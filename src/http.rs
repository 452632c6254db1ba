//! HTTP sidecar serving the Prometheus scrape endpoint.
//!
//! The websocket gateway is roomd's primary surface; metrics get their
//! own listener so scrapes never share a port with client traffic.
//! Convention: a metrics port of 0 disables the endpoint entirely,
//! which is how tests run.

use axum::{Router, routing::get};
use std::net::SocketAddr;
use tracing::{error, info};

async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

fn router() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

/// Initialize the metrics registry and spawn the scrape endpoint on
/// `0.0.0.0:port` as a background task. A port of 0 disables both.
pub fn spawn_metrics_server(port: u16) {
    if port == 0 {
        info!("Metrics disabled");
        return;
    }

    crate::metrics::init();
    tokio::spawn(async move {
        if let Err(e) = serve(port).await {
            error!(port, error = %e, "Metrics endpoint failed");
        }
    });
    info!(port, "Prometheus HTTP server started");
}

async fn serve(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "Metrics endpoint listening");
    axum::serve(listener, router()).await?;
    Ok(())
}
