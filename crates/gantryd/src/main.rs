//! gantryd — metrics gateway daemon over the gantry packet protocol.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use gantry_core::config::GantryConfig;
use gantry_gateway::MetricStore;
use gantry_server::{HeartbeatSettings, SocketService, TransportSettings};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = GantryConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = GantryConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        GantryConfig::default()
    });

    let listen_addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config.network.listen_addr.clone());
    tracing::info!(addr = %listen_addr, "gantryd starting");

    // Packet service
    let service = SocketService::bind(
        listen_addr.as_str(),
        TransportSettings::from(&config.transport),
    )
    .await
    .with_context(|| format!("failed to bind {listen_addr}"))?;

    let heartbeat = HeartbeatSettings::from(&config.heartbeat);
    service.set_heartbeat(heartbeat.interval, heartbeat.timeout)?;

    service.on_connect(|session| {
        tracing::debug!(session_id = %session.id(), peer = %session.peer_addr(), "client connected");
    });
    service.on_disconnect(|session, err| {
        tracing::debug!(session_id = %session.id(), reason = %err, "client disconnected");
    });

    // Gateway
    let store = Arc::new(MetricStore::new());
    gantry_gateway::register(&service, Arc::clone(&store), &config.gateway);
    tracing::info!(
        job_base64 = config.gateway.job_base64_encoded,
        path_prefix = %config.gateway.path_prefix,
        "gateway configured"
    );

    let service = Arc::new(service);

    // ── Shutdown ─────────────────────────────────────────────────────────────
    {
        let service = Arc::clone(&service);
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            store.shutdown();
            service.stop("shutdown signal");
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let session_printer = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                interval.tick().await;
                tracing::debug!(count = service.connection_count(), "session table snapshot");
                for s in service.sessions() {
                    tracing::debug!(session_id = %s.id(), peer = %s.peer_addr(), "  session");
                }
            }
        })
    };

    // Status HTTP endpoint
    let api_port = config.network.api_port;
    if api_port != 0 {
        let state = gantry_api::ApiState {
            service: Arc::clone(&service),
            store: Arc::clone(&store),
        };
        tokio::spawn(async move {
            if let Err(e) = gantry_api::serve(state, api_port).await {
                tracing::error!(error = %e, "status server failed");
            }
        });
    }

    let result = Arc::clone(&service).run().await;
    session_printer.abort();

    match &result {
        Ok(()) => tracing::info!(
            reason = service.stop_reason().as_deref().unwrap_or("none"),
            "gantryd stopped"
        ),
        Err(e) => tracing::error!(error = %e, "socket service failed"),
    }
    result.context("socket service failed")
}
