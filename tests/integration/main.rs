//! Gantry integration test harness.
//!
//! Every test runs an in-process socket service on 127.0.0.1 with an
//! ephemeral port and talks to it over real TCP sockets.
//!
//!   cargo test --test integration

mod api;
mod delivery;
mod gateway;
mod lifecycle;
mod routing;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use gantry_core::config::GatewayConfig;
use gantry_gateway::MetricStore;
use gantry_server::{Client, ServiceError, SocketService, TransportSettings};
use tokio::task::JoinHandle;

// ── Harness ───────────────────────────────────────────────────────────────────

pub const REPLY: Duration = Duration::from_secs(2);

pub struct TestServer {
    pub service: Arc<SocketService>,
    pub store: Arc<MetricStore>,
    run: JoinHandle<Result<(), ServiceError>>,
}

impl TestServer {
    pub fn addr(&self) -> SocketAddr {
        self.service.local_addr()
    }

    pub async fn client(&self) -> Result<Client> {
        Client::connect(self.addr())
            .await
            .context("failed to connect test client")
    }

    /// Stop the service and wait for `run` to return.
    pub async fn shutdown(self) -> Result<()> {
        self.service.stop("test finished");
        self.run.await.context("run task panicked")??;
        Ok(())
    }
}

/// Bind on an ephemeral port, let `configure` adjust the service, register
/// the gateway, and start running.
pub async fn start_service(configure: impl FnOnce(&SocketService)) -> Result<TestServer> {
    let service = SocketService::bind("127.0.0.1:0", TransportSettings::default()).await?;
    configure(&service);

    let store = Arc::new(MetricStore::new());
    gantry_gateway::register(&service, Arc::clone(&store), &GatewayConfig::default());

    let service = Arc::new(service);
    let run = tokio::spawn(Arc::clone(&service).run());
    {
        let service = Arc::clone(&service);
        wait_until(move || service.is_ready()).await?;
    }
    Ok(TestServer {
        service,
        store,
        run,
    })
}

/// Poll `cond` until it holds, for up to two seconds.
pub async fn wait_until(cond: impl Fn() -> bool) -> Result<()> {
    for _ in 0..400 {
        if cond() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    bail!("condition not met within 2s")
}

/// Session id the server assigned to `client`.
pub async fn session_of(server: &TestServer, client: &Client) -> Result<gantry_server::SessionId> {
    let local = client.local_addr()?;
    let service = Arc::clone(&server.service);
    wait_until(|| service.sessions().iter().any(|s| s.peer_addr() == local)).await?;
    server
        .service
        .sessions()
        .iter()
        .find(|s| s.peer_addr() == local)
        .map(|s| s.id())
        .context("no session for client")
}
