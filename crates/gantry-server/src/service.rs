//! Socket service: accepts connections, owns the session registry and the
//! route table, and drives each connection's dispatch loop.
//!
//! Lifecycle is one-way: `Initialized → Running → Stopped`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use gantry_core::config::{HeartbeatConfig, TransportConfig};
use gantry_core::wire::{Kind, Packet, MAX_FRAME_BYTES};
use parking_lot::{Mutex, RwLock};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::connection::{Connection, ConnectionError, ConnectionSettings};
use crate::instrument::{instrument, HandlerMetrics};
use crate::route::RouteTable;
use crate::session::{Session, SessionId};

type ConnectCallback = Arc<dyn Fn(&Session) + Send + Sync>;
type DisconnectCallback = Arc<dyn Fn(&Session, &ConnectionError) + Send + Sync>;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Operation not valid in the current lifecycle state.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ── Settings ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Initialized,
    Running,
    Stopped,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServiceState::Initialized => "initialized",
            ServiceState::Running => "running",
            ServiceState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Heartbeat period and per-frame read deadline. Zero disables either.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl From<&HeartbeatConfig> for HeartbeatSettings {
    fn from(c: &HeartbeatConfig) -> Self {
        Self {
            interval: c.interval(),
            timeout: c.timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportSettings {
    pub queue_capacity: usize,
    pub max_frame_bytes: u32,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            max_frame_bytes: MAX_FRAME_BYTES,
        }
    }
}

impl From<&TransportConfig> for TransportSettings {
    fn from(c: &TransportConfig) -> Self {
        Self {
            queue_capacity: c.queue_capacity,
            max_frame_bytes: c.max_frame_bytes,
        }
    }
}

// ── Service ───────────────────────────────────────────────────────────────────

pub struct SocketService {
    local_addr: SocketAddr,
    listener: Mutex<Option<TcpListener>>,
    state: Mutex<ServiceState>,
    heartbeat: Mutex<HeartbeatSettings>,
    transport: TransportSettings,
    routes: RouteTable,
    sessions: DashMap<SessionId, Arc<Session>>,
    on_connect: RwLock<Option<ConnectCallback>>,
    on_disconnect: RwLock<Option<DisconnectCallback>>,
    metrics: Arc<HandlerMetrics>,
    shutdown: CancellationToken,
    stop_reason: Mutex<Option<String>>,
    accepting: AtomicBool,
    tasks: TaskTracker,
}

impl SocketService {
    /// Bind the listening socket. Nothing is accepted until [`run`](Self::run).
    pub async fn bind(
        addr: impl ToSocketAddrs,
        transport: TransportSettings,
    ) -> Result<Self, ServiceError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, "socket service bound");

        Ok(Self {
            local_addr,
            listener: Mutex::new(Some(listener)),
            state: Mutex::new(ServiceState::Initialized),
            heartbeat: Mutex::new(HeartbeatSettings::default()),
            transport,
            routes: RouteTable::new(),
            sessions: DashMap::new(),
            on_connect: RwLock::new(None),
            on_disconnect: RwLock::new(None),
            metrics: Arc::new(HandlerMetrics::new()),
            shutdown: CancellationToken::new(),
            stop_reason: Mutex::new(None),
            accepting: AtomicBool::new(false),
            tasks: TaskTracker::new(),
        })
    }

    // ── Configuration ─────────────────────────────────────────────────────────

    /// Set heartbeat interval and read timeout. Only valid before `run`.
    pub fn set_heartbeat(&self, interval: Duration, timeout: Duration) -> Result<(), ServiceError> {
        let state = self.state.lock();
        if *state != ServiceState::Initialized {
            return Err(ServiceError::Configuration(format!(
                "heartbeat cannot change while {state}"
            )));
        }
        *self.heartbeat.lock() = HeartbeatSettings { interval, timeout };
        Ok(())
    }

    pub fn heartbeat(&self) -> HeartbeatSettings {
        *self.heartbeat.lock()
    }

    pub fn register_handler<F>(&self, kind: Kind, handler: F)
    where
        F: Fn(&Session, &Packet) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.routes.register(kind, handler);
    }

    /// Register `handler` wrapped with this service's call counters.
    pub fn register_instrumented<F>(&self, kind: Kind, name: &str, handler: F)
    where
        F: Fn(&Session, &Packet) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.routes
            .register(kind, instrument(name, handler, Arc::clone(&self.metrics)));
    }

    pub fn register_response_handler<F>(&self, handler: F)
    where
        F: Fn(&Session, &Packet) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.routes.set_response_handler(handler);
    }

    pub fn on_connect<F>(&self, callback: F)
    where
        F: Fn(&Session) + Send + Sync + 'static,
    {
        *self.on_connect.write() = Some(Arc::new(callback));
    }

    pub fn on_disconnect<F>(&self, callback: F)
    where
        F: Fn(&Session, &ConnectionError) + Send + Sync + 'static,
    {
        *self.on_disconnect.write() = Some(Arc::new(callback));
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Accept connections until [`stop`](Self::stop) is called, then tear
    /// every connection down and return once their tasks have finished.
    pub async fn run(self: Arc<Self>) -> Result<(), ServiceError> {
        let listener = {
            let mut state = self.state.lock();
            if *state != ServiceState::Initialized {
                return Err(ServiceError::Configuration(format!(
                    "service cannot run while {state}"
                )));
            }
            let listener = self.listener.lock().take().ok_or_else(|| {
                ServiceError::Configuration("listener already taken".to_string())
            })?;
            *state = ServiceState::Running;
            listener
        };

        let heartbeat = self.heartbeat();
        tracing::info!(
            addr = %self.local_addr,
            heartbeat_ms = heartbeat.interval.as_millis() as u64,
            timeout_ms = heartbeat.timeout.as_millis() as u64,
            "socket service running"
        );

        self.accepting.store(true, Ordering::SeqCst);
        let acceptor = tokio::spawn(Arc::clone(&self).accept_loop(listener));

        self.shutdown.cancelled().await;
        *self.state.lock() = ServiceState::Stopped;

        if let Err(e) = acceptor.await {
            tracing::error!(error = %e, "accept loop panicked");
        }
        self.tasks.close();
        self.tasks.wait().await;

        tracing::info!(
            reason = self.stop_reason().as_deref().unwrap_or(""),
            "socket service stopped"
        );
        Ok(())
    }

    /// Request shutdown. Non-blocking; only the first reason is kept.
    pub fn stop(&self, reason: impl Into<String>) {
        {
            let mut slot = self.stop_reason.lock();
            if slot.is_none() {
                let reason = reason.into();
                tracing::info!(reason = %reason, "socket service stopping");
                *slot = Some(reason);
            }
        }
        self.shutdown.cancel();
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            let accepted = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                r = listener.accept() => r,
            };
            match accepted {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!(peer = %peer, error = %e, "set_nodelay failed");
                    }
                    self.tasks
                        .spawn(Arc::clone(&self).serve_connection(stream, peer));
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                    self.stop(format!("accept failed: {e}"));
                    break;
                }
            }
        }
        self.accepting.store(false, Ordering::SeqCst);
    }

    async fn serve_connection(self: Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        let cancel = self.shutdown.child_token();
        let heartbeat = self.heartbeat();
        let settings = ConnectionSettings {
            heartbeat_interval: heartbeat.interval,
            read_timeout: heartbeat.timeout,
            queue_capacity: self.transport.queue_capacity,
            max_frame_bytes: self.transport.max_frame_bytes,
        };
        let (connection, mut events) =
            Connection::spawn(&self.tasks, stream, peer.to_string(), &settings, cancel.clone());
        let session = Arc::new(Session::new(Arc::new(connection), peer));
        self.sessions.insert(session.id(), Arc::clone(&session));

        let _teardown = Teardown {
            service: &self,
            session: &session,
            cancel: &cancel,
        };
        tracing::info!(session_id = %session.id(), peer = %peer, "connection accepted");

        let on_connect = self.on_connect.read().clone();
        if let Some(cb) = on_connect {
            cb(&session);
        }

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let reason = if self.shutdown.is_cancelled() {
                        ConnectionError::Shutdown
                    } else {
                        ConnectionError::Aborted
                    };
                    self.notify_disconnect(&session, &reason);
                    break;
                }
                Some(packet) = events.inbound.recv() => {
                    self.routes.dispatch(&session, &packet);
                }
                Some(err) = events.errors.recv() => {
                    self.notify_disconnect(&session, &err);
                    break;
                }
                else => break,
            }
        }
    }

    fn notify_disconnect(&self, session: &Session, err: &ConnectionError) {
        tracing::info!(session_id = %session.id(), reason = %err, "connection ending");
        let on_disconnect = self.on_disconnect.read().clone();
        if let Some(cb) = on_disconnect {
            cb(session, err);
        }
    }

    // ── Delivery ──────────────────────────────────────────────────────────────

    /// Send to one session. Unknown ids and send failures are logged only.
    pub fn unicast(&self, id: &SessionId, packet: &Packet) {
        let Some(session) = self.session(id) else {
            tracing::debug!(session_id = %id, "unicast to unknown session");
            return;
        };
        if let Err(e) = session.connection().send_packet(packet) {
            tracing::warn!(session_id = %id, error = %e, "unicast failed");
        }
    }

    /// Send to every live session, best effort.
    pub fn broadcast(&self, packet: &Packet) {
        for session in self.sessions() {
            if let Err(e) = session.connection().send_packet(packet) {
                tracing::warn!(session_id = %session.id(), error = %e, "broadcast send failed");
            }
        }
    }

    /// Close one connection. Returns false when the id is unknown.
    pub fn close_session(&self, id: &SessionId) -> bool {
        match self.session(id) {
            Some(session) => {
                session.connection().close();
                true
            }
            None => false,
        }
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub fn state(&self) -> ServiceState {
        *self.state.lock()
    }

    pub fn is_healthy(&self) -> bool {
        self.state() == ServiceState::Running
    }

    pub fn is_ready(&self) -> bool {
        self.is_healthy() && self.accepting.load(Ordering::SeqCst)
    }

    pub fn connection_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.iter().map(|e| Arc::clone(e.value())).collect()
    }

    pub fn session(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|e| Arc::clone(e.value()))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stop_reason(&self) -> Option<String> {
        self.stop_reason.lock().clone()
    }

    pub fn metrics(&self) -> Arc<HandlerMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }
}

/// Runs when a connection task ends, including by panic.
struct Teardown<'a> {
    service: &'a SocketService,
    session: &'a Session,
    cancel: &'a CancellationToken,
}

impl Drop for Teardown<'_> {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.session.connection().close();
        self.service.sessions.remove(&self.session.id());
        tracing::info!(
            session_id = %self.session.id(),
            peer = %self.session.peer_addr(),
            "connection closed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use bytes::Bytes;
    use gantry_core::wire::{PacketId, StatusCode};

    type RunHandle = tokio::task::JoinHandle<Result<(), ServiceError>>;

    async fn start(service: SocketService) -> (Arc<SocketService>, RunHandle) {
        let service = Arc::new(service);
        let handle = tokio::spawn(Arc::clone(&service).run());
        wait_for(|| service.is_ready()).await;
        (service, handle)
    }

    async fn wait_for(cond: impl Fn() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    async fn bound() -> SocketService {
        SocketService::bind("127.0.0.1:0", TransportSettings::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn heartbeat_locked_once_running() {
        let service = bound().await;
        service
            .set_heartbeat(Duration::from_millis(50), Duration::from_secs(1))
            .unwrap();
        let (service, handle) = start(service).await;

        let err = service
            .set_heartbeat(Duration::from_secs(9), Duration::from_secs(9))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Configuration(_)));
        assert_eq!(service.heartbeat().interval, Duration::from_millis(50));

        service.stop("test over");
        handle.await.unwrap().unwrap();
        assert_eq!(service.state(), ServiceState::Stopped);
        assert!(service
            .set_heartbeat(Duration::ZERO, Duration::ZERO)
            .is_err());
    }

    #[tokio::test]
    async fn second_run_is_rejected() {
        let (service, handle) = start(bound().await).await;
        let again = Arc::clone(&service).run().await;
        assert!(matches!(again, Err(ServiceError::Configuration(_))));

        service.stop("done");
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_keeps_first_reason() {
        let (service, handle) = start(bound().await).await;
        assert!(service.is_healthy());

        service.stop("first");
        service.stop("second");
        handle.await.unwrap().unwrap();

        assert_eq!(service.stop_reason().as_deref(), Some("first"));
        assert!(!service.is_healthy());
        assert!(!service.is_ready());
    }

    #[tokio::test]
    async fn request_gets_response_and_session_is_tracked() {
        let service = bound().await;
        service.register_handler(Kind(2), |session: &Session, packet: &Packet| {
            session
                .connection()
                .send_packet(&Packet::success_response(packet.id()))?;
            Ok(())
        });
        let (service, handle) = start(service).await;

        let mut client = Client::connect(service.local_addr()).await.unwrap();
        wait_for(|| service.connection_count() == 1).await;

        let request = Packet::new(Kind(2), Bytes::from_static(b"{}"));
        let reply = client
            .request(&request, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(reply.id(), request.id());
        assert_eq!(StatusCode::from_body(reply.body()).unwrap(), StatusCode::Success);

        drop(client);
        wait_for(|| service.connection_count() == 0).await;

        service.stop("done");
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn callbacks_fire_on_connect_and_shutdown() {
        let service = bound().await;
        let events = Arc::new(Mutex::new(Vec::<String>::new()));
        let log = Arc::clone(&events);
        service.on_connect(move |_| log.lock().push("connect".into()));
        let log = Arc::clone(&events);
        service.on_disconnect(move |_, err| log.lock().push(format!("disconnect: {err}")));
        let (service, handle) = start(service).await;

        let _client = Client::connect(service.local_addr()).await.unwrap();
        wait_for(|| service.connection_count() == 1).await;

        service.stop("shutdown test");
        handle.await.unwrap().unwrap();

        assert_eq!(service.connection_count(), 0);
        assert_eq!(
            *events.lock(),
            vec!["connect".to_string(), "disconnect: service shutting down".to_string()]
        );
    }

    #[tokio::test]
    async fn stop_returns_with_a_peer_that_never_reads() {
        let (service, handle) = start(bound().await).await;
        let _stalled = TcpStream::connect(service.local_addr()).await.unwrap();
        wait_for(|| service.connection_count() == 1).await;

        // Far more than the socket buffers hold, so the writer blocks.
        let packet = Packet::new(Kind(9), vec![0u8; 512 * 1024]);
        for _ in 0..64 {
            service.broadcast(&packet);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        service.stop("stalled peer");
        tokio::time::timeout(Duration::from_secs(3), handle)
            .await
            .expect("run did not return after stop")
            .unwrap()
            .unwrap();
        assert_eq!(service.state(), ServiceState::Stopped);
        assert_eq!(service.connection_count(), 0);
    }

    #[tokio::test]
    async fn close_session_drops_the_peer() {
        let (service, handle) = start(bound().await).await;
        let mut client = Client::connect(service.local_addr()).await.unwrap();
        wait_for(|| service.connection_count() == 1).await;

        let id = service.sessions()[0].id();
        assert!(service.close_session(&id));
        assert!(!service.close_session(&SessionId::new()));
        assert!(client.recv().await.is_err());
        wait_for(|| service.connection_count() == 0).await;

        // No-op for a session that is gone.
        service.unicast(&id, &Packet::success_response(PacketId::random()));

        service.stop("done");
        handle.await.unwrap().unwrap();
    }
}
