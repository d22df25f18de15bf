//! /status, /health, /ready, /handlers, /groups handlers.

use std::collections::BTreeMap;
use std::time::UNIX_EPOCH;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use super::ApiState;

// ── /status ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct StatusResponse {
    pub state: String,
    pub listen_addr: String,
    pub connections: usize,
    pub sessions: Vec<SessionInfo>,
    pub groups: usize,
    pub writes: u64,
    pub stop_reason: Option<String>,
}

#[derive(Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub peer: String,
    pub user_id: Option<String>,
    pub established_secs: u64,
}

pub async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let mut sessions: Vec<SessionInfo> = state
        .service
        .sessions()
        .iter()
        .map(|s| SessionInfo {
            session_id: s.id().to_string(),
            peer: s.peer_addr().to_string(),
            user_id: s.user_id(),
            established_secs: s.established_at().elapsed().as_secs(),
        })
        .collect();
    sessions.sort_by(|a, b| b.established_secs.cmp(&a.established_secs));

    Json(StatusResponse {
        state: state.service.state().to_string(),
        listen_addr: state.service.local_addr().to_string(),
        connections: state.service.connection_count(),
        sessions,
        groups: state.store.group_count(),
        writes: state.store.write_count(),
        stop_reason: state.service.stop_reason(),
    })
}

// ── /health, /ready ───────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ProbeResponse {
    pub ok: bool,
    pub service: bool,
    pub store: bool,
}

fn probe(service: bool, store: bool) -> (StatusCode, Json<ProbeResponse>) {
    let ok = service && store;
    let code = if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(ProbeResponse { ok, service, store }))
}

pub async fn handle_health(State(state): State<ApiState>) -> (StatusCode, Json<ProbeResponse>) {
    probe(state.service.is_healthy(), state.store.healthy().is_ok())
}

pub async fn handle_ready(State(state): State<ApiState>) -> (StatusCode, Json<ProbeResponse>) {
    probe(state.service.is_ready(), state.store.ready().is_ok())
}

// ── /handlers ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HandlersResponse {
    pub handlers: Vec<HandlerInfo>,
}

#[derive(Serialize)]
pub struct HandlerInfo {
    pub name: String,
    pub calls: u64,
    pub errors: u64,
    pub total_ms: f64,
}

pub async fn handle_handlers(State(state): State<ApiState>) -> Json<HandlersResponse> {
    let handlers = state
        .service
        .metrics()
        .snapshot()
        .into_iter()
        .map(|(name, stats)| HandlerInfo {
            name,
            calls: stats.calls,
            errors: stats.errors,
            total_ms: stats.total_time.as_secs_f64() * 1000.0,
        })
        .collect();
    Json(HandlersResponse { handlers })
}

// ── /groups ───────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct GroupInfo {
    pub labels: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
    pub last_write_secs: u64,
}

pub async fn handle_groups(State(state): State<ApiState>) -> Json<Vec<GroupInfo>> {
    let groups = state
        .store
        .groups()
        .into_iter()
        .map(|g| GroupInfo {
            last_write_secs: g
                .last_write
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            labels: g.labels,
            metrics: g.metrics,
        })
        .collect();
    Json(groups)
}
