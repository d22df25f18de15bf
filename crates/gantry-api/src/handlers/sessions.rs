//! /sessions handlers — session inspection and management.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use super::{parse_session_id, ApiState};

// ── /sessions/:id (DELETE) ────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct SessionDropResponse {
    pub session_id: String,
    pub dropped: bool,
}

pub async fn handle_session_drop(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionDropResponse>, (StatusCode, String)> {
    let id = parse_session_id(&session_id)?;
    let dropped = state.service.close_session(&id);

    if dropped {
        tracing::info!(session_id = %session_id, "session dropped via API");
    }

    Ok(Json(SessionDropResponse {
        session_id,
        dropped,
    }))
}

// ── /sessions/:id (GET) ───────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct SessionInspectResponse {
    pub session_id: String,
    pub peer_addr: String,
    pub user_id: Option<String>,
    pub uptime_secs: u64,
    pub closed: bool,
}

pub async fn handle_session_inspect(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionInspectResponse>, (StatusCode, String)> {
    let id = parse_session_id(&session_id)?;

    let session = state
        .service
        .session(&id)
        .ok_or((StatusCode::NOT_FOUND, "session not found".to_string()))?;

    Ok(Json(SessionInspectResponse {
        session_id: session.id().to_string(),
        peer_addr: session.peer_addr().to_string(),
        user_id: session.user_id(),
        uptime_secs: session.established_at().elapsed().as_secs(),
        closed: session.connection().is_closed(),
    }))
}
