//! HTTP API handlers — exposes service and gateway state as JSON.

pub mod sessions;
pub mod status;

use std::sync::Arc;

use axum::http::StatusCode;
use gantry_gateway::MetricStore;
use gantry_server::{SessionId, SocketService};

#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<SocketService>,
    pub store: Arc<MetricStore>,
}

/// Parse a session id path segment.
fn parse_session_id(raw: &str) -> Result<SessionId, (StatusCode, String)> {
    raw.parse()
        .map_err(|_| (StatusCode::BAD_REQUEST, "invalid session id".to_string()))
}

pub use sessions::{handle_session_drop, handle_session_inspect};
pub use status::{handle_groups, handle_handlers, handle_health, handle_ready, handle_status};
