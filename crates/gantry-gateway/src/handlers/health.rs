use std::sync::Arc;

use gantry_core::wire::{Packet, StatusCode};
use gantry_server::Session;

use super::reply_state;
use crate::store::{MetricStore, StoreError};

/// `Success` while the store is healthy, `Failed` otherwise.
pub fn healthy(
    store: Arc<MetricStore>,
) -> impl Fn(&Session, &Packet) -> anyhow::Result<()> + Send + Sync + 'static {
    move |session, packet| respond(session, packet, store.healthy(), "healthy")
}

/// `Success` while the store accepts writes, `Failed` otherwise.
pub fn ready(
    store: Arc<MetricStore>,
) -> impl Fn(&Session, &Packet) -> anyhow::Result<()> + Send + Sync + 'static {
    move |session, packet| respond(session, packet, store.ready(), "ready")
}

fn respond(
    session: &Session,
    packet: &Packet,
    state: Result<(), StoreError>,
    check: &str,
) -> anyhow::Result<()> {
    let code = match state {
        Ok(()) => StatusCode::Success,
        Err(e) => {
            tracing::error!(check, error = %e, "metric store check failed");
            StatusCode::Failed
        }
    };
    reply_state(session, packet.id(), code)
}
