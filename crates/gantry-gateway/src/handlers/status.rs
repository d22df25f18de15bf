use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use gantry_core::wire::Packet;
use gantry_server::Session;

use super::send;
use crate::store::MetricStore;

/// Reply with a JSON map of build and runtime information.
pub fn status(
    store: Arc<MetricStore>,
    path_prefix: String,
) -> impl Fn(&Session, &Packet) -> anyhow::Result<()> + Send + Sync + 'static {
    let birth = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    move |session, packet| {
        let info = BTreeMap::from([
            ("version", env!("CARGO_PKG_VERSION").to_string()),
            ("birth", birth.to_string()),
            ("pathPrefix", path_prefix.clone()),
            ("groups", store.group_count().to_string()),
            ("writes", store.write_count().to_string()),
        ]);
        let body = serde_json::to_vec(&info).context("encoding status")?;
        send(session, &Packet::response(packet.id(), body))
    }
}
