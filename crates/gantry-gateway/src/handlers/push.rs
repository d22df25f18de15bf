use std::sync::Arc;

use gantry_core::wire::{Packet, StatusCode};
use gantry_server::Session;

use super::reply_state;
use crate::messages::{resolve_job, PushRequest};
use crate::store::{MetricStore, WriteRequest};

/// Store the metric values in the request body under its grouping labels.
pub fn push(
    store: Arc<MetricStore>,
    job_base64: bool,
) -> impl Fn(&Session, &Packet) -> anyhow::Result<()> + Send + Sync + 'static {
    move |session, packet| {
        let outcome = serde_json::from_slice::<PushRequest>(packet.body())
            .map_err(anyhow::Error::from)
            .and_then(|request| {
                let job = resolve_job(&request.job, job_base64)?;
                let mut labels = request.labels;
                labels.insert("job".to_string(), job);
                store.submit(WriteRequest::push(labels, request.metrics))?;
                Ok(())
            });

        let code = if outcome.is_ok() {
            StatusCode::Success
        } else {
            StatusCode::Failed
        };
        reply_state(session, packet.id(), code)?;
        outcome
    }
}
