use std::sync::Arc;

use gantry_core::wire::{Packet, StatusCode};
use gantry_server::Session;

use super::{reply_state, send};
use crate::messages::{resolve_job, DeleteRequest};
use crate::store::{MetricStore, WriteRequest};

/// Delete the metric group named in the request body.
///
/// Invalid requests get a `Failed` state response; a deleted (or already
/// absent) group gets `Success` echoing the request id.
pub fn delete(
    store: Arc<MetricStore>,
    job_base64: bool,
) -> impl Fn(&Session, &Packet) -> anyhow::Result<()> + Send + Sync + 'static {
    move |session, packet| {
        let request: DeleteRequest = match serde_json::from_slice(packet.body()) {
            Ok(r) => r,
            Err(e) => {
                reply_state(session, packet.id(), StatusCode::Failed)?;
                anyhow::bail!("malformed delete request: {e}");
            }
        };

        let job = match resolve_job(&request.job, job_base64) {
            Ok(job) => job,
            Err(e) => {
                tracing::debug!(job = %request.job, error = %e, "rejecting delete");
                reply_state(session, packet.id(), StatusCode::Failed)?;
                anyhow::bail!(e);
            }
        };

        let mut labels = request.labels;
        labels.insert("job".to_string(), job);
        if let Err(e) = store.submit(WriteRequest::delete(labels)) {
            reply_state(session, packet.id(), StatusCode::Failed)?;
            anyhow::bail!(e);
        }

        send(session, &Packet::success_response(packet.id()))
    }
}
