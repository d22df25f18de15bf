//! JSON request bodies carried by gateway packets.

use std::collections::BTreeMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use gantry_core::wire::{Kind, Packet};
use serde::{Deserialize, Serialize};

use crate::kinds;

/// Body of a `DELETE` packet: remove the group identified by `job` + `labels`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub job: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// Body of a `PUSH` packet: set metric values within a group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushRequest {
    pub job: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

impl DeleteRequest {
    pub fn to_packet(&self) -> Result<Packet, serde_json::Error> {
        to_packet(kinds::DELETE, self)
    }
}

impl PushRequest {
    pub fn to_packet(&self) -> Result<Packet, serde_json::Error> {
        to_packet(kinds::PUSH, self)
    }
}

fn to_packet<T: Serialize>(kind: Kind, body: &T) -> Result<Packet, serde_json::Error> {
    Ok(Packet::new(kind, serde_json::to_vec(body)?))
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("job name is required")]
    Missing,
    #[error("invalid base64 in job name: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("job name is not UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Resolve the job name, decoding URL-safe base64 when `encoded` is set.
/// Trailing `=` padding is ignored.
pub fn resolve_job(job: &str, encoded: bool) -> Result<String, JobError> {
    let job = if encoded {
        let raw = URL_SAFE_NO_PAD.decode(job.trim_end_matches('='))?;
        String::from_utf8(raw)?
    } else {
        job.to_string()
    };
    if job.is_empty() {
        return Err(JobError::Missing);
    }
    Ok(job)
}

/// Encode a job name the way `resolve_job` expects when base64 is enabled.
pub fn encode_job(job: &str) -> String {
    URL_SAFE_NO_PAD.encode(job)
}
