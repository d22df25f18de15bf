//! Packet kinds understood by the gateway.

use gantry_core::wire::Kind;

pub const DELETE: Kind = Kind(2);
pub const PUSH: Kind = Kind(3);
pub const HEALTHY: Kind = Kind(4);
pub const READY: Kind = Kind(5);
pub const STATUS: Kind = Kind(6);

/// Name of a gateway kind, for logs and CLI output.
pub fn name(kind: Kind) -> &'static str {
    match kind {
        Kind::HEARTBEAT => "heartbeat",
        Kind::RESPONSE => "response",
        DELETE => "delete",
        PUSH => "push",
        HEALTHY => "healthy",
        READY => "ready",
        STATUS => "status",
        _ => "unknown",
    }
}
