//! Packet handlers for the gateway kinds.
//!
//! Each constructor returns a closure ready for
//! `SocketService::register_instrumented`.

mod delete;
mod health;
mod push;
mod status;

pub use delete::delete;
pub use health::{healthy, ready};
pub use push::push;
pub use status::status;

use anyhow::Context;
use gantry_core::wire::{Packet, PacketId, StatusCode};
use gantry_server::Session;

fn send(session: &Session, packet: &Packet) -> anyhow::Result<()> {
    session
        .connection()
        .send_packet(packet)
        .with_context(|| format!("replying to session {}", session.id()))
}

fn reply_state(session: &Session, id: PacketId, code: StatusCode) -> anyhow::Result<()> {
    send(session, &Packet::state_response(id, code))
}
