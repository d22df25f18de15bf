//! gantry-core — wire format, packet codec, and configuration.
//! All other Gantry crates depend on this one.

pub mod config;
pub mod wire;

pub use wire::{Kind, Packet, PacketId, StatusCode, WireError};
