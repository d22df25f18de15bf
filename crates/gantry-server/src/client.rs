//! Minimal client for talking to a socket service. Used by `gantry-ctl`
//! and the integration tests.

use std::net::SocketAddr;
use std::time::Duration;

use gantry_core::wire::{self, Kind, Packet, PacketId, WireError, MAX_FRAME_BYTES};
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::framing::{self, FrameError};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("no response within {0:?}")]
    Timeout(Duration),
}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        ClientError::Frame(FrameError::Io(e))
    }
}

pub struct Client {
    stream: TcpStream,
    max_frame_bytes: u32,
}

impl Client {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            max_frame_bytes: MAX_FRAME_BYTES,
        })
    }

    /// Local end of the socket; the server sees this as the peer address.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.stream.local_addr()
    }

    pub async fn send(&mut self, packet: &Packet) -> Result<(), ClientError> {
        framing::write_frame(&mut self.stream, &wire::encode(packet)).await?;
        Ok(())
    }

    /// Next packet from the server, heartbeats included.
    pub async fn recv(&mut self) -> Result<Packet, ClientError> {
        let content = framing::read_frame(&mut self.stream, self.max_frame_bytes).await?;
        Ok(wire::decode(&content)?)
    }

    /// Wait for the response to `id`, discarding anything else.
    pub async fn recv_response(
        &mut self,
        id: PacketId,
        wait: Duration,
    ) -> Result<Packet, ClientError> {
        tokio::time::timeout(wait, self.next_response(id))
            .await
            .map_err(|_| ClientError::Timeout(wait))?
    }

    async fn next_response(&mut self, id: PacketId) -> Result<Packet, ClientError> {
        loop {
            let packet = self.recv().await?;
            if packet.kind() == Kind::RESPONSE && packet.id() == id {
                return Ok(packet);
            }
            tracing::trace!(kind = %packet.kind(), id = %packet.id(), "skipping packet");
        }
    }

    /// Send `packet` and wait for its response.
    pub async fn request(
        &mut self,
        packet: &Packet,
        wait: Duration,
    ) -> Result<Packet, ClientError> {
        self.send(packet).await?;
        self.recv_response(packet.id(), wait).await
    }
}
