//! Unicast and broadcast delivery.

use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use gantry_core::wire::{Kind, Packet};
use gantry_server::{Client, SessionId};

use crate::{session_of, start_service, wait_until};

/// True when nothing arrives within `quiet`.
async fn stays_silent(client: &mut Client, quiet: Duration) -> bool {
    tokio::time::timeout(quiet, client.recv()).await.is_err()
}

#[tokio::test]
async fn unicast_reaches_only_its_session() -> Result<()> {
    let server = start_service(|_| {}).await?;
    let mut a = server.client().await?;
    let mut b = server.client().await?;
    let a_id = session_of(&server, &a).await?;
    session_of(&server, &b).await?;

    let packet = Packet::new(Kind(21), Bytes::from_static(b"for a"));
    server.service.unicast(&a_id, &packet);

    assert_eq!(a.recv().await?, packet);
    assert!(stays_silent(&mut b, Duration::from_millis(200)).await);

    server.service.unicast(&SessionId::new(), &packet);
    assert!(stays_silent(&mut a, Duration::from_millis(100)).await);
    assert_eq!(server.service.connection_count(), 2);

    server.shutdown().await
}

#[tokio::test]
async fn broadcast_skips_disconnected_sessions() -> Result<()> {
    let server = start_service(|_| {}).await?;
    let a = server.client().await?;
    let mut b = server.client().await?;
    session_of(&server, &a).await?;
    session_of(&server, &b).await?;

    drop(a);
    let service = server.service.clone();
    wait_until(|| service.connection_count() == 1).await?;

    let packet = Packet::new(Kind(30), Bytes::from_static(b"all"));
    server.service.broadcast(&packet);
    assert_eq!(b.recv().await?, packet);

    server.shutdown().await
}
