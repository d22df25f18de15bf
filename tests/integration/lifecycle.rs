//! Service lifecycle, heartbeats and shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use gantry_core::wire::{Kind, Packet};
use gantry_server::{ConnectionError, ServiceError, ServiceState};
use parking_lot::Mutex;

use crate::{start_service, wait_until};

#[tokio::test]
async fn heartbeat_arrives_within_100ms() -> Result<()> {
    let server = start_service(|service| {
        service
            .set_heartbeat(Duration::from_millis(50), Duration::ZERO)
            .unwrap();
    })
    .await?;

    let mut client = server.client().await?;
    let packet = tokio::time::timeout(Duration::from_millis(100), client.recv()).await??;
    assert_eq!(packet.kind(), Kind::HEARTBEAT);
    assert!(packet.body().is_empty());

    server.shutdown().await
}

#[tokio::test]
async fn heartbeat_config_rejected_while_running() -> Result<()> {
    let server = start_service(|service| {
        service
            .set_heartbeat(Duration::from_secs(15), Duration::from_secs(45))
            .unwrap();
    })
    .await?;

    let err = server
        .service
        .set_heartbeat(Duration::from_millis(1), Duration::from_millis(1))
        .unwrap_err();
    assert!(matches!(err, ServiceError::Configuration(_)));
    let current = server.service.heartbeat();
    assert_eq!(current.interval, Duration::from_secs(15));
    assert_eq!(current.timeout, Duration::from_secs(45));

    server.shutdown().await
}

#[tokio::test]
async fn silent_client_times_out() -> Result<()> {
    let reasons = Arc::new(Mutex::new(Vec::new()));
    let server = start_service(|service| {
        service
            .set_heartbeat(Duration::ZERO, Duration::from_millis(100))
            .unwrap();
        let reasons = Arc::clone(&reasons);
        service.on_disconnect(move |_, err| {
            reasons.lock().push(matches!(err, ConnectionError::Timeout(_)));
        });
    })
    .await?;

    let _client = server.client().await?;
    let service = server.service.clone();
    wait_until(|| service.connection_count() == 1).await?;
    wait_until(|| service.connection_count() == 0).await?;
    assert_eq!(*reasons.lock(), vec![true]);

    server.shutdown().await
}

#[tokio::test]
async fn shutdown_closes_clients() -> Result<()> {
    let server = start_service(|_| {}).await?;
    let mut client = server.client().await?;
    let service = server.service.clone();
    wait_until(|| service.connection_count() == 1).await?;

    server.shutdown().await?;
    assert_eq!(service.state(), ServiceState::Stopped);
    assert_eq!(service.connection_count(), 0);
    assert_eq!(service.stop_reason().as_deref(), Some("test finished"));
    assert!(client.recv().await.is_err());
    Ok(())
}

#[tokio::test]
async fn closing_a_stalled_session_releases_it() -> Result<()> {
    let server = start_service(|_| {}).await?;
    let mut client = server.client().await?;
    let id = crate::session_of(&server, &client).await?;

    // The client reads nothing yet, so the server's writer stalls.
    let packet = Packet::new(Kind(9), vec![0u8; 512 * 1024]);
    for _ in 0..64 {
        server.service.unicast(&id, &packet);
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(server.service.close_session(&id));
    let service = server.service.clone();
    wait_until(|| service.connection_count() == 0).await?;

    // Whatever was buffered drains, then the stream ends.
    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        while client.recv().await.is_ok() {}
    })
    .await;
    assert!(drained.is_ok(), "socket still open after close_session");

    tokio::time::timeout(Duration::from_secs(3), server.shutdown()).await??;
    Ok(())
}
