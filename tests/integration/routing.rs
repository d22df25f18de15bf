//! Dispatch behaviour seen from a client.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use gantry_core::wire::{Kind, Packet, PacketId, StatusCode};
use gantry_gateway::DeleteRequest;
use gantry_server::{ClientError, Session};
use parking_lot::Mutex;

use crate::{session_of, start_service, wait_until, REPLY};

#[tokio::test]
async fn unregistered_kind_gets_no_reply_and_connection_survives() -> Result<()> {
    let server = start_service(|_| {}).await?;
    let mut client = server.client().await?;

    let stray = Packet::new(Kind(77), Bytes::from_static(b"?"));
    client.send(&stray).await?;
    let waited = client
        .recv_response(stray.id(), Duration::from_millis(200))
        .await;
    assert!(matches!(waited, Err(ClientError::Timeout(_))));

    let request = DeleteRequest {
        job: "still-here".into(),
        ..Default::default()
    }
    .to_packet()?;
    let reply = client.request(&request, REPLY).await?;
    assert_eq!(StatusCode::from_body(reply.body())?, StatusCode::Success);
    assert_eq!(server.service.connection_count(), 1);

    server.shutdown().await
}

#[tokio::test]
async fn handlers_fan_out_in_order() -> Result<()> {
    let order = Arc::new(Mutex::new(Vec::new()));
    let server = start_service(|service| {
        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            service.register_handler(Kind(40), move |_: &Session, _: &Packet| {
                order.lock().push(tag);
                Ok(())
            });
        }
        // The last one answers so the client knows dispatch finished.
        service.register_handler(Kind(40), |session: &Session, packet: &Packet| {
            session
                .connection()
                .send_packet(&Packet::success_response(packet.id()))?;
            Ok(())
        });
    })
    .await?;

    let mut client = server.client().await?;
    client
        .request(&Packet::new(Kind(40), Bytes::new()), REPLY)
        .await?;
    assert_eq!(*order.lock(), vec!["first", "second", "third"]);

    server.shutdown().await
}

#[tokio::test]
async fn client_responses_reach_the_response_handler() -> Result<()> {
    let seen: Arc<Mutex<Vec<(PacketId, Bytes)>>> = Arc::new(Mutex::new(Vec::new()));
    let server = start_service(|service| {
        let seen = Arc::clone(&seen);
        service.register_response_handler(move |_: &Session, packet: &Packet| {
            seen.lock().push((packet.id(), packet.body().clone()));
            Ok(())
        });
    })
    .await?;

    let mut client = server.client().await?;
    let id = session_of(&server, &client).await?;

    let ask = Packet::new(Kind(20), Bytes::from_static(b"ping"));
    server.service.unicast(&id, &ask);

    let received = client.recv().await?;
    assert_eq!(received.id(), ask.id());
    client
        .send(&Packet::response(received.id(), Bytes::from_static(b"pong")))
        .await?;

    wait_until(|| !seen.lock().is_empty()).await?;
    let seen = seen.lock().clone();
    assert_eq!(seen, vec![(ask.id(), Bytes::from_static(b"pong"))]);

    server.shutdown().await
}
