//! Gateway requests end to end.

use std::collections::BTreeMap;

use anyhow::Result;
use gantry_core::wire::{Kind, Packet, StatusCode};
use gantry_gateway::{kinds, DeleteRequest, PushRequest};

use crate::{start_service, wait_until, REPLY};

fn push_request(job: &str, value: f64) -> Packet {
    PushRequest {
        job: job.to_string(),
        labels: BTreeMap::new(),
        metrics: BTreeMap::from([("rows".to_string(), value)]),
    }
    .to_packet()
    .unwrap()
}

#[tokio::test]
async fn delete_returns_success_echoing_id() -> Result<()> {
    let server = start_service(|_| {}).await?;
    let mut client = server.client().await?;

    let pushed = client.request(&push_request("etl", 3.0), REPLY).await?;
    assert_eq!(StatusCode::from_body(pushed.body())?, StatusCode::Success);
    assert_eq!(server.store.group_count(), 1);

    let request = DeleteRequest {
        job: "etl".into(),
        labels: BTreeMap::new(),
    }
    .to_packet()?;
    let reply = client.request(&request, REPLY).await?;

    assert_eq!(reply.kind(), Kind::RESPONSE);
    assert_eq!(reply.id(), request.id());
    assert_eq!(StatusCode::from_body(reply.body())?, StatusCode::Success);
    assert_eq!(server.store.group_count(), 0);

    server.shutdown().await
}

#[tokio::test]
async fn delete_without_job_fails() -> Result<()> {
    let server = start_service(|_| {}).await?;
    let mut client = server.client().await?;

    let request = DeleteRequest::default().to_packet()?;
    let reply = client.request(&request, REPLY).await?;
    assert_eq!(StatusCode::from_body(reply.body())?, StatusCode::Failed);

    // Counters are recorded after the handler has replied.
    let metrics = server.service.metrics();
    wait_until(|| metrics.get("delete").is_some_and(|s| s.calls == 1)).await?;
    let delete = metrics.get("delete").unwrap();
    assert_eq!((delete.calls, delete.errors), (1, 1));

    server.shutdown().await
}

#[tokio::test]
async fn probes_and_status() -> Result<()> {
    let server = start_service(|_| {}).await?;
    let mut client = server.client().await?;

    for kind in [kinds::HEALTHY, kinds::READY] {
        let reply = client.request(&Packet::new(kind, Vec::<u8>::new()), REPLY).await?;
        assert_eq!(StatusCode::from_body(reply.body())?, StatusCode::Success);
    }

    client.request(&push_request("a", 1.0), REPLY).await?;
    client.request(&push_request("b", 2.0), REPLY).await?;

    let reply = client
        .request(&Packet::new(kinds::STATUS, Vec::<u8>::new()), REPLY)
        .await?;
    let info: BTreeMap<String, String> = serde_json::from_slice(reply.body())?;
    assert_eq!(info["groups"], "2");
    assert!(info.contains_key("birth"));

    server.store.shutdown();
    let reply = client
        .request(&Packet::new(kinds::HEALTHY, Vec::<u8>::new()), REPLY)
        .await?;
    assert_eq!(StatusCode::from_body(reply.body())?, StatusCode::Failed);

    server.shutdown().await
}
