//! HTTP status API over a running service.

use std::collections::BTreeMap;

use anyhow::Result;
use gantry_gateway::PushRequest;
use serde_json::Value;
use tokio::net::TcpListener;

use crate::{session_of, start_service, wait_until, TestServer, REPLY};

async fn serve_api(server: &TestServer) -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let base = format!("http://{}/api", listener.local_addr()?);
    let state = gantry_api::ApiState {
        service: server.service.clone(),
        store: server.store.clone(),
    };
    tokio::spawn(gantry_api::serve_on(listener, state));
    Ok(base)
}

#[tokio::test]
async fn status_handlers_and_session_drop() -> Result<()> {
    let server = start_service(|_| {}).await?;
    let base = serve_api(&server).await?;
    let mut client = server.client().await?;
    let id = session_of(&server, &client).await?;

    let push = PushRequest {
        job: "api".into(),
        labels: BTreeMap::new(),
        metrics: BTreeMap::from([("up".to_string(), 1.0)]),
    }
    .to_packet()?;
    client.request(&push, REPLY).await?;
    let metrics = server.service.metrics();
    wait_until(|| metrics.get("push").is_some()).await?;

    let status: Value = reqwest::get(format!("{base}/status")).await?.json().await?;
    assert_eq!(status["state"], "running");
    assert_eq!(status["connections"], 1);
    assert_eq!(status["groups"], 1);
    assert_eq!(status["sessions"][0]["session_id"], id.to_string());

    let handlers: Value = reqwest::get(format!("{base}/handlers")).await?.json().await?;
    assert_eq!(handlers["handlers"][0]["name"], "push");
    assert_eq!(handlers["handlers"][0]["calls"], 1);

    let health = reqwest::get(format!("{base}/health")).await?;
    assert!(health.status().is_success());

    let dropped: Value = reqwest::Client::new()
        .delete(format!("{base}/sessions/{id}"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(dropped["dropped"], true);
    let service = server.service.clone();
    wait_until(|| service.connection_count() == 0).await?;

    let bad = reqwest::Client::new()
        .delete(format!("{base}/sessions/not-a-uuid"))
        .send()
        .await?;
    assert_eq!(bad.status().as_u16(), 400);

    server.shutdown().await
}
