//! Commands that speak the packet protocol directly to the service port.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use gantry_core::wire::{Kind, Packet, StatusCode};
use gantry_gateway::{DeleteRequest, PushRequest, kinds};
use gantry_server::Client;

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

async fn connect(addr: &str) -> Result<Client> {
    Client::connect(addr)
        .await
        .with_context(|| format!("failed to connect to gantryd at {} (is it running?)", addr))
}

async fn request(addr: &str, packet: &Packet) -> Result<Packet> {
    let mut client = connect(addr).await?;
    client
        .request(packet, REPLY_TIMEOUT)
        .await
        .with_context(|| format!("no reply to {} request", kinds::name(packet.kind())))
}

async fn expect_state(addr: &str, packet: &Packet) -> Result<StatusCode> {
    let reply = request(addr, packet).await?;
    StatusCode::from_body(reply.body()).context("reply carried no status code")
}

/// Parse `key=value` arguments.
fn parse_pairs<'a>(args: &[&'a str]) -> Result<Vec<(&'a str, &'a str)>> {
    args.iter()
        .map(|arg| {
            arg.split_once('=')
                .with_context(|| format!("expected key=value, got {arg:?}"))
        })
        .collect()
}

pub async fn cmd_delete(addr: &str, job: &str, labels: &[&str]) -> Result<()> {
    let labels: BTreeMap<String, String> = parse_pairs(labels)?
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let packet = DeleteRequest {
        job: job.to_string(),
        labels,
    }
    .to_packet()?;

    match expect_state(addr, &packet).await? {
        StatusCode::Success => println!("✓ Deleted group for job {job}"),
        StatusCode::Failed => bail!("delete rejected for job {job}"),
    }
    Ok(())
}

pub async fn cmd_push(addr: &str, job: &str, metrics: &[&str]) -> Result<()> {
    let mut values = BTreeMap::new();
    for (name, raw) in parse_pairs(metrics)? {
        let value: f64 = raw
            .parse()
            .with_context(|| format!("metric {name} has non-numeric value {raw:?}"))?;
        values.insert(name.to_string(), value);
    }
    if values.is_empty() {
        bail!("push needs at least one metric=value");
    }
    let count = values.len();
    let packet = PushRequest {
        job: job.to_string(),
        labels: BTreeMap::new(),
        metrics: values,
    }
    .to_packet()?;

    match expect_state(addr, &packet).await? {
        StatusCode::Success => println!("✓ Pushed {count} metric(s) for job {job}"),
        StatusCode::Failed => bail!("push rejected for job {job}"),
    }
    Ok(())
}

pub async fn cmd_probe(addr: &str, kind: Kind) -> Result<()> {
    let code = expect_state(addr, &Packet::new(kind, Vec::<u8>::new())).await?;
    let name = kinds::name(kind);
    match code {
        StatusCode::Success => println!("✓ {name}"),
        StatusCode::Failed => bail!("not {name}"),
    }
    Ok(())
}

pub async fn cmd_info(addr: &str) -> Result<()> {
    let reply = request(addr, &Packet::new(kinds::STATUS, Vec::<u8>::new())).await?;
    let info: BTreeMap<String, String> =
        serde_json::from_slice(reply.body()).context("failed to parse status reply")?;

    println!("═══════════════════════════════════════");
    println!("  Gantry Build Info");
    println!("═══════════════════════════════════════");
    for (key, value) in &info {
        println!("  {:<11}: {}", key, value);
    }
    Ok(())
}

/// Print every packet the server sends until the connection drops.
pub async fn cmd_watch(addr: &str) -> Result<()> {
    let mut client = connect(addr).await?;
    println!("Watching {addr} (ctrl-c to stop)");
    loop {
        let packet = client.recv().await.context("connection lost")?;
        println!(
            "  {} {:<9} {} bytes",
            packet.id(),
            kinds::name(packet.kind()),
            packet.body().len()
        );
    }
}
