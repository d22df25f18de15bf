//! Status commands served by the HTTP API.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json};

#[derive(Deserialize)]
pub struct StatusResponse {
    pub state: String,
    pub listen_addr: String,
    pub connections: usize,
    pub sessions: Vec<SessionInfo>,
    pub groups: usize,
    pub writes: u64,
    pub stop_reason: Option<String>,
}

#[derive(Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub peer: String,
    pub user_id: Option<String>,
    pub established_secs: u64,
}

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  Gantry Daemon Status");
    println!("═══════════════════════════════════════");
    println!("  State        : {}", resp.state);
    println!("  Listening on : {}", resp.listen_addr);
    println!("  Connections  : {}", resp.connections);
    println!("  Groups       : {}", resp.groups);
    println!("  Writes       : {}", resp.writes);
    if let Some(reason) = &resp.stop_reason {
        println!("  Stopped      : {}", reason);
    }
    Ok(())
}

#[derive(Deserialize)]
struct HandlersResponse {
    handlers: Vec<HandlerInfo>,
}

#[derive(Deserialize)]
struct HandlerInfo {
    name: String,
    calls: u64,
    errors: u64,
    total_ms: f64,
}

pub async fn cmd_handlers(port: u16) -> Result<()> {
    let resp: HandlersResponse = get_json(&format!("{}/handlers", base_url(port))).await?;

    if resp.handlers.is_empty() {
        println!("No handler calls recorded yet.");
        return Ok(());
    }

    println!("  {:<10} {:>8} {:>8} {:>10}", "handler", "calls", "errors", "avg ms");
    for h in &resp.handlers {
        let avg = if h.calls == 0 {
            0.0
        } else {
            h.total_ms / h.calls as f64
        };
        println!("  {:<10} {:>8} {:>8} {:>10.3}", h.name, h.calls, h.errors, avg);
    }
    Ok(())
}

#[derive(Deserialize)]
struct GroupInfo {
    labels: BTreeMap<String, String>,
    metrics: BTreeMap<String, f64>,
    last_write_secs: u64,
}

pub async fn cmd_groups(port: u16) -> Result<()> {
    let groups: Vec<GroupInfo> = get_json(&format!("{}/groups", base_url(port))).await?;

    if groups.is_empty() {
        println!("No metric groups stored.");
        return Ok(());
    }

    for g in &groups {
        let labels: Vec<String> = g.labels.iter().map(|(k, v)| format!("{k}={v}")).collect();
        println!("  ┌─ {{{}}}", labels.join(","));
        for (name, value) in &g.metrics {
            println!("  │  {name} = {value}");
        }
        println!("  └─ last write : {}", g.last_write_secs);
    }
    Ok(())
}
