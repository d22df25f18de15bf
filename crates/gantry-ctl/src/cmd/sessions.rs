//! Session management commands.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, delete_json, get_json};
use super::status::StatusResponse;

pub async fn cmd_sessions(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    if resp.sessions.is_empty() {
        println!("No active sessions.");
        return Ok(());
    }

    println!("  Sessions ({}):", resp.sessions.len());
    for s in &resp.sessions {
        println!("  ┌─ {}", s.session_id);
        println!("  │  peer   : {}", s.peer);
        if let Some(uid) = &s.user_id {
            println!("  │  user   : {}", uid);
        }
        println!("  └─ uptime : {}s", s.established_secs);
    }
    Ok(())
}

pub async fn cmd_session_drop(port: u16, session_id: &str) -> Result<()> {
    #[derive(Deserialize)]
    struct DropResponse {
        session_id: String,
        dropped: bool,
    }

    let resp: DropResponse =
        delete_json(&format!("{}/sessions/{}", base_url(port), session_id)).await?;

    if resp.dropped {
        println!("✓ Session dropped: {}", resp.session_id);
    } else {
        println!("Session not found: {}", session_id);
    }
    Ok(())
}

pub async fn cmd_session_inspect(port: u16, session_id: &str) -> Result<()> {
    #[derive(Deserialize)]
    struct InspectResponse {
        session_id: String,
        peer_addr: String,
        user_id: Option<String>,
        uptime_secs: u64,
        closed: bool,
    }

    let resp: InspectResponse =
        get_json(&format!("{}/sessions/{}", base_url(port), session_id)).await?;

    println!("═══════════════════════════════════════");
    println!("  Session Details");
    println!("═══════════════════════════════════════");
    println!("  ID     : {}", resp.session_id);
    println!("  Peer   : {}", resp.peer_addr);
    println!("  User   : {}", resp.user_id.as_deref().unwrap_or("-"));
    println!("  Uptime : {}s", resp.uptime_secs);
    println!("  Closed : {}", resp.closed);
    Ok(())
}
