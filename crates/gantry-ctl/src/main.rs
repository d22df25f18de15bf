//! gantry-ctl — command-line interface for the Gantry daemon.

mod cmd;

use anyhow::{Context, Result};

use cmd::{sessions, status, wire};
use gantry_gateway::kinds;

const DEFAULT_ADDR: &str = "127.0.0.1:9092";
const DEFAULT_PORT: u16 = 9093;

fn print_usage() {
    println!("Usage: gantry-ctl [--addr <host:port>] [--port <port>] <command>");
    println!();
    println!("Packet commands (service port):");
    println!("  delete <job> [label=value..]   Delete a metric group");
    println!("  push <job> <metric=value>..    Push metric values");
    println!("  healthy                        Ask whether the gateway is healthy");
    println!("  ready                          Ask whether the gateway is ready");
    println!("  info                           Show build info");
    println!("  watch                          Print packets sent by the server");
    println!();
    println!("API commands (status port):");
    println!("  status                         Show service state");
    println!("  sessions                       List connected sessions");
    println!("  session <id>                   Inspect a session");
    println!("  session drop <id>              Close a session");
    println!("  handlers                       Show handler call counters");
    println!("  groups                         List stored metric groups");
    println!();
    println!("Options:");
    println!("  --addr <host:port>   Service address (default: {})", DEFAULT_ADDR);
    println!("  --port <port>        API port (default: {})", DEFAULT_PORT);
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut addr = DEFAULT_ADDR.to_string();
    let mut port = DEFAULT_PORT;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                i += 1;
                port = args
                    .get(i)
                    .context("--port requires a value")?
                    .parse()
                    .context("--port must be a number")?;
            }
            "--addr" => {
                i += 1;
                addr = args.get(i).context("--addr requires a value")?.clone();
            }
            other => remaining.push(other),
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["delete", job, labels @ ..] => wire::cmd_delete(&addr, job, labels).await,
        ["push", job, metrics @ ..] => wire::cmd_push(&addr, job, metrics).await,
        ["healthy"] => wire::cmd_probe(&addr, kinds::HEALTHY).await,
        ["ready"] => wire::cmd_probe(&addr, kinds::READY).await,
        ["info"] => wire::cmd_info(&addr).await,
        ["watch"] => wire::cmd_watch(&addr).await,
        ["status"] | [] => status::cmd_status(port).await,
        ["sessions"] => sessions::cmd_sessions(port).await,
        ["session", "drop", id] => sessions::cmd_session_drop(port, id).await,
        ["session", id] => sessions::cmd_session_inspect(port, id).await,
        ["handlers"] => status::cmd_handlers(port).await,
        ["groups"] => status::cmd_groups(port).await,
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
