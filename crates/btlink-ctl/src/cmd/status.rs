//! Daemon status, dump and shutdown commands.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json, get_text, post_json};

#[derive(Deserialize)]
struct StatusResponse {
    uptime_secs: u64,
    profiles: Vec<ProfileStatus>,
    bonds: Vec<BondInfo>,
    subscribers: usize,
}

#[derive(Deserialize)]
struct ProfileStatus {
    name: String,
    running: bool,
    devices: usize,
    connected: Vec<String>,
}

#[derive(Deserialize)]
struct BondInfo {
    peer: String,
    state: String,
}

#[derive(Deserialize)]
struct ShutdownResponse {
    message: String,
}

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  btlinkd Status");
    println!("═══════════════════════════════════════");
    println!("  Uptime           : {}s", resp.uptime_secs);
    println!("  Event subscribers: {}", resp.subscribers);
    println!("  Bond entries     : {}", resp.bonds.len());

    println!("\n  Profiles:");
    for p in &resp.profiles {
        let running = if p.running { "running" } else { "stopped" };
        println!("  ┌─ {} ({})", p.name, running);
        println!("  │  devices   : {}", p.devices);
        if p.connected.is_empty() {
            println!("  └─ connected : none");
        } else {
            println!("  └─ connected : {}", p.connected.join(", "));
        }
    }

    if !resp.bonds.is_empty() {
        println!("\n  Bonds:");
        for b in &resp.bonds {
            println!("    {}  {}", b.peer, b.state);
        }
    }

    Ok(())
}

pub async fn cmd_dump(port: u16) -> Result<()> {
    let dump = get_text(&format!("{}/dump", base_url(port))).await?;
    print!("{}", dump);
    Ok(())
}

pub async fn cmd_shutdown(port: u16) -> Result<()> {
    let resp: ShutdownResponse = post_json(&format!("{}/daemon/shutdown", base_url(port))).await?;
    println!("{}", resp.message);
    Ok(())
}
