//! Per-profile device commands: list, show, connect, disconnect, policy.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use super::http::{base_url, get_json, post_json, post_json_body};

#[derive(Deserialize)]
struct DevicesResponse {
    profile: String,
    devices: Vec<DeviceInfo>,
}

#[derive(Deserialize)]
struct DeviceInfo {
    peer: String,
    state: String,
    policy: String,
    bond: String,
}

#[derive(Deserialize)]
pub(crate) struct CommandResponse {
    pub profile: String,
    pub peer: String,
    pub accepted: bool,
    pub state: String,
}

#[derive(Serialize)]
struct PolicyRequest {
    policy: String,
}

pub(crate) fn device_url(port: u16, profile: &str, addr: &str) -> String {
    format!("{}/profiles/{}/devices/{}", base_url(port), profile, addr)
}

pub(crate) fn print_command(action: &str, resp: &CommandResponse) {
    if resp.accepted {
        println!("{} {} on {}: now {}", action, resp.peer, resp.profile, resp.state);
    } else {
        println!(
            "{} {} on {}: refused (state {})",
            action, resp.peer, resp.profile, resp.state
        );
    }
}

pub async fn cmd_devices(port: u16, profile: &str, states: Option<&str>) -> Result<()> {
    let mut url = format!("{}/profiles/{}/devices", base_url(port), profile);
    if let Some(states) = states {
        url.push_str(&format!("?state={}", states));
    }
    let resp: DevicesResponse = get_json(&url).await?;

    if resp.devices.is_empty() {
        println!("No devices tracked by {}.", resp.profile);
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  {} Devices ({})", resp.profile, resp.devices.len());
    println!("═══════════════════════════════════════");
    for d in &resp.devices {
        println!("  ┌─ {}", d.peer);
        println!("  │  state  : {}", d.state);
        println!("  │  policy : {}", d.policy);
        println!("  └─ bond   : {}", d.bond);
    }

    Ok(())
}

pub async fn cmd_device(port: u16, profile: &str, addr: &str) -> Result<()> {
    let d: DeviceInfo = get_json(&device_url(port, profile, addr)).await?;
    println!("{}  state={} policy={} bond={}", d.peer, d.state, d.policy, d.bond);
    Ok(())
}

pub async fn cmd_connect(port: u16, profile: &str, addr: &str) -> Result<()> {
    let url = format!("{}/connect", device_url(port, profile, addr));
    let resp: CommandResponse = post_json(&url).await?;
    print_command("connect", &resp);
    Ok(())
}

pub async fn cmd_disconnect(port: u16, profile: &str, addr: &str) -> Result<()> {
    let url = format!("{}/disconnect", device_url(port, profile, addr));
    let resp: CommandResponse = post_json(&url).await?;
    print_command("disconnect", &resp);
    Ok(())
}

pub async fn cmd_policy(port: u16, profile: &str, addr: &str, policy: &str) -> Result<()> {
    let policy = match policy {
        "allow" | "allowed" => "allowed",
        "forbid" | "forbidden" => "forbidden",
        "unknown" | "clear" => "unknown",
        other => bail!("unknown policy {:?} (allowed, forbidden, unknown)", other),
    };
    let url = format!("{}/policy", device_url(port, profile, addr));
    let req = PolicyRequest {
        policy: policy.to_string(),
    };
    let d: DeviceInfo = post_json_body(&url, &req).await?;
    println!("{}  policy={} state={}", d.peer, d.policy, d.state);
    Ok(())
}
