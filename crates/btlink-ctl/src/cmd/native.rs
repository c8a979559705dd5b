//! Commands that play the controller's part: bonding and remote events.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use super::devices::{CommandResponse, print_command};
use super::http::{base_url, post_json, post_json_body};

#[derive(Serialize)]
struct BondRequest {
    state: String,
}

#[derive(Deserialize)]
struct BondResponse {
    peer: String,
    state: String,
    profiles_notified: usize,
}

#[derive(Serialize)]
struct DataRequest {
    payload: String,
}

#[derive(Deserialize)]
struct DataResponse {
    peer: String,
    bytes: usize,
}

fn native_url(port: u16, profile: &str, addr: &str, what: &str) -> String {
    format!("{}/native/{}/{}/{}", base_url(port), profile, addr, what)
}

pub async fn cmd_bond(port: u16, addr: &str, state: &str) -> Result<()> {
    let state = match state {
        "bonded" | "bonding" | "none" => state,
        "unbond" => "none",
        other => bail!("unknown bond state {:?} (bonded, bonding, none)", other),
    };
    let req = BondRequest {
        state: state.to_string(),
    };
    let resp: BondResponse = post_json_body(&format!("{}/bond/{}", base_url(port), addr), &req).await?;
    println!(
        "{} is now {} ({} profiles notified)",
        resp.peer, resp.state, resp.profiles_notified
    );
    Ok(())
}

pub async fn cmd_incoming(port: u16, profile: &str, addr: &str) -> Result<()> {
    let resp: CommandResponse = post_json(&native_url(port, profile, addr, "incoming")).await?;
    print_command("incoming", &resp);
    Ok(())
}

pub async fn cmd_drop(port: u16, profile: &str, addr: &str) -> Result<()> {
    let resp: CommandResponse = post_json(&native_url(port, profile, addr, "drop")).await?;
    print_command("drop", &resp);
    Ok(())
}

pub async fn cmd_data(port: u16, profile: &str, addr: &str, payload: &str) -> Result<()> {
    let req = DataRequest {
        payload: payload.to_string(),
    };
    let resp: DataResponse = post_json_body(&native_url(port, profile, addr, "data"), &req).await?;
    println!("delivered {} bytes from {}", resp.bytes, resp.peer);
    Ok(())
}
