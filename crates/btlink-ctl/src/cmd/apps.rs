//! Event subscriber listing.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json};

#[derive(Deserialize)]
struct AppsResponse {
    apps: Vec<AppInfo>,
    recently_removed: Vec<Stats>,
}

#[derive(Deserialize)]
struct AppInfo {
    id: u32,
    uuid: String,
    name: String,
    stats: Stats,
}

#[derive(Deserialize)]
struct Stats {
    app_id: u32,
    name: String,
    starts: u64,
    stops: u64,
    registered_secs: u64,
}

pub async fn cmd_apps(port: u16) -> Result<()> {
    let resp: AppsResponse = get_json(&format!("{}/apps", base_url(port))).await?;

    if resp.apps.is_empty() {
        println!("No event subscribers.");
    } else {
        println!("═══════════════════════════════════════");
        println!("  Event Subscribers ({})", resp.apps.len());
        println!("═══════════════════════════════════════");
        for a in &resp.apps {
            println!("  ┌─ {} {}", a.id, a.name);
            println!("  │  uuid       : {}", a.uuid);
            println!("  └─ registered : {}s ago", a.stats.registered_secs);
        }
    }

    if !resp.recently_removed.is_empty() {
        println!("\n  Recently removed:");
        for s in &resp.recently_removed {
            println!(
                "    {} {}  starts={} stops={}",
                s.app_id, s.name, s.starts, s.stops
            );
        }
    }

    Ok(())
}
