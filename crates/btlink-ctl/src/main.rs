//! btlink-ctl: command-line interface for the btlink daemon.

use anyhow::{Context, Result};

mod cmd;

use cmd::{apps, devices, native, status};

const DEFAULT_PORT: u16 = 9101;

fn print_usage() {
    println!("Usage: btlink-ctl [--port <port>] <command>");
    println!();
    println!("Commands:");
    println!("  status                                  Show profiles, bonds and subscribers");
    println!("  dump                                    Print the diagnostic dump");
    println!("  apps                                    List event subscribers");
    println!("  devices <profile> [<state,...>]         List devices a profile tracks");
    println!("  device <profile> <addr>                 Show one device");
    println!("  connect <profile> <addr>                Request a connection");
    println!("  disconnect <profile> <addr>             Request a disconnection");
    println!("  policy <profile> <addr> <policy>        Set allowed | forbidden | unknown");
    println!("  bond <addr> <state>                     Set bonded | bonding | none");
    println!("  incoming <profile> <addr>               Simulate a remote-initiated connect");
    println!("  drop <profile> <addr>                   Simulate a lost link");
    println!("  data <profile> <addr> <hex>             Simulate profile data from the remote");
    println!("  shutdown                                Stop the daemon");
    println!();
    println!("Options:");
    println!("  --port <port>   API port (default: {})", DEFAULT_PORT);
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --port option
    let mut port = DEFAULT_PORT;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            port = args
                .get(i)
                .context("--port requires a value")?
                .parse()
                .context("--port must be a number")?;
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["status"] | [] => status::cmd_status(port).await,
        ["dump"] => status::cmd_dump(port).await,
        ["shutdown"] => status::cmd_shutdown(port).await,
        ["apps"] => apps::cmd_apps(port).await,
        ["devices", profile] => devices::cmd_devices(port, profile, None).await,
        ["devices", profile, states] => devices::cmd_devices(port, profile, Some(*states)).await,
        ["device", profile, addr] => devices::cmd_device(port, profile, addr).await,
        ["connect", profile, addr] => devices::cmd_connect(port, profile, addr).await,
        ["disconnect", profile, addr] => devices::cmd_disconnect(port, profile, addr).await,
        ["policy", profile, addr, policy] => devices::cmd_policy(port, profile, addr, policy).await,
        ["bond", addr, state] => native::cmd_bond(port, addr, state).await,
        ["incoming", profile, addr] => native::cmd_incoming(port, profile, addr).await,
        ["drop", profile, addr] => native::cmd_drop(port, profile, addr).await,
        ["data", profile, addr, payload] => native::cmd_data(port, profile, addr, payload).await,
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
