//! Storebridge CLI - terminal host for the storage inspection relay.
//!
//! This is the main binary entry point. See the `storebridge` library for
//! the relay itself. The binary plays the panel's role: it prints the
//! rendered snapshot on every push from the app and turns stdin lines
//! (`get`, `set <key> <value>`, `del <key>`, `quit`) into relay commands.

use anyhow::Result;
use clap::Parser;
use storebridge::{panel, Relay};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Live key/value storage inspector for a connected mobile app.
#[derive(Debug, Parser)]
#[command(name = "storebridge", version)]
struct Args {
    /// Port the app's storage client connects to.
    #[arg(long, default_value_t = 8990)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut relay = Relay::new();
    let handle = relay.activate(args.port).await?;
    println!("storebridge listening on {}", handle.local_addr());
    println!("commands: get | set <key> <value> | del <key> | quit");

    // Print the table on every snapshot push from the app.
    let mut snapshots = handle.snapshots();
    tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            println!("{}", panel::render_snapshot(&snapshot));
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                match line? {
                    None => break, // stdin closed
                    Some(line) if line.trim() == "quit" => break,
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => match panel::parse_panel_line(&line) {
                        Some(command) => handle.send_command(command),
                        None => println!("unrecognized command: {line}"),
                    },
                }
            }
        }
    }

    relay.deactivate().await;
    Ok(())
}
