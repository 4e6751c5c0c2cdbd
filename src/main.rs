//! Interactive host/client over a websocket relay
//!
//! ```bash
//! rtc-relay --relay ws://127.0.0.1:8000/ws
//! > host
//! > msg hello everyone
//!
//! rtc-relay --config relay.toml
//! > client 5f1c
//! > msg hi host
//! ```

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use rtc_relay::{logger, ActiveRole, Config, SignalingNode, WebRtcEngine};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file
    #[arg(short, long, env = "RTC_RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Relay websocket URL, overrides the config file
    #[arg(short, long, env = "RTC_RELAY_URL")]
    relay: Option<String>,

    /// trace, debug, info, warn or error; RUST_LOG wins when set
    #[arg(long)]
    log_level: Option<String>,
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(relay) = &args.relay {
        config.relay_url = relay.clone();
    }
    if let Some(level) = &args.log_level {
        anyhow::ensure!(logger::level_valid(level), "invalid log level: {level}");
        config.log_level = level.clone();
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn print_events(node: &SignalingNode) {
    let events = node.events();
    let is_host = matches!(node.role(), ActiveRole::Host(_));

    events
        .room_created
        .subscribe(|room_id| println!("Room created: {room_id}"));
    events
        .room_joined
        .subscribe(|host| println!("Joined room, host is {host}"));
    events
        .peer_joined
        .subscribe(|peer| println!("Peer joined: {peer}"));
    events
        .channel_open
        .subscribe(|peer| println!("Channel open with {peer}"));
    events.message.subscribe(move |msg| {
        if is_host {
            println!("[FROM {}] {}", msg.peer_id, msg.text());
        } else {
            println!("[HOST] {}", msg.text());
        }
    });
    events
        .relay_disconnected
        .subscribe(|reason| println!("Relay disconnected ({reason}), use 'reconnect'"));
    events.errors.subscribe(|e| {
        if e.is_relay_failure() {
            eprintln!("Error: {e} (relay down? try 'reconnect')");
        } else {
            eprintln!("Error: {e}");
        }
    });
}

fn help() {
    println!("Commands:");
    println!("  host             create a room and accept peers");
    println!("  client <room>    join a room");
    println!("  msg <text>       send to all peers (host) or to the host (client)");
    println!("  peers            list peers and channel states");
    println!("  reconnect        reconnect to the relay");
    println!("  exit             shut down and quit");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    logger::init(&config.log_level);

    let engine = Arc::new(WebRtcEngine::new(&config.ice_servers));
    let mut node: Option<SignalingNode> = None;

    help();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();

        match cmd {
            "" => {}
            "host" | "client" => {
                if node.is_some() {
                    println!("A role is already running in this process");
                    continue;
                }
                let candidate = if cmd == "host" {
                    SignalingNode::initiator(config.clone(), engine.clone())
                } else if rest.is_empty() {
                    println!("Usage: client <room_id>");
                    continue;
                } else {
                    SignalingNode::responder(config.clone(), engine.clone(), rest)
                };
                print_events(&candidate);
                match candidate.start().await {
                    Ok(()) => node = Some(candidate),
                    Err(e) => eprintln!("Failed to start {cmd}: {e}"),
                }
            }
            "msg" => {
                let Some(node) = &node else {
                    println!("Start 'host' or 'client <room>' first");
                    continue;
                };
                match node.role() {
                    ActiveRole::Host(host) if host.peer_count() == 0 => println!("no peers"),
                    _ => match node.broadcast(rest).await {
                        Ok(0) => println!("No open channel yet"),
                        Ok(n) => println!("Sent to {n} peer(s)"),
                        Err(e) => eprintln!("Send failed: {e}"),
                    },
                }
            }
            "peers" => match &node {
                Some(node) => {
                    let peers = node.peers();
                    if peers.is_empty() {
                        println!("no peers");
                    }
                    let now = Utc::now();
                    for peer in peers {
                        println!(
                            "{}  {}  {}s",
                            peer.peer_id,
                            peer.channel,
                            peer.age_secs(now)
                        );
                    }
                }
                None => println!("no peers"),
            },
            "reconnect" => match &node {
                Some(node) => match node.reconnect().await {
                    Ok(()) => println!("Reconnected"),
                    Err(e) => eprintln!("Reconnect failed: {e}"),
                },
                None => println!("Nothing to reconnect"),
            },
            "help" => help(),
            "exit" | "quit" => break,
            other => println!("Unknown command: {other}"),
        }
    }

    if let Some(node) = node {
        node.shutdown().await;
    }
    Ok(())
}
