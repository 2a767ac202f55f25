//! Hyperpub peer process
//!
//! Starts one node of the hypercube and reads driver commands from stdin.
//!
//! ## Usage
//!
//! ```bash
//! # Node 010 of a 3-cube, listening on 8002, dialing its neighbors
//! hyperpub 010 8002 --connect-neighbors --log-dir logs
//!
//! # Same node, issuing random operations every 2-5 seconds
//! hyperpub 010 8002 --connect-neighbors --auto
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use hyperpub_core::{DEFAULT_ADDRESS_WIDTH, PeerAddress, ValidationError};
use hyperpub_logging::{LogConfig, SubscriberBuilder};
use hyperpub_node::{AutomationConfig, HyperpubNode, NodeConfig, PullReport};

/// Hyperpub - hypercube publish/subscribe peer
#[derive(Parser)]
#[command(name = "hyperpub")]
#[command(about = "Peer node for a hypercube publish/subscribe overlay")]
#[command(version)]
struct Cli {
    /// Peer address as a bit string (e.g. 010)
    address: String,

    /// TCP port to listen on
    port: String,

    /// Interface to bind and to dial neighbors on
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Hypercube dimension (address width)
    #[arg(long, default_value_t = DEFAULT_ADDRESS_WIDTH)]
    dimensions: usize,

    /// Issue random create/publish/subscribe operations
    #[arg(long)]
    auto: bool,

    /// Dial every hypercube neighbor on startup
    #[arg(long)]
    connect_neighbors: bool,

    /// Port of the all-zero node; neighbor ports are offset by address value
    #[arg(long, default_value_t = 8000)]
    base_port: u16,

    /// Directory for the per-peer log file
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Default log level (RUST_LOG overrides)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Human-readable console logs instead of JSONL
    #[arg(long)]
    pretty: bool,
}

/// One line of driver input
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Create(String),
    Delete(String),
    Subscribe(String),
    Unsubscribe(String),
    Publish { topic: String, message: String },
    Pull,
    Topics,
    Request,
    Connect { peer: String, endpoint: String },
    Peers,
    Help,
    Quit,
}

const HELP: &str = "\
commands:
  create <topic>              create and subscribe
  delete <topic>              delete everywhere
  subscribe <topic>           subscribe to a known topic
  unsubscribe <topic>         drop a subscription
  publish <topic> <message>   publish to a subscribed topic
  pull                        print unread messages
  topics                      list known topics
  request                     ask the bootstrap node for topics
  connect <address> <host:port>
  peers                       list connected peers
  quit";

fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let topic = |usage: &str| {
        if rest.is_empty() || rest.contains(char::is_whitespace) {
            Err(format!("usage: {}", usage))
        } else {
            Ok(rest.to_string())
        }
    };

    match verb.to_ascii_lowercase().as_str() {
        "create" => topic("create <topic>").map(Command::Create),
        "delete" => topic("delete <topic>").map(Command::Delete),
        "subscribe" => topic("subscribe <topic>").map(Command::Subscribe),
        "unsubscribe" => topic("unsubscribe <topic>").map(Command::Unsubscribe),
        "publish" => match rest.split_once(char::is_whitespace) {
            Some((topic, message)) if !message.trim().is_empty() => Ok(Command::Publish {
                topic: topic.to_string(),
                message: message.trim().to_string(),
            }),
            _ => Err("usage: publish <topic> <message>".into()),
        },
        "pull" => Ok(Command::Pull),
        "topics" => Ok(Command::Topics),
        "request" => Ok(Command::Request),
        "connect" => match rest.split_whitespace().collect::<Vec<_>>().as_slice() {
            [peer, endpoint] => Ok(Command::Connect {
                peer: peer.to_string(),
                endpoint: endpoint.to_string(),
            }),
            _ => Err("usage: connect <address> <host:port>".into()),
        },
        "peers" => Ok(Command::Peers),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(format!("unknown command '{}', try 'help'", other)),
    }
}

fn parse_address(text: &str, dimensions: usize) -> Result<PeerAddress> {
    let address: PeerAddress = text
        .parse()
        .map_err(ValidationError::from)
        .with_context(|| format!("invalid address '{}'", text))?;
    if address.width() != dimensions {
        bail!(
            "address '{}' has {} bits, expected {}",
            text,
            address.width(),
            dimensions
        );
    }
    Ok(address)
}

fn parse_port(text: &str) -> Result<u16, ValidationError> {
    match text.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(ValidationError::InvalidPort(text.to_string())),
    }
}

/// Render drained messages, naming queues that had nothing unread
fn format_pull_report(report: &PullReport) -> Vec<String> {
    if report.topics.is_empty() {
        return vec!["no topic queues".to_string()];
    }
    let mut lines = Vec::new();
    for (topic, messages) in &report.topics {
        if messages.is_empty() {
            lines.push(format!("{} has no unread messages", topic));
        }
        for message in messages {
            lines.push(format!("[{}] {}", topic, message));
        }
    }
    lines
}

/// Run one command; returns `false` on quit
async fn execute(node: &HyperpubNode, command: Command) -> bool {
    let result = match command {
        Command::Create(topic) => node
            .create_topic(&topic)
            .await
            .map(|key| println!("created {} ({})", topic, key.short_hex())),
        Command::Delete(topic) => node
            .delete_topic(&topic)
            .await
            .map(|()| println!("deleted {}", topic)),
        Command::Subscribe(topic) => node
            .subscribe(&topic)
            .await
            .map(|()| println!("subscribed to {}", topic)),
        Command::Unsubscribe(topic) => node
            .unsubscribe(&topic)
            .map(|()| println!("unsubscribed from {}", topic)),
        Command::Publish { topic, message } => node
            .publish(&topic, &message)
            .await
            .map(|()| println!("published to {}", topic)),
        Command::Pull => {
            for line in format_pull_report(&node.pull_all()) {
                println!("{}", line);
            }
            Ok(())
        }
        Command::Topics => {
            for listing in node.list_topics() {
                let marker = if listing.subscribed { "*" } else { " " };
                println!("{} {}", marker, listing.name);
            }
            Ok(())
        }
        Command::Request => node
            .request_topics()
            .await
            .map(|_| println!("topic list requested")),
        Command::Connect { peer, endpoint } => match peer.parse::<PeerAddress>() {
            Ok(peer) => node
                .connect(peer, &endpoint)
                .await
                .map(|fresh| {
                    if fresh {
                        println!("connected to {}", peer);
                    } else {
                        println!("already connected to {}", peer);
                    }
                }),
            Err(e) => {
                println!("invalid address: {}", e);
                Ok(())
            }
        },
        Command::Peers => {
            let stats = node.connection_stats();
            println!(
                "{} peers ({} outbound, {} inbound): {:?}",
                stats.connected,
                stats.outbound,
                stats.inbound,
                node.connected_peers()
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
            );
            Ok(())
        }
        Command::Help => {
            println!("{}", HELP);
            Ok(())
        }
        Command::Quit => return false,
    };

    if let Err(e) = result {
        println!("error: {}", e);
    }
    true
}

async fn run_driver(node: &HyperpubNode, automated: bool) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                return Ok(());
            }
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    if automated {
                        // Keep running unattended until interrupted
                        tokio::signal::ctrl_c().await?;
                    }
                    return Ok(());
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Ok(command) => {
                        if !execute(node, command).await {
                            return Ok(());
                        }
                    }
                    Err(usage) => println!("{}", usage),
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let address = parse_address(&cli.address, cli.dimensions)?;
    let port = parse_port(&cli.port)?;
    let host: IpAddr = cli
        .host
        .parse()
        .map_err(|e| anyhow!("invalid host '{}': {}", cli.host, e))?;

    let log_config = match &cli.log_dir {
        Some(dir) => LogConfig::per_peer(dir, address),
        None => LogConfig::default(),
    };
    let _guard = SubscriberBuilder::new()
        .with_config(log_config)
        .with_level(cli.log_level.as_str())
        .with_pretty(cli.pretty || cli.log_dir.is_some())
        .init();

    let mut config = NodeConfig::new(address, SocketAddr::new(host, port));
    if cli.auto {
        config = config.with_automation(AutomationConfig::default());
    }

    let node = HyperpubNode::new(config)?;
    node.start().await?;
    info!(address = %address, port, "Peer running");

    if cli.connect_neighbors {
        let connected = node.connect_neighbors(&cli.host, cli.base_port).await?;
        if connected.is_empty() {
            warn!("No neighbors reachable yet");
        }
    }

    if !cli.auto {
        println!("{}", HELP);
    }
    let outcome = run_driver(&node, cli.auto).await;
    node.stop().await?;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("create T1"), Ok(Command::Create("T1".into())));
        assert_eq!(parse_command("  PULL "), Ok(Command::Pull));
        assert_eq!(
            parse_command("publish T1 hello there"),
            Ok(Command::Publish {
                topic: "T1".into(),
                message: "hello there".into()
            })
        );
        assert_eq!(
            parse_command("connect 001 127.0.0.1:8001"),
            Ok(Command::Connect {
                peer: "001".into(),
                endpoint: "127.0.0.1:8001".into()
            })
        );
    }

    #[test]
    fn test_parse_command_usage_errors() {
        assert!(parse_command("create").is_err());
        assert!(parse_command("create two words").is_err());
        assert!(parse_command("publish T1").is_err());
        assert!(parse_command("connect 001").is_err());
        assert!(parse_command("dance").is_err());
    }

    #[test]
    fn test_parse_address_checks_dimensions() {
        assert_eq!(parse_address("010", 3).unwrap().to_string(), "010");
        assert!(parse_address("0101", 3).is_err());
        assert!(parse_address("0x1", 3).is_err());
    }

    #[test]
    fn test_pull_report_lists_empty_queues() {
        let mut report = PullReport::default();
        report.topics.insert("T1".into(), vec!["a".into(), "b".into()]);
        report.topics.insert("T2".into(), Vec::new());

        assert_eq!(
            format_pull_report(&report),
            ["[T1] a", "[T1] b", "T2 has no unread messages"]
        );
        assert_eq!(
            format_pull_report(&PullReport::default()),
            ["no topic queues"]
        );
    }

    #[test]
    fn test_dimensions_default_to_address_width() {
        let cli = Cli::try_parse_from(["hyperpub", "010", "8002"]).unwrap();
        assert_eq!(cli.dimensions, DEFAULT_ADDRESS_WIDTH);
        assert_eq!(cli.base_port, 8000);
    }

    #[test]
    fn test_parse_port_range() {
        assert_eq!(parse_port("8000"), Ok(8000));
        assert!(parse_port("0").is_err());
        assert!(parse_port("65536").is_err());
        assert!(parse_port("http").is_err());
    }
}
