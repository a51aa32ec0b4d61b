// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! DES multicast gateway relay CLI.
//!
//! # Usage
//!
//! ```bash
//! # Segment A: forward group traffic to the receiver over TCP
//! des-gateway send --group 239.255.90.1 --port 21000 --receiver 10.1.0.9:21001
//!
//! # Segment B: repeat everything received on TCP 21001 into the group
//! des-gateway receive --group 239.255.90.1 --port 21000 --listen-port 21001
//! ```

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use des_gateway::{
    GatewayReceiver, GatewaySender, ReceiverConfig, RelayStatsSnapshot, SenderConfig,
    DEFAULT_RELAY_TTL,
};
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::sync::mpsc::channel;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// DES multicast gateway relay
#[derive(Parser, Debug)]
#[command(name = "des-gateway")]
#[command(about = "DES multicast gateway relay - tunnels multicast between segments over TCP")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Join a group and forward its datagrams to a receiver over TCP
    Send {
        /// Multicast group to listen on
        #[arg(long)]
        group: Ipv4Addr,

        /// Multicast port
        #[arg(long)]
        port: u16,

        /// Network interface name or IPv4 address
        #[arg(short, long)]
        interface: Option<String>,

        /// Also relay datagrams sent from this host
        #[arg(long)]
        allow_loopback: bool,

        /// Receiver address (host:port)
        #[arg(long)]
        receiver: String,
    },

    /// Accept TCP connections and repeat their payload into a group
    Receive {
        /// Multicast group to repeat into
        #[arg(long)]
        group: Ipv4Addr,

        /// Multicast port
        #[arg(long)]
        port: u16,

        /// TCP port to listen on
        #[arg(long)]
        listen_port: u16,

        /// Network interface name or IPv4 address
        #[arg(short, long)]
        interface: Option<String>,

        /// Receive but do not repeat (diagnostics)
        #[arg(long)]
        no_repeat: bool,

        /// TTL of repeated datagrams
        #[arg(long, default_value_t = DEFAULT_RELAY_TTL)]
        ttl: u8,
    },
}

fn main() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            println!("{}", e.render());
            println!("{}", Cli::command().render_long_help());
            std::process::exit(2);
        }
    };

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let (stop_tx, stop_rx) = channel::<()>();
    ctrlc::set_handler(move || {
        tracing::info!("Received Ctrl+C, shutting down...");
        let _ = stop_tx.send(());
    })
    .context("installing Ctrl+C handler")?;

    let final_stats = match cli.command {
        Commands::Send {
            group,
            port,
            interface,
            allow_loopback,
            receiver,
        } => {
            let mut config = SenderConfig::new(group, port, resolve_receiver(&receiver)?);
            config.interface = interface;
            config.allow_loopback = allow_loopback;
            let mut sender = GatewaySender::start(config).context("gateway sender")?;
            println!("Press Ctrl+C to stop...");
            let _ = stop_rx.recv();
            sender.shutdown();
            sender.stats().snapshot()
        }
        Commands::Receive {
            group,
            port,
            listen_port,
            interface,
            no_repeat,
            ttl,
        } => {
            let mut config = ReceiverConfig::new(group, port, listen_port);
            config.interface = interface;
            config.no_repeat = no_repeat;
            config.relay_ttl = ttl;
            let mut receiver = GatewayReceiver::start(config).context("gateway receiver")?;
            println!("Press Ctrl+C to stop...");
            let _ = stop_rx.recv();
            receiver.shutdown();
            receiver.stats().snapshot()
        }
    };

    print_stats(&final_stats);
    Ok(())
}

fn resolve_receiver(raw: &str) -> Result<SocketAddr> {
    raw.to_socket_addrs()
        .with_context(|| format!("resolving receiver '{}'", raw))?
        .find(SocketAddr::is_ipv4)
        .or_else(|| raw.to_socket_addrs().ok().and_then(|mut it| it.next()))
        .ok_or_else(|| des_gateway::GatewayError::InvalidAddress(raw.to_string()).into())
}

fn print_stats(stats: &RelayStatsSnapshot) {
    println!("--- Relay Statistics ---");
    println!(
        "  {} received, {} relayed ({} bytes), {} looped back, {} failed",
        stats.received, stats.relayed, stats.bytes, stats.looped_back, stats.failed
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_requires_receiver() {
        let err = Cli::try_parse_from(["des-gateway", "send", "--group", "239.255.90.1", "--port", "21000"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_receive_defaults() {
        let cli = Cli::try_parse_from([
            "des-gateway",
            "receive",
            "--group",
            "239.255.90.1",
            "--port",
            "21000",
            "--listen-port",
            "21001",
        ])
        .unwrap();
        let Commands::Receive { ttl, no_repeat, .. } = cli.command else {
            panic!("expected receive");
        };
        assert_eq!(ttl, DEFAULT_RELAY_TTL);
        assert!(!no_repeat);
    }

    #[test]
    fn test_resolve_receiver() {
        let addr = resolve_receiver("127.0.0.1:21001").unwrap();
        assert_eq!(addr.port(), 21001);
        assert!(resolve_receiver("no-port-here").is_err());
    }
}
