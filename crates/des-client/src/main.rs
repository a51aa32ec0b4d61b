// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! DES client CLI.
//!
//! # Usage
//!
//! ```bash
//! # Host the response listener until Ctrl+C
//! des-client listen --bind 0.0.0.0:8765
//!
//! # Probe for a contract and print what answers within 3 seconds
//! des-client probe --contract urn:contract:weather --wait 3
//!
//! # Naked probe (every service of every responder), JSON responses
//! des-client probe --json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use des::net::local_host_address;
use des::transport::{MulticastSettings, MulticastTransport};
use des::wire::json::services_to_json;
use des::{DiscoveryClient, PayloadType, ProbeBuilder};
use des_client::{ListenerHandle, ListenerState, PROBE_RESPONSE_PATH};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// DES discovery client
#[derive(Parser, Debug)]
#[command(name = "des-client")]
#[command(about = "DES client - sends discovery probes and collects responses")]
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
    /// Run the response listener until Ctrl+C
    Listen {
        /// Listen address
        #[arg(short, long, default_value = "0.0.0.0:8765")]
        bind: SocketAddr,
    },

    /// Send a probe and print the services that answer
    Probe(ProbeArgs),
}

#[derive(clap::Args, Debug)]
struct ProbeArgs {
    /// Listen address for responses
    #[arg(short, long, default_value = "0.0.0.0:8765")]
    bind: SocketAddr,

    /// Base URL responders should POST to (defaults to this host's address)
    #[arg(long)]
    advertise: Option<String>,

    /// Service contract ids to look for (none: naked probe)
    #[arg(short, long, value_delimiter = ',')]
    contract: Vec<String>,

    /// Service instance ids to look for
    #[arg(short = 'n', long, value_delimiter = ',')]
    instance: Vec<String>,

    /// Ask for JSON responses instead of XML
    #[arg(long)]
    json: bool,

    /// Multicast group
    #[arg(long, default_value = "239.255.90.1")]
    group: Ipv4Addr,

    /// Multicast port
    #[arg(long, default_value = "21000")]
    port: u16,

    /// Network interface name or IPv4 address
    #[arg(short, long)]
    interface: Option<String>,

    /// Multicast TTL of the probe
    #[arg(long, default_value = "1")]
    hop_limit: u8,

    /// Copies of each probe piece to send
    #[arg(long, default_value = "3")]
    copies: usize,

    /// Seconds to wait for responses
    #[arg(short, long, default_value = "3")]
    wait: u64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Listen { bind } => cmd_listen(bind),
        Commands::Probe(args) => cmd_probe(&args),
    }
}

fn cmd_listen(bind: SocketAddr) -> Result<()> {
    let mut listener = ListenerHandle::spawn(bind, ListenerState::new())
        .with_context(|| format!("binding {}", bind))?;
    println!("Listening on {}{}", listener.local_addr(), PROBE_RESPONSE_PATH);
    println!("Press Ctrl+C to stop...");

    let (stop_tx, stop_rx) = channel::<()>();
    ctrlc::set_handler(move || {
        tracing::info!("Received Ctrl+C, shutting down...");
        let _ = stop_tx.send(());
    })
    .context("installing Ctrl+C handler")?;
    let _ = stop_rx.recv();

    listener.shutdown();
    Ok(())
}

/// Base URL responders can reach this listener at.
fn advertised_base(args: &ProbeArgs, listener: &ListenerHandle) -> Result<String> {
    if let Some(ref base) = args.advertise {
        return Ok(base.trim_end_matches('/').to_string());
    }
    let host = match listener.local_addr().ip() {
        ip if !ip.is_unspecified() => ip.to_string(),
        _ => local_host_address()
            .context("cannot determine this host's address, use --advertise")?
            .to_string(),
    };
    Ok(listener.base_url(&host))
}

fn cmd_probe(args: &ProbeArgs) -> Result<()> {
    let mut listener = ListenerHandle::spawn(args.bind, ListenerState::new())
        .with_context(|| format!("binding {}", args.bind))?;
    let respond_to = format!("{}{}", advertised_base(args, &listener)?, PROBE_RESPONSE_PATH);

    let probe = ProbeBuilder::new()
        .respond_to("des-client", respond_to.as_str())
        .payload_type(if args.json {
            PayloadType::Json
        } else {
            PayloadType::Xml
        })
        .hop_limit(args.hop_limit)
        .service_contract_ids(args.contract.iter().cloned())
        .service_instance_ids(args.instance.iter().cloned())
        .build()?;

    let transport = MulticastTransport::open(MulticastSettings {
        group: args.group,
        port: args.port,
        interface: args.interface.clone(),
        ..Default::default()
    })?;
    let client = DiscoveryClient::new(Arc::new(transport));
    let sent = client.send(&probe, args.copies)?;
    println!(
        "Probe {} sent ({} messages), responses to {}",
        probe.probe_id, sent, respond_to
    );

    std::thread::sleep(Duration::from_secs(args.wait));
    let services = listener.cache().snapshot();
    listener.shutdown();

    println!("{} services found", services.len());
    println!("{}", serde_json::to_string_pretty(&services_to_json(&services))?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_args() {
        let cli = Cli::try_parse_from([
            "des-client",
            "probe",
            "--contract",
            "urn:a,urn:b",
            "--json",
            "--wait",
            "1",
        ])
        .unwrap();
        let Commands::Probe(args) = cli.command else {
            panic!("expected probe");
        };
        assert_eq!(args.contract, vec!["urn:a", "urn:b"]);
        assert!(args.instance.is_empty());
        assert!(args.json);
        assert_eq!(args.copies, 3);
        assert_eq!(args.group, Ipv4Addr::new(239, 255, 90, 1));
    }

    #[test]
    fn test_advertised_base() {
        let cli = Cli::try_parse_from([
            "des-client",
            "probe",
            "--bind",
            "127.0.0.1:0",
            "--advertise",
            "http://gw.example:9000/",
        ])
        .unwrap();
        let Commands::Probe(args) = cli.command else {
            panic!("expected probe");
        };
        let listener = ListenerHandle::spawn(args.bind, ListenerState::new()).unwrap();
        assert_eq!(
            advertised_base(&args, &listener).unwrap(),
            "http://gw.example:9000"
        );

        let bound = ProbeArgs {
            advertise: None,
            ..args
        };
        let base = advertised_base(&bound, &listener).unwrap();
        assert_eq!(base, format!("http://127.0.0.1:{}", listener.local_addr().port()));
    }
}
