// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! DES responder daemon.
//!
//! # Usage
//!
//! ```bash
//! # Answer probes on the default multicast group from a JSON registry
//! des-responder run --registry services.json
//!
//! # Using a configuration file
//! des-responder run --config responder.toml
//!
//! # Write an example configuration
//! des-responder gen-config --output responder.toml
//!
//! # Check a configuration file
//! des-responder validate --config responder.toml
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use des::config::{DeliveryConfig, MonitorConfig};
use des::responder::ResponderStatsSnapshot;
use des::{DeliveryPolicy, HandlerRegistry, PluginSpec, Responder, ResponderConfig, TransportRegistry};
use std::path::PathBuf;
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// DES responder daemon
#[derive(Parser, Debug)]
#[command(name = "des-responder")]
#[command(about = "DES responder - answers discovery probes from a service registry")]
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
    /// Run the responder until Ctrl+C
    Run(RunArgs),

    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "responder.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Configuration file path
    #[arg(short, long, conflicts_with = "registry")]
    config: Option<PathBuf>,

    /// JSON service registry (quick start without a configuration file)
    #[arg(short, long)]
    registry: Option<PathBuf>,

    /// Multicast group
    #[arg(long, default_value = "239.255.90.1", conflicts_with = "config")]
    group: String,

    /// Multicast port
    #[arg(long, default_value = "21000", conflicts_with = "config")]
    port: u16,

    /// Network interface name or IPv4 address
    #[arg(short, long, conflicts_with = "config")]
    interface: Option<String>,

    /// Ignore probes that carry no identifiers
    #[arg(long, conflicts_with = "config")]
    reject_naked: bool,

    /// Statistics reporting interval (seconds, 0 to disable)
    #[arg(long, default_value = "30")]
    stats_interval: u64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run(args) => cmd_run(&args),
        Commands::GenConfig { output } => cmd_gen_config(output),
        Commands::Validate { config } => cmd_validate(config),
    }
}

fn build_config(args: &RunArgs) -> Result<ResponderConfig> {
    if let Some(ref path) = args.config {
        return ResponderConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()));
    }

    let Some(ref registry) = args.registry else {
        bail!("missing --registry (or use --config)");
    };

    let mut multicast = PluginSpec::new("multicast")
        .with("group", args.group.as_str())
        .with("port", i64::from(args.port));
    if let Some(ref interface) = args.interface {
        multicast = multicast.with("interface", interface.as_str());
    }

    let mut config = ResponderConfig {
        reject_naked_probes: args.reject_naked,
        ..Default::default()
    };
    config.add_transport(multicast);
    config.add_handler(
        PluginSpec::new("service-registry").with("path", registry.to_string_lossy().into_owned()),
    );
    config.validate()?;
    Ok(config)
}

fn cmd_run(args: &RunArgs) -> Result<()> {
    let config = build_config(args)?;
    let responder = Responder::from_config(
        &config,
        &TransportRegistry::with_builtins(),
        &HandlerRegistry::with_builtins(),
    )
    .context("responder could not be created")?;

    println!("DES Responder v{}", env!("CARGO_PKG_VERSION"));
    println!("=====================================");
    for transport in responder.transports() {
        println!("Transport: {}", transport.describe());
    }
    println!();
    println!("Press Ctrl+C to stop...");

    responder.start()?;

    let (stop_tx, stop_rx) = channel::<()>();
    ctrlc::set_handler(move || {
        tracing::info!("Received Ctrl+C, shutting down...");
        let _ = stop_tx.send(());
    })
    .context("installing Ctrl+C handler")?;

    let tick = match args.stats_interval {
        0 => Duration::from_secs(3600),
        secs => Duration::from_secs(secs),
    };
    loop {
        match stop_rx.recv_timeout(tick) {
            Err(RecvTimeoutError::Timeout) => {
                if args.stats_interval > 0 {
                    print_stats(&responder.stats());
                }
            }
            _ => break,
        }
    }

    responder.shutdown();
    println!("\nFinal Statistics:");
    print_stats(&responder.stats());
    Ok(())
}

fn example_config() -> ResponderConfig {
    let mut config = ResponderConfig {
        pool_size: 8,
        queue_capacity: 256,
        monitor: MonitorConfig {
            enabled: true,
            ..Default::default()
        },
        delivery: DeliveryConfig {
            policy: DeliveryPolicy::Failover,
            timeout_ms: 5000,
        },
        ..Default::default()
    };
    config.add_transport(
        PluginSpec::new("multicast")
            .with("group", "239.255.90.1")
            .with("port", 21000i64)
            .with("max_payload_size", 8192i64),
    );
    config.add_handler(
        PluginSpec::new("service-registry")
            .with("path", "services.json")
            .with("reload_interval_secs", 30i64),
    );
    config
}

fn cmd_gen_config(output: PathBuf) -> Result<()> {
    let toml_str = toml::to_string_pretty(&example_config())?;

    let content = format!(
        r#"# DES Responder Configuration
# Generated by des-responder gen-config

{}
"#,
        toml_str
    );

    std::fs::write(&output, content)
        .with_context(|| format!("writing {}", output.display()))?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: PathBuf) -> Result<()> {
    match ResponderConfig::from_file(&config_path) {
        Ok(config) => {
            println!("Configuration valid!");
            println!();
            println!(
                "Workers: {} (queue {})",
                config.pool_size, config.queue_capacity
            );
            println!("Delivery: {:?}", config.delivery.policy);
            println!("Transports: {}", config.transports.len());
            for (i, spec) in config.transports.iter().enumerate() {
                println!("  [{}] {}", i, spec.kind);
            }
            println!("Handlers: {}", config.handlers.len());
            for (i, spec) in config.handlers.iter().enumerate() {
                println!("  [{}] {}", i, spec.kind);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_stats(stats: &ResponderStatsSnapshot) {
    println!("--- Responder Statistics ---");
    println!(
        "  probes: {} received, {} duplicate, {} naked-filtered, {} dispatched, {} rejected",
        stats.received, stats.duplicates, stats.naked_filtered, stats.dispatched, stats.rejected
    );
    println!(
        "  responses: {} sent, {} delivery failures",
        stats.responses_sent, stats.delivery_failures
    );
    println!(
        "  pool: {} active, {} queued, {} completed ({:.1} probes/s)",
        stats.pool.active, stats.pool.queued, stats.pool.completed, stats.pool.probes_per_second
    );
}
