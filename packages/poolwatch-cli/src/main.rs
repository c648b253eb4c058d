//! Poolwatch CLI - manage an IP address pool and track which addresses are in use
//!
//! This binary can:
//! - Add, remove and annotate pool addresses (single or last-octet ranges)
//! - Show the pool with per-category range summaries
//! - Run one reconciliation pass on demand
//! - Run as a daemon (for systemd integration)

mod daemon;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use poolwatch_core::config::{self, PoolwatchConfig};
use poolwatch_core::probe::SystemPing;
use poolwatch_core::store::JsonFileStore;
use poolwatch_core::{PoolEntry, PoolListing, PoolService, ReconciliationEngine, Usage};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "poolwatch")]
#[command(version)]
#[command(about = "Track which addresses of an IP pool are in use")]
#[command(long_about = "
Poolwatch keeps a pool of managed IPv4 addresses and reconciles ARP sweeps
and ICMP echo probes into a per-address \"in use\" flag.

Quick start:
  1. Add addresses:   poolwatch add 10.0.0.5-10.0.0.20 --category lab
  2. Check once:      poolwatch sweep
  3. Start daemon:    poolwatch daemon

Link-layer sweeps use arp-scan (sudo apt-get install arp-scan), which needs
raw socket access.
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Config file (default: ~/.config/poolwatch/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Pool data file, overriding config and environment
    #[arg(long, global = true)]
    pub data_file: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List every pool entry with the category summary
    #[command(alias = "ls")]
    List,

    /// Show only the per-category address ranges
    Summary,

    /// Add an address or a last-octet range (10.0.0.5-8 or 10.0.0.5-10.0.0.8)
    Add {
        spec: String,

        #[arg(short = 'g', long)]
        category: String,

        #[arg(short, long)]
        purpose: Option<String>,
    },

    /// Remove an entry by id
    #[command(alias = "rm")]
    Remove { id: Uuid },

    /// Set or clear (no text) the purpose of an entry
    Purpose { id: Uuid, text: Option<String> },

    /// Run one link-layer sweep and one echo sweep now
    Sweep,

    /// Run the reconciliation daemon in the foreground
    Daemon,

    /// Show configuration paths and settings
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("poolwatch={},poolwatch_core={}", log_level, log_level).into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = match cli.config {
        Some(ref path) => config::load_config_from(Some(path))?,
        None => config::load_config()?,
    };
    if let Some(ref data_file) = cli.data_file {
        config.data_file = data_file.clone();
    }

    match cli.command {
        Commands::List => cmd_list(&cli, &config).await,
        Commands::Summary => cmd_summary(&cli, &config).await,
        Commands::Add {
            ref spec,
            ref category,
            ref purpose,
        } => cmd_add(&cli, &config, spec, category, purpose.clone()).await,
        Commands::Remove { id } => cmd_remove(&cli, &config, id).await,
        Commands::Purpose { id, ref text } => cmd_purpose(&cli, &config, id, text.clone()).await,
        Commands::Sweep => cmd_sweep(&cli, &config).await,
        Commands::Daemon => daemon::run_daemon(config).await,
        Commands::Config => cmd_config(&cli, &config),
    }
}

async fn open_store(config: &PoolwatchConfig) -> Result<Arc<JsonFileStore>> {
    Ok(Arc::new(JsonFileStore::open(&config.data_file).await?))
}

/// Print the result of a mutating command, `{ok, error}` style in JSON mode.
fn report(cli: &Cli, result: poolwatch_core::Result<serde_json::Value>, success: &str) -> Result<()> {
    match (cli.format, result) {
        (OutputFormat::Text, Ok(_)) => {
            println!("{}", success);
            Ok(())
        }
        (OutputFormat::Text, Err(e)) => Err(e.into()),
        (OutputFormat::Json, Ok(data)) => {
            println!("{}", serde_json::json!({ "ok": true, "error": null, "data": data }));
            Ok(())
        }
        (OutputFormat::Json, Err(e)) => {
            println!("{}", serde_json::json!({ "ok": false, "error": e.to_string() }));
            std::process::exit(1);
        }
    }
}

fn usage_label(usage: Usage) -> &'static str {
    match usage {
        Usage::Unknown => "?",
        Usage::InUse => "in use",
        Usage::Free => "free",
    }
}

fn print_entry(entry: &PoolEntry) {
    let checked = entry
        .last_checked_at
        .map(|t| t.with_timezone(&chrono::Local).format("%y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "  {:15} {:12} {:7} {:14}  {}  {}",
        entry.address,
        entry.category,
        usage_label(entry.in_use),
        checked,
        entry.id,
        entry.purpose.as_deref().unwrap_or("")
    );
}

fn print_summary(listing: &PoolListing) {
    for summary in &listing.summary {
        println!("  {:12} {}", summary.category, summary.ranges.join(", "));
    }
}

async fn cmd_list(cli: &Cli, config: &PoolwatchConfig) -> Result<()> {
    let pool = PoolService::new(open_store(config).await?);
    let listing = pool.list().await?;

    match cli.format {
        OutputFormat::Text => {
            let in_use = listing.entries.iter().filter(|e| e.in_use == Usage::InUse).count();
            println!("{} addresses, {} in use:", listing.entries.len(), in_use);
            println!();
            for entry in &listing.entries {
                print_entry(entry);
            }
            println!();
            println!("Summary:");
            print_summary(&listing);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "ok": true,
                "ipPools": listing.entries,
                "summary": listing.summary,
            }));
        }
    }

    Ok(())
}

async fn cmd_summary(cli: &Cli, config: &PoolwatchConfig) -> Result<()> {
    let pool = PoolService::new(open_store(config).await?);
    let listing = pool.list().await?;

    match cli.format {
        OutputFormat::Text => print_summary(&listing),
        OutputFormat::Json => println!("{}", serde_json::to_string(&listing.summary)?),
    }

    Ok(())
}

async fn cmd_add(
    cli: &Cli,
    config: &PoolwatchConfig,
    spec: &str,
    category: &str,
    purpose: Option<String>,
) -> Result<()> {
    let pool = PoolService::new(open_store(config).await?);
    let result = pool.insert(spec, category, purpose).await;

    let message = match result {
        Ok(ref created) => format!("Added {} address(es) to '{}'", created.len(), category),
        Err(_) => String::new(),
    };
    report(cli, result.map(|created| serde_json::json!(created)), &message)
}

async fn cmd_remove(cli: &Cli, config: &PoolwatchConfig, id: Uuid) -> Result<()> {
    let pool = PoolService::new(open_store(config).await?);
    let result = pool.delete(id).await;
    report(cli, result.map(|_| serde_json::Value::Null), &format!("Removed {}", id))
}

async fn cmd_purpose(cli: &Cli, config: &PoolwatchConfig, id: Uuid, text: Option<String>) -> Result<()> {
    let pool = PoolService::new(open_store(config).await?);
    let cleared = text.as_deref().map(str::trim).unwrap_or("").is_empty();
    let result = pool.set_purpose(id, text).await;
    let message = if cleared {
        format!("Cleared purpose of {}", id)
    } else {
        format!("Updated purpose of {}", id)
    };
    report(cli, result.map(|_| serde_json::Value::Null), &message)
}

async fn cmd_sweep(cli: &Cli, config: &PoolwatchConfig) -> Result<()> {
    let store = open_store(config).await?;
    let engine = ReconciliationEngine::new(
        store,
        config.discovery.link_sweep(),
        Arc::new(SystemPing),
        config.engine,
    );

    // A failed link sweep still lets the echo sweep run, just unguarded
    let link = engine.run_link_sweep().await;
    if let Err(ref e) = link {
        tracing::warn!("Link-layer sweep failed: {}", e);
    }
    let echo = engine.run_echo_sweep().await?;

    match cli.format {
        OutputFormat::Text => {
            match link {
                Ok(ref report) => println!(
                    "Link sweep: {} promoted, {} confirmed, {} not in pool ({:.1}s)",
                    report.promoted, report.confirmed, report.unmanaged, report.elapsed_secs
                ),
                Err(ref e) => println!("Link sweep: failed ({})", e),
            }
            println!(
                "Echo sweep: {} promoted, {} demoted, {} confirmed, {} kept by ARP, {} failed ({:.1}s)",
                echo.promoted, echo.demoted, echo.confirmed, echo.guarded, echo.failed, echo.elapsed_secs
            );
        }
        OutputFormat::Json => {
            let (link_report, link_error) = match link {
                Ok(report) => (Some(report), None),
                Err(e) => (None, Some(e.to_string())),
            };
            println!("{}", serde_json::json!({
                "ok": true,
                "linkSweep": link_report,
                "linkSweepError": link_error,
                "echoSweep": echo,
            }));
        }
    }

    Ok(())
}

fn cmd_config(cli: &Cli, config: &PoolwatchConfig) -> Result<()> {
    let config_path = cli
        .config
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(poolwatch_core::config::get_config_file_path_string);

    match cli.format {
        OutputFormat::Text => {
            println!("Configuration (from {})", config.source);
            println!("=============");
            println!();
            println!("Config file:      {}", config_path);
            println!("Pool data file:   {}", config.data_file.display());
            println!("Link sweep every: {}s", config.engine.sweep_interval.as_secs());
            println!("Echo sweep every: {}s", config.engine.probe_interval.as_secs());
            println!("Probe timeout:    {}ms", config.engine.probe_timeout.as_millis());
            println!("Discovery:        {:?} ({})", config.discovery.source, config.discovery.command);
            println!("Interface:        {}", config.discovery.interface.as_deref().unwrap_or("default"));
            println!();
            println!("Environment variables:");
            println!("  POOLWATCH_INTERFACE, POOLWATCH_DATA_FILE,");
            println!("  POOLWATCH_SWEEP_INTERVAL_SECS, POOLWATCH_PROBE_INTERVAL_SECS");
            println!();
            println!("Example config.toml:");
            println!();
            println!("{}", config::generate_example_config());
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "config_file": config_path,
                "source": config.source.to_string(),
                "data_file": config.data_file,
                "sweep_interval_secs": config.engine.sweep_interval.as_secs(),
                "probe_interval_secs": config.engine.probe_interval.as_secs(),
                "probe_timeout_ms": config.engine.probe_timeout.as_millis() as u64,
                "probe_concurrency": config.engine.probe_concurrency,
                "interface": config.discovery.interface,
            }));
        }
    }

    Ok(())
}
