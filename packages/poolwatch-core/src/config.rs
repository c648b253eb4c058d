//! Runtime configuration.
//!
//! Values are resolved with priority:
//! 1. Environment variables (`POOLWATCH_*`)
//! 2. Config file (`~/.config/poolwatch/config.toml`)
//! 3. Defaults

use crate::engine::EngineSettings;
use crate::probe::{ArpScanSweep, ArpTableSweep, DEFAULT_SWEEP_TIMEOUT, LinkLayerSweep};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const ENV_INTERFACE: &str = "POOLWATCH_INTERFACE";
const ENV_DATA_FILE: &str = "POOLWATCH_DATA_FILE";
const ENV_SWEEP_INTERVAL: &str = "POOLWATCH_SWEEP_INTERVAL_SECS";
const ENV_PROBE_INTERVAL: &str = "POOLWATCH_PROBE_INTERVAL_SECS";

/// Configuration file structure
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    engine: Option<EngineSection>,
    discovery: Option<DiscoverySection>,
    storage: Option<StorageSection>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct EngineSection {
    sweep_interval_secs: Option<u64>,
    probe_interval_secs: Option<u64>,
    probe_timeout_ms: Option<u64>,
    probe_concurrency: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DiscoverySection {
    source: Option<DiscoverySource>,
    interface: Option<String>,
    command: Option<String>,
    use_sudo: Option<bool>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct StorageSection {
    data_file: Option<PathBuf>,
}

/// Which link-layer discovery tool to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoverySource {
    /// Active sweep with `arp-scan --localnet`
    #[default]
    ArpScan,
    /// Passive read of the kernel ARP cache
    ArpTable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    pub source: DiscoverySource,
    pub interface: Option<String>,
    pub command: String,
    pub use_sudo: bool,
    /// Deadline for one discovery run
    pub timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            source: DiscoverySource::default(),
            interface: None,
            command: "arp-scan".to_string(),
            use_sudo: false,
            timeout: DEFAULT_SWEEP_TIMEOUT,
        }
    }
}

impl DiscoveryConfig {
    pub fn link_sweep(&self) -> Arc<dyn LinkLayerSweep> {
        match self.source {
            DiscoverySource::ArpScan => Arc::new(ArpScanSweep {
                command: self.command.clone(),
                interface: self.interface.clone(),
                use_sudo: self.use_sudo,
                timeout: self.timeout,
            }),
            DiscoverySource::ArpTable => Arc::new(ArpTableSweep),
        }
    }
}

/// Where the configuration came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// Using default hardcoded values
    Default,
    /// Config file present, no environment overrides
    ConfigFile,
    /// At least one value from an environment variable
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::ConfigFile => write!(f, "config file"),
            ConfigSource::Environment => write!(f, "environment variable"),
        }
    }
}

/// Effective configuration
#[derive(Debug, Clone)]
pub struct PoolwatchConfig {
    pub engine: EngineSettings,
    pub discovery: DiscoveryConfig,
    pub data_file: PathBuf,
    pub source: ConfigSource,
}

impl Default for PoolwatchConfig {
    fn default() -> Self {
        Self {
            engine: EngineSettings::default(),
            discovery: DiscoveryConfig::default(),
            data_file: default_data_file(),
            source: ConfigSource::Default,
        }
    }
}

/// Get the path to the configuration file
pub fn get_config_file_path() -> Option<PathBuf> {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .map(|p| p.join("poolwatch").join("config.toml"))
}

/// Get the path to the config file for documentation purposes
pub fn get_config_file_path_string() -> String {
    get_config_file_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "~/.config/poolwatch/config.toml".to_string())
}

fn default_data_file() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::data_dir)
        .map(|d| d.join("poolwatch").join("pool.json"))
        .unwrap_or_else(|| PathBuf::from("poolwatch-pool.json"))
}

/// Load configuration from the default file location and the process
/// environment.
pub fn load_config() -> Result<PoolwatchConfig> {
    load_config_from(get_config_file_path().as_deref())
}

/// Load configuration from an explicit file (missing file means defaults)
/// and the process environment.
pub fn load_config_from(path: Option<&Path>) -> Result<PoolwatchConfig> {
    let file = match path {
        Some(path) if path.exists() => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {:?}", path))?;
            let file = parse_config_file(&content)
                .with_context(|| format!("Failed to parse config file {:?}", path))?;
            tracing::debug!("Loaded config from {:?}", path);
            Some(file)
        }
        _ => None,
    };

    resolve(file, |key| std::env::var(key).ok())
}

fn parse_config_file(content: &str) -> Result<ConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Merge file values and environment overrides onto defaults.
fn resolve<F>(file: Option<ConfigFile>, env: F) -> Result<PoolwatchConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = PoolwatchConfig::default();

    if let Some(file) = file {
        config.source = ConfigSource::ConfigFile;

        if let Some(engine) = file.engine {
            if let Some(secs) = engine.sweep_interval_secs {
                config.engine.sweep_interval = Duration::from_secs(secs);
            }
            if let Some(secs) = engine.probe_interval_secs {
                config.engine.probe_interval = Duration::from_secs(secs);
            }
            if let Some(ms) = engine.probe_timeout_ms {
                config.engine.probe_timeout = Duration::from_millis(ms);
            }
            if let Some(n) = engine.probe_concurrency {
                config.engine.probe_concurrency = n;
            }
        }
        if let Some(discovery) = file.discovery {
            if let Some(source) = discovery.source {
                config.discovery.source = source;
            }
            config.discovery.interface = discovery.interface.filter(|i| !i.trim().is_empty());
            if let Some(command) = discovery.command {
                config.discovery.command = command;
            }
            if let Some(use_sudo) = discovery.use_sudo {
                config.discovery.use_sudo = use_sudo;
            }
            if let Some(secs) = discovery.timeout_secs {
                config.discovery.timeout = Duration::from_secs(secs);
            }
        }
        if let Some(data_file) = file.storage.and_then(|s| s.data_file) {
            config.data_file = data_file;
        }
    }

    let mut from_env = false;
    if let Some(iface) = env(ENV_INTERFACE).filter(|v| !v.trim().is_empty()) {
        config.discovery.interface = Some(iface.trim().to_string());
        from_env = true;
    }
    if let Some(path) = env(ENV_DATA_FILE).filter(|v| !v.trim().is_empty()) {
        config.data_file = PathBuf::from(path.trim());
        from_env = true;
    }
    if let Some(secs) = env(ENV_SWEEP_INTERVAL) {
        let secs: u64 = secs
            .trim()
            .parse()
            .with_context(|| format!("{} must be a number of seconds", ENV_SWEEP_INTERVAL))?;
        config.engine.sweep_interval = Duration::from_secs(secs);
        from_env = true;
    }
    if let Some(secs) = env(ENV_PROBE_INTERVAL) {
        let secs: u64 = secs
            .trim()
            .parse()
            .with_context(|| format!("{} must be a number of seconds", ENV_PROBE_INTERVAL))?;
        config.engine.probe_interval = Duration::from_secs(secs);
        from_env = true;
    }
    if from_env {
        config.source = ConfigSource::Environment;
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &PoolwatchConfig) -> Result<()> {
    if config.engine.sweep_interval.is_zero() || config.engine.probe_interval.is_zero() {
        bail!("cycle intervals must be at least one second");
    }
    if config.engine.probe_timeout.is_zero() {
        bail!("probe_timeout_ms must be greater than zero");
    }
    if config.discovery.timeout.is_zero() {
        bail!("discovery timeout_secs must be at least one second");
    }
    if config.engine.probe_concurrency == 0 {
        bail!("probe_concurrency must be at least 1");
    }
    if config.engine.probe_timeout >= config.engine.probe_interval {
        tracing::warn!(
            "probe timeout {:?} is not shorter than the probe interval {:?}",
            config.engine.probe_timeout,
            config.engine.probe_interval
        );
    }
    Ok(())
}

/// Generate example config file content
pub fn generate_example_config() -> String {
    r#"# Poolwatch Configuration
# Place this file at: ~/.config/poolwatch/config.toml

[engine]
# Link-layer sweep interval (env: POOLWATCH_SWEEP_INTERVAL_SECS)
# sweep_interval_secs = 60
# Echo probe sweep interval (env: POOLWATCH_PROBE_INTERVAL_SECS)
# probe_interval_secs = 300
# Per-address echo timeout
# probe_timeout_ms = 1000
# Echo probes in flight at once
# probe_concurrency = 32

[discovery]
# "arp-scan" (active, needs raw sockets) or "arp-table" (kernel ARP cache)
# source = "arp-scan"
# Interface to sweep (env: POOLWATCH_INTERFACE)
# interface = "eth0"
# command = "arp-scan"
# Run arp-scan through `sudo -n`
# use_sudo = false
# Kill a discovery run that takes longer than this
# timeout_secs = 30

[storage]
# Pool file (env: POOLWATCH_DATA_FILE)
# data_file = "/var/lib/poolwatch/pool.json"
"#
    .to_string()
}
