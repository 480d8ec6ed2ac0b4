//! Service configuration management

use anyhow::{anyhow, Context, Result};
use bar_stream::config::validate_symbols;
use bar_stream::{Feed, LifecycleConfig, StreamConfig};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Command line interface
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "bar-stream")]
#[command(about = "Stream live market bars and report how many have arrived")]
#[command(version)]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Environment file holding the API key pair
    #[arg(long, default_value = "apiKeys.env")]
    pub env_file: PathBuf,

    /// Comma separated symbols to subscribe to
    #[arg(short, long, value_delimiter = ',')]
    pub symbols: Option<Vec<String>>,

    /// Market data feed (iex, sip, delayed_sip, test)
    #[arg(short, long)]
    pub feed: Option<Feed>,

    /// Interval between progress reports in milliseconds
    #[arg(long)]
    pub report_interval_ms: Option<u64>,

    /// Use the in-process synthetic feed instead of connecting
    #[arg(long)]
    pub mock: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Streaming connection configuration
    pub stream: StreamConfig,

    /// Reporting and shutdown timing
    pub lifecycle: LifecycleConfig,

    /// Service-level configuration
    pub service: ServiceSettings,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Replace the live feed with the synthetic in-process one
    pub mock: bool,

    /// Bar interval of the synthetic feed in milliseconds
    pub mock_interval_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self { mock: false, mock_interval_ms: 250 }
    }
}

impl ServiceSettings {
    pub fn mock_interval(&self) -> Duration {
        Duration::from_millis(self.mock_interval_ms.max(1))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "compact".to_string() }
    }
}

/// Load configuration from the config file, environment and command line, in that order
pub fn load_config(cli: &Cli) -> Result<ServiceConfig> {
    load_env_file(&cli.env_file)?;

    let mut config = match &cli.config {
        Some(path) => load_from_file(path)?,
        None => load_from_env()?,
    };

    config.stream.apply_env().context("Invalid stream settings in environment")?;
    apply_cli(&mut config, cli);
    validate_config(&config)?;

    Ok(config)
}

/// Export the key pair file into the process environment, if it exists
fn load_env_file(path: &Path) -> Result<()> {
    if !path.exists() {
        tracing::debug!("No environment file at {:?}", path);
        return Ok(());
    }

    dotenv::from_path(path).with_context(|| format!("Failed to load environment file {:?}", path))?;
    Ok(())
}

/// `BAR_STREAM__SECTION__KEY` overrides, e.g. `BAR_STREAM__STREAM__FEED=sip`
fn environment_source() -> config::Environment {
    config::Environment::with_prefix("BAR_STREAM")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("stream.symbols")
        .try_parsing(true)
}

fn layered(file: Option<&Path>, environment: config::Environment) -> Result<ServiceConfig> {
    let mut builder = config::Config::builder();

    if let Some(path) = file {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    let settings = builder
        .add_source(environment)
        .build()
        .context("Failed to assemble configuration")?;

    settings.try_deserialize().context("Failed to parse configuration")
}

/// Load configuration from a TOML file, with `BAR_STREAM__*` environment overrides
fn load_from_file(path: &Path) -> Result<ServiceConfig> {
    tracing::debug!("Loading configuration from file: {:?}", path);
    layered(Some(path), environment_source())
        .with_context(|| format!("Failed to load configuration file {:?}", path))
}

/// Load configuration from `BAR_STREAM__*` environment variables only
fn load_from_env() -> Result<ServiceConfig> {
    layered(None, environment_source())
}

fn apply_cli(config: &mut ServiceConfig, cli: &Cli) {
    if let Some(symbols) = &cli.symbols {
        config.stream.symbols = bar_stream::config::parse_symbol_list(&symbols.join(","));
    }

    if let Some(feed) = cli.feed {
        config.stream.feed = feed;
    }

    if let Some(interval) = cli.report_interval_ms {
        config.lifecycle.report_interval_ms = interval;
    }

    if cli.mock {
        config.service.mock = true;
    }

    if let Some(level) = &cli.log_level {
        config.logging.level = level.to_ascii_lowercase();
    }
}

/// Validate configuration
fn validate_config(config: &ServiceConfig) -> Result<()> {
    if config.service.mock {
        validate_symbols(&config.stream.symbols)?;
    } else {
        config.stream.validate()?;
    }

    if config.lifecycle.report_interval_ms == 0 {
        return Err(anyhow!("Report interval must be greater than zero"));
    }

    match config.logging.level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.logging.level)),
    }

    match config.logging.format.as_str() {
        "json" | "pretty" | "compact" => {}
        _ => return Err(anyhow!("Invalid log format: {}", config.logging.format)),
    }

    Ok(())
}
