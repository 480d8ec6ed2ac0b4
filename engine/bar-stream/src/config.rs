//! Configuration for the bar stream and its lifecycle

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::StreamError;
use crate::{DEFAULT_DRAIN_TIMEOUT_MS, DEFAULT_REPORT_INTERVAL_MS, DEFAULT_STREAM_URL};

/// Market data feed served by the streaming endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feed {
    /// IEX exchange data (free tier)
    #[default]
    Iex,
    /// Consolidated SIP data
    Sip,
    /// SIP data delayed by 15 minutes
    DelayedSip,
    /// Sandbox feed emitting synthetic bars around the clock
    Test,
}

impl Feed {
    /// Path segment used in the stream endpoint
    pub fn as_str(&self) -> &'static str {
        match self {
            Feed::Iex => "iex",
            Feed::Sip => "sip",
            Feed::DelayedSip => "delayed_sip",
            Feed::Test => "test",
        }
    }
}

impl std::str::FromStr for Feed {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "iex" => Ok(Feed::Iex),
            "sip" => Ok(Feed::Sip),
            "delayed_sip" => Ok(Feed::DelayedSip),
            "test" => Ok(Feed::Test),
            other => Err(StreamError::InvalidConfig(format!("Unknown feed: {}", other))),
        }
    }
}

impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key pair used to authenticate the stream
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamCredentials {
    pub key_id: String,

    /// Accepted from config files but never written back out
    #[serde(default, skip_serializing)]
    pub secret: String,
}

impl StreamCredentials {
    pub fn new(key_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self { key_id: key_id.into(), secret: secret.into() }
    }

    pub fn is_empty(&self) -> bool {
        self.key_id.is_empty() || self.secret.is_empty()
    }
}

impl fmt::Debug for StreamCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamCredentials")
            .field("key_id", &self.key_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Streaming connection configuration, immutable once the stream connects
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Authentication key pair
    pub credentials: StreamCredentials,

    /// Symbols whose bars are subscribed
    pub symbols: Vec<String>,

    /// Feed selector
    pub feed: Feed,

    /// Base websocket URL; the feed path is appended
    pub base_url: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            credentials: StreamCredentials::default(),
            symbols: vec!["AAPL".to_string(), "SPY".to_string()],
            feed: Feed::default(),
            base_url: DEFAULT_STREAM_URL.to_string(),
        }
    }
}

impl StreamConfig {
    /// Create config from environment variables
    pub fn from_env() -> Result<Self, StreamError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Override fields from environment variables that are set
    pub fn apply_env(&mut self) -> Result<(), StreamError> {
        if let Some(key_id) = env_any(&["APCA_API_KEY_ID", "apiKey"]) {
            self.credentials.key_id = key_id;
        }

        if let Some(secret) = env_any(&["APCA_API_SECRET_KEY", "apiSecret"]) {
            self.credentials.secret = secret;
        }

        if let Ok(symbols) = std::env::var("BAR_STREAM_SYMBOLS") {
            self.symbols = parse_symbol_list(&symbols);
        }

        if let Ok(feed) = std::env::var("BAR_STREAM_FEED") {
            self.feed = feed.parse()?;
        }

        if let Ok(url) = std::env::var("APCA_API_STREAM_URL") {
            self.base_url = url;
        }

        Ok(())
    }

    /// Full endpoint for the configured feed
    pub fn endpoint(&self) -> String {
        format!("{}/v2/{}", self.base_url.trim_end_matches('/'), self.feed)
    }

    /// Check credentials and the symbol list before connecting
    pub fn validate(&self) -> Result<(), StreamError> {
        if self.credentials.is_empty() {
            return Err(StreamError::Authentication("API key id and secret are required".to_string()));
        }

        validate_symbols(&self.symbols)?;

        url::Url::parse(&self.endpoint())
            .map_err(|e| StreamError::InvalidConfig(format!("Invalid stream URL: {}", e)))?;

        Ok(())
    }
}

/// Lifecycle timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Interval between progress reports in milliseconds (default: 1000ms)
    pub report_interval_ms: u64,

    /// How long shutdown waits for in-flight work in milliseconds
    pub drain_timeout_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            report_interval_ms: DEFAULT_REPORT_INTERVAL_MS,
            drain_timeout_ms: DEFAULT_DRAIN_TIMEOUT_MS,
        }
    }
}

impl LifecycleConfig {
    /// Get report interval as Duration
    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms.max(1))
    }

    /// Get drain timeout as Duration
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

/// Split a comma separated symbol list, trimming, upper-casing and de-duplicating
pub fn parse_symbol_list(raw: &str) -> Vec<String> {
    let mut symbols: Vec<String> = Vec::new();
    for symbol in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let symbol = symbol.to_ascii_uppercase();
        if !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
    }
    symbols
}

/// Reject empty lists and symbols the feed cannot subscribe to
pub fn validate_symbols(symbols: &[String]) -> Result<(), StreamError> {
    if symbols.is_empty() {
        return Err(StreamError::InvalidSymbols("at least one symbol is required".to_string()));
    }

    for symbol in symbols {
        if symbol == "*" {
            continue;
        }

        let valid = !symbol.is_empty()
            && symbol.len() <= 21
            && symbol
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, '.' | '/' | '-'));

        if !valid {
            return Err(StreamError::InvalidSymbols(format!("'{}' is not a valid symbol", symbol)));
        }
    }

    Ok(())
}

fn env_any(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| std::env::var(key).ok())
        .find(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serializes tests that touch the process environment
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_VARS: [&str; 4] = ["APCA_API_KEY_ID", "APCA_API_SECRET_KEY", "apiKey", "apiSecret"];

    fn with_env<T>(vars: &[(&str, &str)], f: impl FnOnce() -> T) -> T {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
        for (key, value) in vars {
            std::env::set_var(key, value);
        }

        let result = f();

        for var in ENV_VARS {
            std::env::remove_var(var);
        }
        result
    }

    fn valid_config() -> StreamConfig {
        StreamConfig {
            credentials: StreamCredentials::new("PKTEST", "secret"),
            ..Default::default()
        }
    }

    #[test]
    fn test_lifecycle_config_default() {
        let config = LifecycleConfig::default();
        assert_eq!(config.report_interval(), Duration::from_millis(1000));
        assert_eq!(config.drain_timeout(), Duration::from_millis(DEFAULT_DRAIN_TIMEOUT_MS));
    }

    #[test]
    fn test_zero_report_interval_is_clamped() {
        let config = LifecycleConfig { report_interval_ms: 0, ..Default::default() };
        assert_eq!(config.report_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_endpoint_appends_feed() {
        let mut config = valid_config();
        assert_eq!(config.endpoint(), "wss://stream.data.alpaca.markets/v2/iex");

        config.feed = Feed::Sip;
        config.base_url = "ws://127.0.0.1:9000/".to_string();
        assert_eq!(config.endpoint(), "ws://127.0.0.1:9000/v2/sip");
    }

    #[test]
    fn test_feed_parsing() {
        assert_eq!("IEX".parse::<Feed>().unwrap(), Feed::Iex);
        assert_eq!("delayed_sip".parse::<Feed>().unwrap(), Feed::DelayedSip);
        assert!(matches!("otc".parse::<Feed>(), Err(StreamError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_missing_credentials() {
        let config = StreamConfig::default();
        assert!(matches!(config.validate(), Err(StreamError::Authentication(_))));
    }

    #[test]
    fn test_validate_rejects_bad_symbols() {
        let mut config = valid_config();
        assert!(config.validate().is_ok());

        config.symbols = Vec::new();
        assert!(matches!(config.validate(), Err(StreamError::InvalidSymbols(_))));

        config.symbols = vec!["AAPL".to_string(), "sp y".to_string()];
        assert!(matches!(config.validate(), Err(StreamError::InvalidSymbols(_))));

        config.symbols = vec!["*".to_string()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_symbol_list() {
        assert_eq!(parse_symbol_list(" aapl, SPY ,,aapl"), vec!["AAPL", "SPY"]);
        assert!(parse_symbol_list(" , ").is_empty());
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let creds = StreamCredentials::new("PKTEST", "do-not-print");
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("PKTEST"));
        assert!(!rendered.contains("do-not-print"));
    }

    #[test]
    fn test_serialized_credentials_omit_secret() {
        let config = StreamConfig {
            credentials: StreamCredentials::new("PKTEST", "do-not-write"),
            ..Default::default()
        };

        let rendered = serde_json::to_string(&config).unwrap();
        assert!(rendered.contains("PKTEST"));
        assert!(!rendered.contains("do-not-write"));
    }

    #[test]
    fn test_apply_env_prefers_apca_names() {
        let config = with_env(
            &[
                ("APCA_API_KEY_ID", "PKPRIMARY"),
                ("apiKey", "PKLEGACY"),
                ("APCA_API_SECRET_KEY", "primary-secret"),
                ("apiSecret", "legacy-secret"),
            ],
            || StreamConfig::from_env().unwrap(),
        );

        assert_eq!(config.credentials, StreamCredentials::new("PKPRIMARY", "primary-secret"));
    }

    #[test]
    fn test_apply_env_falls_back_to_legacy_names() {
        let config = with_env(&[("apiKey", "PKLEGACY"), ("apiSecret", "legacy-secret")], || {
            StreamConfig::from_env().unwrap()
        });

        assert_eq!(config.credentials, StreamCredentials::new("PKLEGACY", "legacy-secret"));
    }

    #[test]
    fn test_blank_primary_value_falls_back() {
        let config = with_env(&[("APCA_API_KEY_ID", "  "), ("apiKey", "PKLEGACY")], || {
            StreamConfig::from_env().unwrap()
        });

        assert_eq!(config.credentials.key_id, "PKLEGACY");
        assert!(config.credentials.secret.is_empty());
    }
}
