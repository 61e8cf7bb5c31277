//! Relay Configuration Settings
//!
//! Loaded from YAML with `${VAR}` / `${VAR:-default}` interpolation, then
//! overridden by environment variables, then validated.
//!
//! ```yaml
//! upstream:
//!   url: wss://stream.binance.com:9443/ws
//!   symbols: [btcusdt, ethusdt]
//!   decode_policy: skip
//! broker:
//!   brokers: ["${KAFKA_HOST:-localhost}:9092"]
//!   required_acks: all
//!   max_attempts: 3
//! dispatch:
//!   workers: 32
//!   backpressure: drop_oldest
//! ```

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::application::services::{
    BackpressurePolicy, DEFAULT_UPSTREAM_URL, DecodePolicy, DispatchConfig, RestartConfig,
    SessionSettings,
};
use crate::domain::subscription::SubscriptionSet;
use crate::domain::tick::{DEFAULT_TOPIC_TEMPLATE, TopicTemplate};
use crate::infrastructure::kafka::{Compression, KafkaSettings, RequiredAcks};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "TRADE_RELAY_CONFIG";

/// Config file used when none is named.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

// =============================================================================
// Errors
// =============================================================================

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Environment override could not be parsed.
    #[error("Invalid value '{value}' for {name}: expected {expected}")]
    InvalidEnvVar {
        /// Variable name.
        name: &'static str,
        /// Raw value.
        value: String,
        /// What was expected.
        expected: &'static str,
    },

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

// =============================================================================
// Sections
// =============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Upstream stream settings.
    pub upstream: UpstreamConfig,
    /// Kafka producer settings.
    pub broker: BrokerConfig,
    /// Publish worker pool settings.
    pub dispatch: DispatchSettings,
    /// Session restart backoff.
    pub restart: RestartSettings,
    /// Health server settings.
    pub server: ServerConfig,
}

/// Upstream endpoint, symbols and timeouts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Websocket URL.
    pub url: String,
    /// Symbols to stream (case-insensitive).
    pub symbols: Vec<String>,
    /// Dial and handshake deadline in milliseconds.
    pub dial_timeout_ms: u64,
    /// Maximum silence between frames in milliseconds.
    pub read_timeout_ms: u64,
    /// Control-frame write deadline in milliseconds.
    pub write_timeout_ms: u64,
    /// Liveness-probe answer deadline in milliseconds.
    pub pong_timeout_ms: u64,
    /// Behavior on undecodable frames.
    pub decode_policy: DecodePolicy,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_UPSTREAM_URL.to_string(),
            symbols: Vec::new(),
            dial_timeout_ms: 10_000,
            read_timeout_ms: 60_000,
            write_timeout_ms: 5_000,
            pong_timeout_ms: 5_000,
            decode_policy: DecodePolicy::Skip,
        }
    }
}

/// Kafka producer settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Bootstrap servers.
    pub brokers: Vec<String>,
    /// Client id.
    pub client_id: String,
    /// Topic template containing `{symbol}`.
    pub topic_template: String,
    /// Acknowledgement level.
    pub required_acks: RequiredAcks,
    /// Sends per record before dropping it.
    pub max_attempts: u32,
    /// Per-attempt deadline in milliseconds.
    pub attempt_timeout_ms: u64,
    /// Payload compression.
    pub compression: Compression,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            client_id: "trade-relay".to_string(),
            topic_template: DEFAULT_TOPIC_TEMPLATE.to_string(),
            required_acks: RequiredAcks::All,
            max_attempts: 3,
            attempt_timeout_ms: 5_000,
            compression: Compression::Snappy,
        }
    }
}

/// Publish worker pool settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// Concurrent publish workers.
    pub workers: usize,
    /// Queue capacity.
    pub queue_capacity: usize,
    /// Full-queue behavior.
    pub backpressure: BackpressurePolicy,
    /// Drain grace period on shutdown in milliseconds.
    pub shutdown_grace_ms: u64,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            workers: 32,
            queue_capacity: 10_000,
            backpressure: BackpressurePolicy::DropOldest,
            shutdown_grace_ms: 5_000,
        }
    }
}

/// Session restart backoff.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RestartSettings {
    /// Restart failed sessions.
    pub enabled: bool,
    /// First delay in milliseconds.
    pub initial_delay_ms: u64,
    /// Delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff multiplier.
    pub multiplier: f64,
    /// Jitter fraction.
    pub jitter_factor: f64,
    /// Consecutive restart limit (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for RestartSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 0,
        }
    }
}

/// Health server settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP port for health and metrics.
    pub health_port: u16,
    /// Frame age after which the relay reports degraded, in milliseconds.
    pub staleness_window_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            health_port: 8082,
            staleness_window_ms: 30_000,
        }
    }
}

// =============================================================================
// Derived Settings
// =============================================================================

impl RelayConfig {
    /// Session endpoint and timeouts.
    #[must_use]
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            url: self.upstream.url.clone(),
            dial_timeout: Duration::from_millis(self.upstream.dial_timeout_ms),
            read_timeout: Duration::from_millis(self.upstream.read_timeout_ms),
            write_timeout: Duration::from_millis(self.upstream.write_timeout_ms),
            pong_timeout: Duration::from_millis(self.upstream.pong_timeout_ms),
        }
    }

    /// Normalized symbol set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for an empty or invalid list.
    pub fn subscription_set(&self) -> Result<SubscriptionSet, ConfigError> {
        SubscriptionSet::new(&self.upstream.symbols)
            .map_err(|e| ConfigError::ValidationError(format!("upstream.symbols: {e}")))
    }

    /// Parsed topic template.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] when `{symbol}` is missing.
    pub fn topic_template(&self) -> Result<TopicTemplate, ConfigError> {
        TopicTemplate::new(self.broker.topic_template.clone())
            .map_err(|e| ConfigError::ValidationError(format!("broker.topic_template: {e}")))
    }

    /// Kafka producer settings.
    #[must_use]
    pub fn kafka_settings(&self) -> KafkaSettings {
        KafkaSettings {
            brokers: self.broker.brokers.clone(),
            client_id: self.broker.client_id.clone(),
            required_acks: self.broker.required_acks,
            max_attempts: self.broker.max_attempts,
            attempt_timeout: Duration::from_millis(self.broker.attempt_timeout_ms),
            compression: self.broker.compression,
        }
    }

    /// Dispatcher sizing.
    #[must_use]
    pub const fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            workers: self.dispatch.workers,
            queue_capacity: self.dispatch.queue_capacity,
            backpressure: self.dispatch.backpressure,
        }
    }

    /// Drain grace period.
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.dispatch.shutdown_grace_ms)
    }

    /// Restart backoff.
    #[must_use]
    pub const fn restart_config(&self) -> RestartConfig {
        RestartConfig {
            enabled: self.restart.enabled,
            initial_delay: Duration::from_millis(self.restart.initial_delay_ms),
            max_delay: Duration::from_millis(self.restart.max_delay_ms),
            multiplier: self.restart.multiplier,
            jitter_factor: self.restart.jitter_factor,
            max_attempts: self.restart.max_attempts,
        }
    }

    /// Staleness window for health reporting.
    #[must_use]
    pub const fn staleness_window(&self) -> Duration {
        Duration::from_millis(self.server.staleness_window_ms)
    }

    /// Apply overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnvVar`] for unparseable values.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup`. Empty values are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnvVar`] for unparseable values.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("RELAY_UPSTREAM_URL") {
            self.upstream.url = url.trim().to_string();
        }
        if let Some(symbols) = get("RELAY_SYMBOLS") {
            self.upstream.symbols = split_list(&symbols);
        }
        if let Some(brokers) = get("KAFKA_BROKERS") {
            self.broker.brokers = split_list(&brokers);
        }
        if let Some(value) = get("KAFKA_REQUIRED_ACKS") {
            self.broker.required_acks = RequiredAcks::from_str_case_insensitive(&value)
                .ok_or_else(|| invalid("KAFKA_REQUIRED_ACKS", value, "none, leader or all"))?;
        }
        if let Some(value) = get("KAFKA_MAX_ATTEMPTS") {
            self.broker.max_attempts = value
                .trim()
                .parse()
                .map_err(|_| invalid("KAFKA_MAX_ATTEMPTS", value, "a positive integer"))?;
        }
        if let Some(value) = get("RELAY_HEALTH_PORT") {
            self.server.health_port = value
                .trim()
                .parse()
                .map_err(|_| invalid("RELAY_HEALTH_PORT", value, "a port number"))?;
        }
        if let Some(value) = get("RELAY_DECODE_POLICY") {
            self.upstream.decode_policy = DecodePolicy::from_str_case_insensitive(&value)
                .ok_or_else(|| invalid("RELAY_DECODE_POLICY", value, "skip or fatal"))?;
        }
        if let Some(value) = get("RELAY_BACKPRESSURE") {
            self.dispatch.backpressure = BackpressurePolicy::from_str_case_insensitive(&value)
                .ok_or_else(|| {
                    invalid("RELAY_BACKPRESSURE", value, "drop_oldest, drop_newest or block")
                })?;
        }

        Ok(())
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.upstream.url.trim();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ConfigError::ValidationError(format!(
                "upstream.url must be a ws:// or wss:// URL, got '{url}'"
            )));
        }

        self.subscription_set()?;
        self.topic_template()?;

        if self.broker.brokers.iter().all(|b| b.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "broker.brokers must list at least one broker".to_string(),
            ));
        }
        if self.broker.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "broker.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.dispatch.workers == 0 {
            return Err(ConfigError::ValidationError(
                "dispatch.workers must be at least 1".to_string(),
            ));
        }
        if self.dispatch.queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "dispatch.queue_capacity must be at least 1".to_string(),
            ));
        }

        for (name, millis) in [
            ("upstream.dial_timeout_ms", self.upstream.dial_timeout_ms),
            ("upstream.read_timeout_ms", self.upstream.read_timeout_ms),
            ("upstream.write_timeout_ms", self.upstream.write_timeout_ms),
            ("upstream.pong_timeout_ms", self.upstream.pong_timeout_ms),
            ("broker.attempt_timeout_ms", self.broker.attempt_timeout_ms),
        ] {
            if millis == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be positive"
                )));
            }
        }

        if !self.restart.multiplier.is_finite() || self.restart.multiplier < 1.0 {
            return Err(ConfigError::ValidationError(
                "restart.multiplier must be at least 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.restart.jitter_factor) {
            return Err(ConfigError::ValidationError(
                "restart.jitter_factor must be between 0.0 and 1.0".to_string(),
            ));
        }

        Ok(())
    }
}

// =============================================================================
// Loading
// =============================================================================

/// Load configuration from a YAML file, apply environment overrides and
/// validate.
///
/// With no explicit `path`, `TRADE_RELAY_CONFIG` is consulted, then
/// `config.yaml`; a missing default file yields all defaults.
///
/// # Errors
///
/// Returns [`ConfigError`] if the file cannot be read or parsed, an override
/// is malformed, or validation fails.
pub fn load_config(path: Option<&str>) -> Result<RelayConfig, ConfigError> {
    let env_path = std::env::var(CONFIG_PATH_ENV).ok();
    let explicit = path.or(env_path.as_deref());
    let path = explicit.unwrap_or(DEFAULT_CONFIG_PATH);

    let mut config = match std::fs::read_to_string(path) {
        Ok(contents) => parse_config(&interpolate_env_vars(&contents))?,
        Err(e) if explicit.is_none() && e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path, "No config file found, using defaults");
            RelayConfig::default()
        }
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.to_string(),
                source: e,
            });
        }
    };

    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from a YAML string (for testing). Environment overrides
/// are not applied.
///
/// # Errors
///
/// Returns [`ConfigError`] if parsing or validation fails.
pub fn load_config_from_string(yaml: &str) -> Result<RelayConfig, ConfigError> {
    let config = parse_config(&interpolate_env_vars(yaml))?;
    config.validate()?;
    Ok(config)
}

fn parse_config(yaml: &str) -> Result<RelayConfig, ConfigError> {
    if yaml.trim().is_empty() {
        return Ok(RelayConfig::default());
    }
    Ok(serde_yaml_bw::from_str(yaml)?)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax. Unset or empty
/// variables without a default become empty strings.
#[must_use]
pub fn interpolate_env_vars(input: &str) -> String {
    interpolate_with(input, |name| std::env::var(name).ok())
}

#[allow(clippy::expect_used)] // Regex is compile-time constant; expect() is safe here
fn interpolate_with<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    re.replace_all(input, |caps: &regex::Captures<'_>| {
        let default = caps.get(2).map_or("", |m| m.as_str());
        caps.get(1)
            .and_then(|name| lookup(name.as_str()))
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_string())
    })
    .into_owned()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn invalid(name: &'static str, value: String, expected: &'static str) -> ConfigError {
    ConfigError::InvalidEnvVar {
        name,
        value,
        expected,
    }
}

/// Lookup over a fixed map, for tests and embedding.
#[must_use]
pub fn map_lookup(vars: &HashMap<String, String>) -> impl Fn(&str) -> Option<String> + '_ {
    move |name: &str| vars.get(name).cloned()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const MINIMAL: &str = r"
upstream:
  symbols: [btcusdt, ETHUSDT]
";

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn minimal_yaml_uses_defaults() {
        let config = load_config_from_string(MINIMAL).unwrap();

        assert_eq!(config.upstream.url, DEFAULT_UPSTREAM_URL);
        assert_eq!(config.upstream.decode_policy, DecodePolicy::Skip);
        assert_eq!(config.broker.brokers, vec!["localhost:9092"]);
        assert_eq!(config.broker.required_acks, RequiredAcks::All);
        assert_eq!(config.broker.compression, Compression::Snappy);
        assert_eq!(config.dispatch.workers, 32);
        assert_eq!(config.dispatch.queue_capacity, 10_000);
        assert_eq!(config.dispatch.backpressure, BackpressurePolicy::DropOldest);
        assert!(config.restart.enabled);
        assert_eq!(config.restart_config().max_delay, Duration::from_secs(60));
        assert_eq!(
            config.subscription_set().unwrap().channels(),
            vec!["btcusdt@aggTrade", "ethusdt@aggTrade"]
        );
    }

    #[test]
    fn full_yaml_parses_every_section() {
        let yaml = r"
upstream:
  url: ws://127.0.0.1:9000/ws
  symbols: [bnbusdt]
  read_timeout_ms: 1000
  decode_policy: fatal
broker:
  brokers: [k1:9092, k2:9092]
  topic_template: market.{symbol}.trades
  required_acks: leader
  max_attempts: 5
  compression: zstd
dispatch:
  workers: 4
  queue_capacity: 100
  backpressure: block
  shutdown_grace_ms: 250
restart:
  enabled: false
server:
  health_port: 9100
  staleness_window_ms: 5000
";
        let config = load_config_from_string(yaml).unwrap();

        assert_eq!(config.session_settings().read_timeout, Duration::from_secs(1));
        assert_eq!(config.upstream.decode_policy, DecodePolicy::Fatal);
        assert_eq!(config.topic_template().unwrap().render("BNBUSDT"), "market.bnbusdt.trades");

        let kafka = config.kafka_settings();
        assert_eq!(kafka.brokers.len(), 2);
        assert_eq!(kafka.required_acks, RequiredAcks::Leader);
        assert_eq!(kafka.max_attempts, 5);
        assert_eq!(kafka.compression, Compression::Zstd);

        assert_eq!(config.dispatch_config().backpressure, BackpressurePolicy::Block);
        assert_eq!(config.shutdown_grace(), Duration::from_millis(250));
        assert!(!config.restart_config().enabled);
        assert_eq!(config.server.health_port, 9100);
        assert_eq!(config.staleness_window(), Duration::from_secs(5));
    }

    #[test]
    fn empty_symbols_rejected() {
        let err = load_config_from_string("upstream:\n  symbols: []\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(msg) if msg.contains("upstream.symbols")));
    }

    #[test]
    fn duplicate_symbols_rejected() {
        let err = load_config_from_string("upstream:\n  symbols: [btcusdt, BTCUSDT, ethusdt]\n")
            .unwrap_err();
        assert!(
            matches!(err, ConfigError::ValidationError(msg) if msg.contains("duplicate symbol 'BTCUSDT'"))
        );
    }

    #[test]
    fn template_without_placeholder_rejected() {
        let yaml = format!("{MINIMAL}broker:\n  topic_template: trades\n");
        let err = load_config_from_string(&yaml).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(msg) if msg.contains("topic_template")));
    }

    #[test]
    fn zero_attempts_and_workers_rejected() {
        let mut config = load_config_from_string(MINIMAL).unwrap();
        config.broker.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = load_config_from_string(MINIMAL).unwrap();
        config.dispatch.workers = 0;
        assert!(config.validate().is_err());

        let mut config = load_config_from_string(MINIMAL).unwrap();
        config.broker.brokers = vec![" ".to_string()];
        assert!(config.validate().is_err());

        let mut config = load_config_from_string(MINIMAL).unwrap();
        config.upstream.url = "https://stream.binance.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut config = load_config_from_string(MINIMAL).unwrap();
        let env = vars(&[
            ("RELAY_SYMBOLS", "solusdt, xrpusdt"),
            ("KAFKA_BROKERS", "a:1,b:2"),
            ("KAFKA_REQUIRED_ACKS", "1"),
            ("KAFKA_MAX_ATTEMPTS", "7"),
            ("RELAY_HEALTH_PORT", "9999"),
            ("RELAY_DECODE_POLICY", "fatal"),
            ("RELAY_BACKPRESSURE", "drop_newest"),
            ("RELAY_UPSTREAM_URL", "ws://localhost:1/ws"),
        ]);

        config.apply_overrides(map_lookup(&env)).unwrap();

        assert_eq!(config.upstream.symbols, vec!["solusdt", "xrpusdt"]);
        assert_eq!(config.broker.brokers, vec!["a:1", "b:2"]);
        assert_eq!(config.broker.required_acks, RequiredAcks::Leader);
        assert_eq!(config.broker.max_attempts, 7);
        assert_eq!(config.server.health_port, 9999);
        assert_eq!(config.upstream.decode_policy, DecodePolicy::Fatal);
        assert_eq!(config.dispatch.backpressure, BackpressurePolicy::DropNewest);
        assert_eq!(config.upstream.url, "ws://localhost:1/ws");
        config.validate().unwrap();
    }

    #[test]
    fn malformed_override_names_variable() {
        let mut config = RelayConfig::default();
        let env = vars(&[("KAFKA_MAX_ATTEMPTS", "many")]);

        let err = config.apply_overrides(map_lookup(&env)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnvVar { name: "KAFKA_MAX_ATTEMPTS", .. }
        ));
    }

    #[test]
    fn empty_override_is_ignored() {
        let mut config = load_config_from_string(MINIMAL).unwrap();
        let env = vars(&[("RELAY_SYMBOLS", "  ")]);
        config.apply_overrides(map_lookup(&env)).unwrap();
        assert_eq!(config.upstream.symbols.len(), 2);
    }

    #[test]
    fn interpolation_with_defaults() {
        let env = vars(&[("KAFKA_HOST", "kafka.internal"), ("EMPTY", "")]);
        let lookup = map_lookup(&env);

        assert_eq!(
            interpolate_with("${KAFKA_HOST:-localhost}:9092", &lookup),
            "kafka.internal:9092"
        );
        assert_eq!(interpolate_with("${MISSING:-fallback}", &lookup), "fallback");
        assert_eq!(interpolate_with("${EMPTY:-fallback}", &lookup), "fallback");
        assert_eq!(interpolate_with("${MISSING}", &lookup), "");
        assert_eq!(interpolate_with("no vars here", &lookup), "no vars here");
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "upstream:\n  symbols: [\"${{TRADE_RELAY_TEST_UNSET_SYMBOL:-adausdt}}\"]"
        )
        .unwrap();

        let config = load_config(Some(file.path().to_str().unwrap())).unwrap();
        assert_eq!(config.upstream.symbols, vec!["adausdt"]);
    }

    #[test]
    fn explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");

        let err = load_config(Some(path.to_str().unwrap())).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }

    #[test]
    fn example_config_is_valid() {
        let yaml = include_str!("../../../config.example.yaml");
        let no_env = HashMap::new();
        let config = parse_config(&interpolate_with(yaml, map_lookup(&no_env))).unwrap();
        config.validate().unwrap();

        assert_eq!(config.upstream.url, DEFAULT_UPSTREAM_URL);
        assert_eq!(config.broker.brokers, vec!["localhost:9092"]);
        assert_eq!(config.dispatch_config().backpressure, BackpressurePolicy::DropOldest);
        assert_eq!(
            config.subscription_set().unwrap().channels(),
            vec!["btcusdt@aggTrade", "ethusdt@aggTrade"]
        );
    }

    #[test]
    fn invalid_yaml_is_parse_error() {
        let err = load_config_from_string("upstream: [not, a, map").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }
}
