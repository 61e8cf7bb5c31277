//! Configuration Module
//!
//! YAML configuration with environment interpolation and overrides.

mod settings;

pub use settings::{
    BrokerConfig, CONFIG_PATH_ENV, ConfigError, DEFAULT_CONFIG_PATH, DispatchSettings,
    RelayConfig, RestartSettings, ServerConfig, UpstreamConfig, interpolate_env_vars, load_config,
    load_config_from_string, map_lookup,
};
