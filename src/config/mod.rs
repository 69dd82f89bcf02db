//! Configuration management for the packet sentry.
//!
//! This module handles loading application configuration from an
//! optional configuration file and environment variables.

use std::env;
use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use crate::models::Config;

/// Load configuration from the config file and environment variables
///
/// Environment variables use the `PACKET_SENTRY` prefix and `__` between
/// sections, e.g. `PACKET_SENTRY_CAPTURE__INTERFACE=eth0`.
pub fn load_config() -> Result<Config, ConfigError> {
    let config_file = env::var("CONFIG_FILE").unwrap_or_else(|_| "config/default.toml".to_string());

    let config = ConfigBuilder::builder()
        .add_source(File::with_name(&config_file).required(false))
        .add_source(
            Environment::with_prefix("PACKET_SENTRY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    config.try_deserialize()
}
