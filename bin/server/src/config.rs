//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the demonstration
//! server, loaded via the `config` crate from `HEROKU_GATE__*` environment
//! variables.
//!
//! See [`GateConfig`](heroku_gate::GateConfig) for the gate settings.

use heroku_gate::GateConfig;
use serde::Deserialize;

/// Server configuration composed from the listener address and the gate
/// settings.
///
/// The gate settings are flattened into the same namespace as `bind`, so
/// `HEROKU_GATE__CLIENT_ID` and `HEROKU_GATE__BIND` sit side by side.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address and port the HTTP listener binds to.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Authentication gate configuration.
    #[serde(flatten)]
    pub gate: GateConfig,
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::with_prefix("HEROKU_GATE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
