//! Layered configuration: compiled defaults, overridden by an optional TOML
//! file, overridden by `STT_*` environment variables, overridden by CLI
//! flags — the same precedence the reference binary applies to its own
//! settings.

use serde::{Deserialize, Serialize};
use stt_foundation::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Address the TCP listener binds to.
    pub listen_address: String,
    /// Port the TCP listener binds to.
    pub port: u16,
    /// Seconds in-flight sessions are given to drain on shutdown.
    pub drain_timeout_secs: u64,
    /// RMS silence threshold override for the decision engine.
    pub rms_threshold: f32,
    /// Directory rotated log files are written to.
    pub log_dir: String,
    /// `tracing` env-filter directive, e.g. "info" or "stt_core=debug".
    pub log_level: String,
    /// Rotated log retention, in days. `0` disables pruning.
    pub log_retention_days: u64,
    /// Which in-process model fixture to run when no real model binding is
    /// configured; the real model is out of scope for this service.
    pub fixture_model: FixtureModelKind,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FixtureModelKind {
    /// Never returns any segments; useful for exercising the silence path.
    Silent,
    /// Echoes a fixed transcript back after the first model call.
    Echo,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0".to_string(),
            port: 50051,
            drain_timeout_secs: 5,
            rms_threshold: stt_core::constants::RMS_THRESHOLD,
            log_dir: "logs".to_string(),
            log_level: "info".to_string(),
            log_retention_days: 7,
            fixture_model: FixtureModelKind::Echo,
        }
    }
}

impl ServerSettings {
    /// Loads settings from the compiled default, an optional
    /// `config/default.toml`, then `STT_*` environment variables, in that
    /// precedence order. CLI overrides are applied by the caller afterward.
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let builder = config::Config::builder()
            .set_default("listen_address", defaults.listen_address.clone())
            .map_err(ConfigError::Parse)?
            .set_default("port", defaults.port as i64)
            .map_err(ConfigError::Parse)?
            .set_default("drain_timeout_secs", defaults.drain_timeout_secs as i64)
            .map_err(ConfigError::Parse)?
            .set_default("rms_threshold", defaults.rms_threshold as f64)
            .map_err(ConfigError::Parse)?
            .set_default("log_dir", defaults.log_dir.clone())
            .map_err(ConfigError::Parse)?
            .set_default("log_level", defaults.log_level.clone())
            .map_err(ConfigError::Parse)?
            .set_default("log_retention_days", defaults.log_retention_days as i64)
            .map_err(ConfigError::Parse)?
            .set_default("fixture_model", "echo")
            .map_err(ConfigError::Parse)?
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::Environment::with_prefix("STT").separator("_"));

        let settings = builder.build().map_err(ConfigError::Parse)?;
        settings.try_deserialize().map_err(ConfigError::Parse)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Validation {
                field: "port".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }
        if self.drain_timeout_secs == 0 {
            return Err(ConfigError::Validation {
                field: "drain_timeout_secs".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn defaults_are_valid() {
        env::remove_var("STT_PORT");
        let settings = ServerSettings::load().unwrap();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.port, 50051);
    }

    #[test]
    #[serial]
    fn env_var_overrides_default() {
        env::set_var("STT_PORT", "9999");
        let settings = ServerSettings::load().unwrap();
        env::remove_var("STT_PORT");
        assert_eq!(settings.port, 9999);
    }

    #[test]
    fn rejects_zero_port() {
        let settings = ServerSettings { port: 0, ..ServerSettings::default() };
        assert!(settings.validate().is_err());
    }
}
