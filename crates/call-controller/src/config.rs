//! Call controller configuration.
//!
//! Configuration is loaded from environment variables; every knob has a
//! default so a bare `call-controller` starts locally.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use thiserror::Error;

/// Default WebSocket/health bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default time a call may ring unanswered before failing (seconds).
pub const DEFAULT_DIAL_TIMEOUT_SECONDS: u64 = 30;

/// Default time an accepted call may stall before negotiation (seconds).
pub const DEFAULT_CONNECT_TIMEOUT_SECONDS: u64 = 15;

/// Default interval between stale-session sweeps (seconds).
pub const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 300;

/// Default age past which the sweep removes a session (seconds).
pub const DEFAULT_SESSION_MAX_AGE_SECONDS: u64 = 600;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

/// Call controller configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address for the WebSocket and health endpoints
    /// (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Dial timeout: how long a session may stay ringing (default: 30s).
    pub dial_timeout_seconds: u64,

    /// Connect timeout: how long a session may stay accepted without an
    /// offer/answer exchange completing (default: 15s).
    pub connect_timeout_seconds: u64,

    /// Interval between stale-session sweeps (default: 300s).
    pub sweep_interval_seconds: u64,

    /// Age past which the sweep removes a session regardless of status
    /// (default: 600s).
    pub session_max_age_seconds: u64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a numeric variable fails to
    /// parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a numeric variable fails to
    /// parse.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("SWITCHBOARD_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let dial_timeout_seconds = parse_u64(
            vars,
            "SWITCHBOARD_DIAL_TIMEOUT_SECONDS",
            DEFAULT_DIAL_TIMEOUT_SECONDS,
        )?;
        let connect_timeout_seconds = parse_u64(
            vars,
            "SWITCHBOARD_CONNECT_TIMEOUT_SECONDS",
            DEFAULT_CONNECT_TIMEOUT_SECONDS,
        )?;
        let sweep_interval_seconds = parse_u64(
            vars,
            "SWITCHBOARD_SWEEP_INTERVAL_SECONDS",
            DEFAULT_SWEEP_INTERVAL_SECONDS,
        )?;
        let session_max_age_seconds = parse_u64(
            vars,
            "SWITCHBOARD_SESSION_MAX_AGE_SECONDS",
            DEFAULT_SESSION_MAX_AGE_SECONDS,
        )?;

        Ok(Self {
            bind_address,
            dial_timeout_seconds,
            connect_timeout_seconds,
            sweep_interval_seconds,
            session_max_age_seconds,
        })
    }

    #[must_use]
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_seconds)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    #[must_use]
    pub fn session_max_age(&self) -> Duration {
        Duration::from_secs(self.session_max_age_seconds)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            dial_timeout_seconds: DEFAULT_DIAL_TIMEOUT_SECONDS,
            connect_timeout_seconds: DEFAULT_CONNECT_TIMEOUT_SECONDS,
            sweep_interval_seconds: DEFAULT_SWEEP_INTERVAL_SECONDS,
            session_max_age_seconds: DEFAULT_SESSION_MAX_AGE_SECONDS,
        }
    }
}

fn parse_u64(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    match vars.get(name) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            value: raw.clone(),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_vars_absent() {
        let config = Config::from_vars(&HashMap::new()).unwrap();

        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.dial_timeout(), Duration::from_secs(30));
        assert_eq!(config.connect_timeout(), Duration::from_secs(15));
        assert_eq!(config.sweep_interval(), Duration::from_secs(300));
        assert_eq!(config.session_max_age(), Duration::from_secs(600));
    }

    #[test]
    fn vars_override_defaults() {
        let mut vars = HashMap::new();
        vars.insert(
            "SWITCHBOARD_BIND_ADDRESS".to_string(),
            "127.0.0.1:9000".to_string(),
        );
        vars.insert(
            "SWITCHBOARD_DIAL_TIMEOUT_SECONDS".to_string(),
            "5".to_string(),
        );

        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.dial_timeout_seconds, 5);
        // Untouched knobs keep their defaults.
        assert_eq!(
            config.connect_timeout_seconds,
            DEFAULT_CONNECT_TIMEOUT_SECONDS
        );
    }

    #[test]
    fn invalid_numeric_value_is_rejected() {
        let mut vars = HashMap::new();
        vars.insert(
            "SWITCHBOARD_SWEEP_INTERVAL_SECONDS".to_string(),
            "soon".to_string(),
        );

        let err = Config::from_vars(&vars).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
