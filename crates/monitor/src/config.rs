use std::time::Duration;

use tmon_client::reconnect::ReconnectConfig;
use tmon_store::SyncConfig;

/// Monitor configuration loaded from environment variables.
///
/// All fields have defaults suitable for a backend on the local machine.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Backend origin for REST calls (default: `http://localhost:5000`).
    pub api_url: String,
    /// Push channel URL (default: `ws://localhost:5000/ws`).
    pub ws_url: String,
    /// Per-request timeout in seconds (default: `10`).
    pub request_timeout_secs: u64,
    /// Reconnect attempts before live updates are given up (default: `5`).
    pub reconnect_attempts: u32,
    /// Pause before each reconnect attempt in milliseconds (default: `1000`).
    pub reconnect_delay_ms: u64,
    /// Background refresh period in seconds, `0` disables (default: `5`).
    pub refresh_secs: u64,
    /// Page size for the initial fetches (default: `20`).
    pub per_page: u32,
    /// Task ids to follow live from startup.
    pub subscribe: Vec<String>,
}

/// Invalid environment configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} has invalid value {value:?}")]
    Invalid { var: &'static str, value: String },
}

impl MonitorConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default                  |
    /// |-----------------------------|--------------------------|
    /// | `TMON_API_URL`              | `http://localhost:5000`  |
    /// | `TMON_WS_URL`               | `ws://localhost:5000/ws` |
    /// | `TMON_REQUEST_TIMEOUT_SECS` | `10`                     |
    /// | `TMON_RECONNECT_ATTEMPTS`   | `5`                      |
    /// | `TMON_RECONNECT_DELAY_MS`   | `1000`                   |
    /// | `TMON_REFRESH_SECS`         | `5`                      |
    /// | `TMON_PER_PAGE`             | `20`                     |
    /// | `TMON_SUBSCRIBE`            | empty, comma-separated   |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let text = |var: &str, default: &str| lookup(var).unwrap_or_else(|| default.to_string());

        let subscribe = lookup("TMON_SUBSCRIBE")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            api_url: text("TMON_API_URL", "http://localhost:5000"),
            ws_url: text("TMON_WS_URL", "ws://localhost:5000/ws"),
            request_timeout_secs: number(&lookup, "TMON_REQUEST_TIMEOUT_SECS", 10)?,
            reconnect_attempts: number(&lookup, "TMON_RECONNECT_ATTEMPTS", 5)?,
            reconnect_delay_ms: number(&lookup, "TMON_RECONNECT_DELAY_MS", 1000)?,
            refresh_secs: number(&lookup, "TMON_REFRESH_SECS", 5)?,
            per_page: number(&lookup, "TMON_PER_PAGE", 20)?,
            subscribe,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn reconnect(&self) -> ReconnectConfig {
        ReconnectConfig {
            max_attempts: self.reconnect_attempts,
            delay: Duration::from_millis(self.reconnect_delay_ms),
        }
    }

    pub fn sync(&self) -> SyncConfig {
        SyncConfig {
            refresh_interval: Duration::from_secs(self.refresh_secs),
        }
    }
}

fn number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<MonitorConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MonitorConfig::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let config = load(&[]).unwrap();

        assert_eq!(config.api_url, "http://localhost:5000");
        assert_eq!(config.ws_url, "ws://localhost:5000/ws");
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.reconnect().max_attempts, 5);
        assert_eq!(config.reconnect().delay, Duration::from_millis(1000));
        assert_eq!(config.sync().refresh_interval, Duration::from_secs(5));
        assert_eq!(config.per_page, 20);
        assert!(config.subscribe.is_empty());
    }

    #[test]
    fn overrides_are_applied() {
        let config = load(&[
            ("TMON_API_URL", "http://cluster:8080"),
            ("TMON_REFRESH_SECS", "0"),
            ("TMON_RECONNECT_ATTEMPTS", " 3 "),
            ("TMON_SUBSCRIBE", "t-1, t-2,,"),
        ])
        .unwrap();

        assert_eq!(config.api_url, "http://cluster:8080");
        assert!(config.sync().refresh_interval.is_zero());
        assert_eq!(config.reconnect_attempts, 3);
        assert_eq!(config.subscribe, vec!["t-1".to_string(), "t-2".to_string()]);
    }

    #[test]
    fn invalid_number_names_the_variable() {
        let err = load(&[("TMON_PER_PAGE", "lots")]).unwrap_err();

        assert_matches!(
            err,
            ConfigError::Invalid { var: "TMON_PER_PAGE", ref value } if value == "lots"
        );
    }
}
