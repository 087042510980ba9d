//! Client configuration loaded from environment variables.

use std::time::Duration;

use crate::backoff::BackoffConfig;
use crate::poller::{PollConfig, DEFAULT_POLL_INTERVAL, DEFAULT_REQUEST_TIMEOUT};

/// Default base URL of the forecasting service.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Errors from [`ClientConfig::from_env`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} has an invalid value: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Connection and polling configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the forecasting service.
    pub api_url: String,
    /// Polling behaviour shared by every tracked job.
    pub poll: PollConfig,
}

impl ClientConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default                 |
    /// |--------------------------------|-------------------------|
    /// | `JOB_API_URL`                  | `http://localhost:8000` |
    /// | `JOB_POLL_INTERVAL_MS`         | `2000`                  |
    /// | `JOB_BACKOFF_MULTIPLIER`       | `2`                     |
    /// | `JOB_MAX_BACKOFF_MS`           | 5 x poll interval       |
    /// | `JOB_REQUEST_TIMEOUT_SECS`     | `30`                    |
    /// | `JOB_MAX_CONSECUTIVE_FAILURES` | unset (retry forever)   |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = lookup("JOB_API_URL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let interval = parse::<u64>(&lookup, "JOB_POLL_INTERVAL_MS")?
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_POLL_INTERVAL);
        if interval.is_zero() {
            return Err(invalid("JOB_POLL_INTERVAL_MS", "0"));
        }

        let mut backoff = BackoffConfig::for_interval(interval);
        if let Some(multiplier) = parse::<f64>(&lookup, "JOB_BACKOFF_MULTIPLIER")? {
            if !multiplier.is_finite() || multiplier < 1.0 {
                return Err(invalid("JOB_BACKOFF_MULTIPLIER", &multiplier.to_string()));
            }
            backoff.multiplier = multiplier;
        }
        if let Some(max_ms) = parse::<u64>(&lookup, "JOB_MAX_BACKOFF_MS")? {
            backoff.max_delay = Duration::from_millis(max_ms);
        }

        let request_timeout = parse::<u64>(&lookup, "JOB_REQUEST_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let max_consecutive_failures = parse::<u32>(&lookup, "JOB_MAX_CONSECUTIVE_FAILURES")?;
        if max_consecutive_failures == Some(0) {
            return Err(invalid("JOB_MAX_CONSECUTIVE_FAILURES", "0"));
        }

        Ok(Self {
            api_url,
            poll: PollConfig {
                interval,
                backoff,
                request_timeout,
                max_consecutive_failures,
            },
        })
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            poll: PollConfig::default(),
        }
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| invalid(var, &raw)),
    }
}

fn invalid(var: &'static str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<ClientConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClientConfig::from_lookup(|var| map.get(var).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = load(&[]).unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.poll, PollConfig::default());
    }

    #[test]
    fn interval_override_moves_backoff_cap() {
        let config = load(&[("JOB_POLL_INTERVAL_MS", "500")]).unwrap();
        assert_eq!(config.poll.interval, Duration::from_millis(500));
        assert_eq!(config.poll.backoff.max_delay, Duration::from_millis(2500));
    }

    #[test]
    fn explicit_values_are_applied() {
        let config = load(&[
            ("JOB_API_URL", "http://forecast:9000"),
            ("JOB_BACKOFF_MULTIPLIER", "3"),
            ("JOB_MAX_BACKOFF_MS", "20000"),
            ("JOB_REQUEST_TIMEOUT_SECS", "5"),
            ("JOB_MAX_CONSECUTIVE_FAILURES", "8"),
        ])
        .unwrap();
        assert_eq!(config.api_url, "http://forecast:9000");
        assert_eq!(config.poll.backoff.multiplier, 3.0);
        assert_eq!(config.poll.backoff.max_delay, Duration::from_secs(20));
        assert_eq!(config.poll.request_timeout, Duration::from_secs(5));
        assert_eq!(config.poll.max_consecutive_failures, Some(8));
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let err = load(&[("JOB_POLL_INTERVAL_MS", "soon")]).unwrap_err();
        assert_matches!(err, ConfigError::Invalid { var: "JOB_POLL_INTERVAL_MS", .. });
    }

    #[test]
    fn zero_interval_and_shrinking_backoff_are_rejected() {
        assert_matches!(
            load(&[("JOB_POLL_INTERVAL_MS", "0")]),
            Err(ConfigError::Invalid { var: "JOB_POLL_INTERVAL_MS", .. })
        );
        assert_matches!(
            load(&[("JOB_BACKOFF_MULTIPLIER", "0.5")]),
            Err(ConfigError::Invalid { var: "JOB_BACKOFF_MULTIPLIER", .. })
        );
        assert_matches!(
            load(&[("JOB_MAX_CONSECUTIVE_FAILURES", "0")]),
            Err(ConfigError::Invalid { var: "JOB_MAX_CONSECUTIVE_FAILURES", .. })
        );
    }
}
