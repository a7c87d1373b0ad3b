//! Workflow timing configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable for the barrier poll interval (milliseconds)
pub const POLL_INTERVAL_ENV: &str = "SIGHTFLOW_POLL_INTERVAL_MS";

/// Environment variable for the per-step callback timeout (milliseconds, 0 = unbounded)
pub const STEP_TIMEOUT_ENV: &str = "SIGHTFLOW_STEP_TIMEOUT_MS";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: expected milliseconds")]
    InvalidMillis { var: &'static str, value: String },
}

/// Timing knobs for the runner and its barrier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlowConfig {
    /// How often a waiting step re-checks its completion flag
    #[serde(with = "sightflow_core::duration_millis")]
    pub poll_interval: Duration,

    /// Longest a step waits for its callback (None = wait forever)
    #[serde(with = "sightflow_core::duration_millis::option")]
    pub step_timeout: Option<Duration>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            step_timeout: Some(Duration::from_secs(120)),
        }
    }
}

impl FlowConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `SIGHTFLOW_POLL_INTERVAL_MS` / `SIGHTFLOW_STEP_TIMEOUT_MS`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(millis) = read_millis(POLL_INTERVAL_ENV)? {
            config.poll_interval = Duration::from_millis(millis.max(1));
        }

        if let Some(millis) = read_millis(STEP_TIMEOUT_ENV)? {
            config.step_timeout = (millis > 0).then(|| Duration::from_millis(millis));
        }

        Ok(config)
    }

    /// Set the poll interval (clamped to at least 1ms)
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = Some(timeout);
        self
    }

    /// Wait for callbacks indefinitely
    pub fn without_step_timeout(mut self) -> Self {
        self.step_timeout = None;
        self
    }
}

fn read_millis(var: &'static str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidMillis { var, value }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FlowConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.step_timeout, Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_builder() {
        let config = FlowConfig::new()
            .with_poll_interval(Duration::ZERO)
            .with_step_timeout(Duration::from_secs(5));

        assert_eq!(config.poll_interval, Duration::from_millis(1));
        assert_eq!(config.step_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.without_step_timeout().step_timeout, None);
    }

    #[test]
    fn test_read_millis() {
        // Variable names unique to this test; other tests never set them
        const VALID: &str = "SIGHTFLOW_TEST_READ_MILLIS_VALID";
        const INVALID: &str = "SIGHTFLOW_TEST_READ_MILLIS_INVALID";
        const UNSET: &str = "SIGHTFLOW_TEST_READ_MILLIS_UNSET";

        std::env::set_var(VALID, " 750 ");
        std::env::set_var(INVALID, "soon");

        assert_eq!(read_millis(VALID), Ok(Some(750)));
        assert_eq!(read_millis(UNSET), Ok(None));
        assert_eq!(
            read_millis(INVALID),
            Err(ConfigError::InvalidMillis {
                var: INVALID,
                value: "soon".into()
            })
        );
    }

    #[test]
    fn test_serialization_uses_millis() {
        let config = FlowConfig::new().with_poll_interval(Duration::from_millis(250));

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["poll_interval"], 250);
        assert_eq!(json["step_timeout"], 120_000);

        let unbounded = serde_json::to_value(config.clone().without_step_timeout()).unwrap();
        assert!(unbounded["step_timeout"].is_null());

        let parsed: FlowConfig = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_zero_step_timeout_deserializes_as_unbounded() {
        let config: FlowConfig =
            serde_json::from_str(r#"{"poll_interval": 500, "step_timeout": 0}"#).unwrap();
        assert_eq!(config.step_timeout, None);
    }
}
