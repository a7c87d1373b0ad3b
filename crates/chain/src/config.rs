//! Simulated chain configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable for the oracle callback latency (milliseconds)
pub const CALLBACK_LATENCY_ENV: &str = "SIGHTFLOW_CALLBACK_LATENCY_MS";

/// Environment variable for the chain id
pub const CHAIN_ID_ENV: &str = "SIGHTFLOW_CHAIN_ID";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: expected an unsigned integer")]
    InvalidNumber { var: &'static str, value: String },
}

/// Network parameters and fault injection for [`SimulatedChain`](crate::SimulatedChain)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChainConfig {
    pub chain_id: u64,

    /// Delay between a request being mined and the oracle answering it
    #[serde(with = "sightflow_core::duration_millis")]
    pub callback_latency: Duration,

    /// Emit a stray callback with a foreign request id before each real one
    pub noise: bool,

    /// Deliver every callback twice
    pub redeliver: bool,

    /// Buffered events per subscriber before it starts lagging
    pub event_capacity: usize,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: 9000,
            callback_latency: Duration::from_millis(50),
            noise: false,
            redeliver: false,
            event_capacity: 256,
        }
    }
}

impl ChainConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `SIGHTFLOW_CALLBACK_LATENCY_MS` / `SIGHTFLOW_CHAIN_ID`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(millis) = read_number(CALLBACK_LATENCY_ENV)? {
            config.callback_latency = Duration::from_millis(millis);
        }

        if let Some(chain_id) = read_number(CHAIN_ID_ENV)? {
            config.chain_id = chain_id;
        }

        Ok(config)
    }

    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    pub fn with_callback_latency(mut self, latency: Duration) -> Self {
        self.callback_latency = latency;
        self
    }

    pub fn with_noise(mut self, noise: bool) -> Self {
        self.noise = noise;
        self
    }

    pub fn with_redelivery(mut self, redeliver: bool) -> Self {
        self.redeliver = redeliver;
        self
    }

    /// Set the event buffer size (at least 1)
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

fn read_number(var: &'static str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ChainConfig::default();
        assert_eq!(config.chain_id, 9000);
        assert_eq!(config.callback_latency, Duration::from_millis(50));
        assert!(!config.noise);
        assert!(!config.redeliver);
    }

    #[test]
    fn test_builder() {
        let config = ChainConfig::new()
            .with_chain_id(31337)
            .with_callback_latency(Duration::ZERO)
            .with_noise(true)
            .with_redelivery(true)
            .with_event_capacity(0);

        assert_eq!(config.chain_id, 31337);
        assert_eq!(config.callback_latency, Duration::ZERO);
        assert!(config.noise && config.redeliver);
        assert_eq!(config.event_capacity, 1);
    }

    #[test]
    fn test_read_number_rejects_garbage() {
        const VAR: &str = "SIGHTFLOW_TEST_CHAIN_READ_NUMBER";
        std::env::set_var(VAR, "-3");

        assert_eq!(
            read_number(VAR),
            Err(ConfigError::InvalidNumber {
                var: VAR,
                value: "-3".into()
            })
        );
    }

    #[test]
    fn test_latency_serialized_as_millis() {
        let json = serde_json::to_value(ChainConfig::default()).unwrap();
        assert_eq!(json["callback_latency"], 50);
    }
}
