// Chain and workflow settings from flags, environment and defaults

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use sightflow_chain::config::{CALLBACK_LATENCY_ENV, CHAIN_ID_ENV};
use sightflow_chain::ChainConfig;
use sightflow_workflow::config::{POLL_INTERVAL_ENV, STEP_TIMEOUT_ENV};
use sightflow_workflow::FlowConfig;

#[derive(Args, Debug)]
pub struct Settings {
    /// Interval between completion checks while a step waits (ms)
    #[arg(long, global = true, env = POLL_INTERVAL_ENV)]
    pub poll_interval_ms: Option<u64>,

    /// Longest a step waits for its callback (ms, 0 = no limit)
    #[arg(long, global = true, env = STEP_TIMEOUT_ENV)]
    pub step_timeout_ms: Option<u64>,

    /// Oracle callback latency of the simulated chain (ms)
    #[arg(long, global = true, env = CALLBACK_LATENCY_ENV)]
    pub latency_ms: Option<u64>,

    /// Chain id reported by the simulated chain
    #[arg(long, global = true, env = CHAIN_ID_ENV)]
    pub chain_id: Option<u64>,

    /// Emit a stray callback with a foreign request id before each real one
    #[arg(long, global = true, env = "SIGHTFLOW_NOISE")]
    pub noise: bool,

    /// Deliver every callback twice
    #[arg(long, global = true, env = "SIGHTFLOW_REDELIVER")]
    pub redeliver: bool,
}

impl Settings {
    /// Environment-derived configs with flags applied on top
    pub fn resolve(&self) -> Result<(ChainConfig, FlowConfig)> {
        let mut chain = ChainConfig::from_env().context("invalid chain configuration")?;
        let mut flow = FlowConfig::from_env().context("invalid workflow configuration")?;

        if let Some(millis) = self.poll_interval_ms {
            flow = flow.with_poll_interval(Duration::from_millis(millis));
        }
        flow = match self.step_timeout_ms {
            Some(0) => flow.without_step_timeout(),
            Some(millis) => flow.with_step_timeout(Duration::from_millis(millis)),
            None => flow,
        };

        if let Some(millis) = self.latency_ms {
            chain = chain.with_callback_latency(Duration::from_millis(millis));
        }
        if let Some(chain_id) = self.chain_id {
            chain = chain.with_chain_id(chain_id);
        }
        if self.noise {
            chain = chain.with_noise(true);
        }
        if self.redeliver {
            chain = chain.with_redelivery(true);
        }

        Ok((chain, flow))
    }
}
