// Effective configuration command

use anyhow::Result;
use serde::Serialize;
use sightflow_chain::ChainConfig;
use sightflow_workflow::FlowConfig;

use crate::output::{print_field, OutputFormat};
use crate::settings::Settings;

#[derive(Serialize)]
struct EffectiveConfig {
    chain: ChainConfig,
    flow: FlowConfig,
}

pub fn run(settings: &Settings, output: OutputFormat) -> Result<()> {
    let (chain, flow) = settings.resolve()?;

    if !output.is_text() {
        return output.print_value(&EffectiveConfig { chain, flow });
    }

    print_field("Chain id", &chain.chain_id.to_string());
    print_field("Latency", &format!("{:?}", chain.callback_latency));
    print_field("Noise", &chain.noise.to_string());
    print_field("Redeliver", &chain.redeliver.to_string());
    print_field("Poll every", &format!("{:?}", flow.poll_interval));
    let timeout = match flow.step_timeout {
        Some(timeout) => format!("{timeout:?}"),
        None => "none".to_string(),
    };
    print_field("Step timeout", &timeout);
    Ok(())
}
