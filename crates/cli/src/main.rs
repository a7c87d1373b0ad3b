// Sightflow CLI
//
// Design Decision: Use clap derive for ergonomic argument parsing.
// Design Decision: Every tuning flag falls back to a SIGHTFLOW_* variable, .env included.
// Design Decision: Support text/json/yaml output formats for scripting.
// Design Decision: Logs go to stderr so stdout carries only the report.

mod commands;
mod output;
mod settings;

use clap::{Parser, Subcommand};
use sightflow_scenarios::Scenario;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::settings::Settings;

#[derive(Parser)]
#[command(name = "sightflow")]
#[command(about = "Sightflow CLI - Run oracle request/callback workflows on a simulated chain")]
#[command(version)]
pub struct Cli {
    /// Output format
    #[arg(long, short, global = true, default_value = "text", value_parser = ["text", "json", "yaml"])]
    pub output: String,

    #[command(flatten)]
    pub settings: Settings,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Decrypt two random euint64 values and their encrypted sum
    AsyncDecrypt {
        /// First operand (random if omitted)
        #[arg(long, requires = "b")]
        a: Option<u64>,

        /// Second operand (random if omitted)
        #[arg(long, requires = "a")]
        b: Option<u64>,
    },

    /// Confidential token lifecycle: mint, burn, transfer, decrypt, approve
    Token,

    /// Spend an allowance with transfer_from
    TransferFrom,

    /// Share an encrypted value with a second contract and decrypt it there
    ShareAcl,

    /// Deploy a faucet token and claim from it
    Faucet,

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_file = dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sightflow=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Some(path) = env_file {
        tracing::debug!(path = %path.display(), "loaded environment file");
    }

    let output_format = output::OutputFormat::from_str(&cli.output);

    let scenario = match cli.command {
        Commands::AsyncDecrypt { a, b } => Scenario::AsyncDecrypt(a.zip(b)),
        Commands::Token => Scenario::TokenLifecycle,
        Commands::TransferFrom => Scenario::TransferFrom,
        Commands::ShareAcl => Scenario::AclShare,
        Commands::Faucet => Scenario::Faucet,
        Commands::Config => return commands::config::run(&cli.settings, output_format),
    };

    commands::scenario::run(scenario, &cli.settings, output_format).await
}
