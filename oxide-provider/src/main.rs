//! oxide-provider: run one reconciliation operation against an Oxide
//! control plane.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use oxide_provider::cli::{self, Cli};
use oxide_provider::{ProviderConfig, Registry};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "oxide_provider=info,oxide_api=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Cli::parse();

    let mut config = ProviderConfig::resolve(args.host.clone(), args.token.clone())?;
    if let Some(timeout) = args.default_timeout {
        config = config.with_default_timeout(timeout)?;
    }
    debug!("Provider configuration: {:?}", config);

    let api = Arc::new(config.client()?);
    debug!("Using control plane at {}", api.host());
    let registry = Registry::builtin(config, api)?;

    if cli::run(args.command, &registry).await? {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
