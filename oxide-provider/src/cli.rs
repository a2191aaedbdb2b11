//! Command-line host driving single engine operations.
//!
//! Configurations and recorded state are JSON files. Diagnostics go to
//! stderr; any error-severity diagnostic makes the command fail.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use crate::diagnostics::Diagnostics;
use crate::engine::Refresh;
use crate::registry::Registry;
use crate::state_file;
use crate::value::Attributes;

/// Reconcile Oxide resources against the control plane
#[derive(Parser, Debug)]
#[command(name = "oxide-provider", version, about)]
pub struct Cli {
    /// Control-plane URL (falls back to OXIDE_HOST, then OXIDE_TEST_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// API token (falls back to OXIDE_TOKEN, then OXIDE_TEST_TOKEN)
    #[arg(long)]
    pub token: Option<String>,

    /// Timeout for operations without an override, e.g. "10m"
    #[arg(long, value_parser = humantime::parse_duration)]
    pub default_timeout: Option<std::time::Duration>,

    #[command(subcommand)]
    pub command: Command,
}

/// Files an operation reads and writes.
#[derive(Args, Debug, Clone)]
pub struct Files {
    /// Desired configuration (JSON object)
    #[arg(long)]
    pub config: PathBuf,

    /// Recorded state (JSON object)
    #[arg(long)]
    pub state: PathBuf,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List registered resource kinds
    Kinds,

    /// Print the schema of a resource kind
    Schema {
        /// Resource kind, e.g. oxide_disk
        kind: String,
    },

    /// Create a resource and record its state
    Create {
        kind: String,
        #[command(flatten)]
        files: Files,
    },

    /// Refresh recorded state; removes the state file if the object is gone
    Read {
        kind: String,
        #[arg(long)]
        state: PathBuf,
    },

    /// Apply changes to mutable attributes in place
    Update {
        kind: String,
        #[command(flatten)]
        files: Files,
    },

    /// Delete a resource and remove its state file
    Delete {
        kind: String,
        #[arg(long)]
        state: PathBuf,
    },

    /// Record state for an existing object
    Import {
        kind: String,
        /// Identifier of the remote object
        id: String,
        #[arg(long)]
        state: PathBuf,
    },

    /// Show whether a configuration would create, update or replace
    Plan {
        kind: String,
        #[command(flatten)]
        files: Files,
    },
}

fn report(diagnostics: &Diagnostics) -> bool {
    for d in diagnostics.iter() {
        eprintln!("{}", d);
    }
    !diagnostics.has_error()
}

/// Run one command. Returns whether it finished without error diagnostics.
pub async fn run(command: Command, registry: &Registry) -> Result<bool> {
    match command {
        Command::Kinds => {
            for kind in registry.kinds() {
                println!("{}", kind);
            }
            Ok(true)
        }

        Command::Schema { kind } => {
            let descriptor = registry
                .describe()
                .into_iter()
                .find(|d| d.kind == kind)
                .with_context(|| format!("unknown resource kind: {}", kind))?;
            println!("{}", serde_json::to_string_pretty(&descriptor)?);
            Ok(true)
        }

        Command::Create { kind, files } => {
            let engine = registry.resolve(&kind)?;
            let desired = state_file::load_required(&files.config).await?;
            if state_file::load(&files.state).await?.is_some() {
                anyhow::bail!(
                    "{} already exists; read, update or delete it instead",
                    files.state.display()
                );
            }

            let outcome = engine.create(&desired).await;
            if let Some(state) = &outcome.value {
                state_file::save(&files.state, state).await?;
                info!("Recorded state in {}", files.state.display());
            }
            Ok(report(&outcome.diagnostics))
        }

        Command::Read { kind, state } => {
            let engine = registry.resolve(&kind)?;
            let recorded = state_file::load_required(&state).await?;

            let outcome = engine.read(&recorded).await;
            match &outcome.value {
                Some(Refresh::Present(fresh)) => {
                    if fresh != &recorded {
                        info!("State of {} changed remotely", kind);
                    }
                    state_file::save(&state, fresh).await?;
                }
                Some(Refresh::Absent) => {
                    info!("Object is gone, removing {}", state.display());
                    state_file::remove(&state).await?;
                }
                None => {}
            }
            Ok(report(&outcome.diagnostics))
        }

        Command::Update { kind, files } => {
            let engine = registry.resolve(&kind)?;
            let desired = state_file::load_required(&files.config).await?;
            let prior = state_file::load_required(&files.state).await?;

            let outcome = engine.update(&desired, &prior).await;
            if let Some(state) = &outcome.value
                && !outcome.has_error()
            {
                state_file::save(&files.state, state).await?;
            }
            Ok(report(&outcome.diagnostics))
        }

        Command::Delete { kind, state } => {
            let engine = registry.resolve(&kind)?;
            let recorded = state_file::load_required(&state).await?;

            let diagnostics = engine.delete(&recorded).await;
            if !diagnostics.has_error() {
                state_file::remove(&state).await?;
            }
            Ok(report(&diagnostics))
        }

        Command::Import { kind, id, state } => {
            let engine = registry.resolve(&kind)?;
            if state_file::load(&state).await?.is_some() {
                anyhow::bail!(
                    "{} already records an object; delete it before importing {}",
                    state.display(),
                    id
                );
            }

            let outcome = engine.import(&id).await;
            if let Some(imported) = &outcome.value {
                state_file::save(&state, imported).await?;
            }
            Ok(report(&outcome.diagnostics))
        }

        Command::Plan { kind, files } => {
            let engine = registry.resolve(&kind)?;
            let desired = state_file::load_required(&files.config).await?;
            let prior: Option<Attributes> = state_file::load(&files.state).await?;

            let outcome = engine.plan(&desired, prior.as_ref());
            if let Some(plan) = &outcome.value {
                println!("{}", serde_json::to_string_pretty(plan)?);
            }
            Ok(report(&outcome.diagnostics))
        }
    }
}
