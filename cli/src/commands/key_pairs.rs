//! `skyforge key-pairs` — list and remove provider key pairs.

use std::process::ExitCode;

use anyhow::Result;
use clap::Subcommand;

use crate::app::AppContext;
use crate::application::ports::{ProviderCapability, ProviderFactory};
use crate::application::services::keys::remove_key_pairs;
use crate::domain::ProviderKind;

/// Key-pair subcommands.
#[derive(Subcommand)]
pub enum KeyPairsCommand {
    /// List key pairs registered with a provider
    Ls {
        /// Provider to query (aws, google)
        #[arg(long)]
        provider: ProviderKind,
    },
    /// Delete key pairs, retrying while the provider reports them in use
    Rm {
        /// Provider to clean up (aws, google)
        #[arg(long)]
        provider: ProviderKind,
        /// Only delete key pairs whose name contains this text
        #[arg(long)]
        filter: Option<String>,
    },
}

/// Run the key-pairs command.
///
/// # Errors
///
/// Returns an error if the provider rejects the credentials or the key
/// pairs cannot be listed.
pub async fn run(app: &AppContext, cmd: KeyPairsCommand) -> Result<ExitCode> {
    match cmd {
        KeyPairsCommand::Ls { provider } => list(app, provider).await,
        KeyPairsCommand::Rm { provider, filter } => remove(app, provider, filter.as_deref()).await,
    }
}

async fn list(app: &AppContext, kind: ProviderKind) -> Result<ExitCode> {
    let provider = app.factory.connect(kind, &app.env).await?;
    let key_pairs = provider.list_key_pairs().await?;
    if key_pairs.is_empty() {
        app.output.warn(&format!("No key pairs on {kind}."));
        return Ok(ExitCode::SUCCESS);
    }
    for key_pair in &key_pairs {
        println!(
            "{}\t{}",
            key_pair.name,
            key_pair.fingerprint.as_deref().unwrap_or("-")
        );
    }
    Ok(ExitCode::SUCCESS)
}

async fn remove(app: &AppContext, kind: ProviderKind, filter: Option<&str>) -> Result<ExitCode> {
    let scope = filter.map_or_else(
        || format!("every key pair on {kind}"),
        |f| format!("key pairs on {kind} matching '{f}'"),
    );
    if !app.confirm(&format!("Delete {scope}?"), true)? {
        println!("Cancelled.");
        return Ok(ExitCode::SUCCESS);
    }

    let provider = app.factory.connect(kind, &app.env).await?;
    let removal =
        remove_key_pairs(&provider, filter, &app.key_pair_policy(), &app.reporter()).await?;
    app.output
        .success(&format!("{} key pair(s) deleted", removal.removed.len()));
    for (name, e) in &removal.failed {
        app.output.error(&format!("{name}: {e:#}"));
    }
    Ok(super::exit_code(removal.failed.is_empty()))
}
