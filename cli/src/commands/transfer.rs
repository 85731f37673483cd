//! `skyforge push` / `skyforge pull` — copy files to and from a session's node.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::ports::TransferProgress;
use crate::application::services::session::DeploymentSession;
use crate::output::progress;

/// Arguments for the push command.
#[derive(Args)]
pub struct PushArgs {
    /// Session to copy to, by layout name
    pub name: String,
    /// Local file or directory
    pub local: PathBuf,
    /// Destination path on the node
    pub remote: String,
}

/// Arguments for the pull command.
#[derive(Args)]
pub struct PullArgs {
    /// Session to copy from, by layout name
    pub name: String,
    /// Path on the node; a trailing `/` copies a directory
    pub remote: String,
    /// Local destination; a trailing `/` copies into a directory
    pub local: PathBuf,
}

/// Run `skyforge push`.
///
/// # Errors
///
/// Returns an error if the session cannot be reconnected or the transfer
/// fails.
pub async fn push(app: &AppContext, args: PushArgs) -> Result<ExitCode> {
    let session = DeploymentSession::reconnect(
        &args.name,
        &app.factory,
        &app.store,
        &app.connector,
        &app.connect_options(),
    )
    .await?;

    let pb = progress::transfer_bar(app.output.show_progress());
    let on_progress = |p: &TransferProgress<'_>| progress::track(&pb, p);
    match session.put(&args.local, &args.remote, &on_progress).await {
        Ok(bytes) => {
            progress::finish_success(&pb, &format!("{bytes} bytes sent"));
            app.output.success(&format!(
                "{} -> {}:{}",
                args.local.display(),
                session.peer(),
                args.remote
            ));
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            progress::finish_error(&pb, "upload failed");
            Err(e)
        }
    }
}

/// Run `skyforge pull`.
///
/// # Errors
///
/// Returns an error if the session cannot be reconnected or the transfer
/// fails.
pub async fn pull(app: &AppContext, args: PullArgs) -> Result<ExitCode> {
    let session = DeploymentSession::reconnect(
        &args.name,
        &app.factory,
        &app.store,
        &app.connector,
        &app.connect_options(),
    )
    .await?;

    let pb = progress::transfer_bar(app.output.show_progress());
    let on_progress = |p: &TransferProgress<'_>| progress::track(&pb, p);
    match session.get(&args.remote, &args.local, &on_progress).await {
        Ok(bytes) => {
            progress::finish_success(&pb, &format!("{bytes} bytes received"));
            app.output.success(&format!(
                "{}:{} -> {}",
                session.peer(),
                args.remote,
                args.local.display()
            ));
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            progress::finish_error(&pb, "download failed");
            Err(e)
        }
    }
}
