//! `skyforge deploy NAME...` — run a stored session's steps again.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::services::session::DeploymentSession;

/// Arguments for the deploy command.
#[derive(Args)]
pub struct DeployArgs {
    /// Sessions to deploy, by layout name
    #[arg(required = true)]
    pub names: Vec<String>,
}

/// Run `skyforge deploy`.
///
/// Sessions are deployed one after another. A session that cannot be
/// reconnected is reported and the remaining ones still run.
///
/// # Errors
///
/// Per-session failures are printed and reflected in the exit code; no
/// error is returned.
pub async fn run(app: &AppContext, args: DeployArgs) -> Result<ExitCode> {
    let reporter = app.reporter();
    let opts = app.connect_options();
    let mut all_ok = true;
    for name in &args.names {
        let outcome = async {
            let session =
                DeploymentSession::reconnect(name, &app.factory, &app.store, &app.connector, &opts)
                    .await?;
            session.deploy(&reporter).await
        }
        .await;
        match outcome {
            Ok(Some(result)) => {
                app.output.deployment_summary(&result);
                all_ok &= result.succeeded();
            }
            Ok(None) => {}
            Err(e) => {
                app.output.error(&format!("{name}: {e:#}"));
                all_ok = false;
            }
        }
    }
    Ok(super::exit_code(all_ok))
}
