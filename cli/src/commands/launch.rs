//! `skyforge launch [-f FILE] [NAME...] [--no-deploy]` — create nodes and deploy.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::services::launch::{LaunchContext, launch_all};
use crate::infra::layout::{load_layouts, select_layouts};

/// Arguments for the launch command.
#[derive(Args)]
pub struct LaunchArgs {
    /// Layouts file
    #[arg(short, long, default_value = "layouts.yaml")]
    pub file: PathBuf,

    /// Layouts to launch (default: all in the file)
    pub names: Vec<String>,

    /// Create nodes without running their steps
    #[arg(long)]
    pub no_deploy: bool,
}

/// Run `skyforge launch`.
///
/// Every replica is attempted; the exit code is non-zero if any replica
/// failed to launch or any step exited non-zero.
///
/// # Errors
///
/// Returns an error if the layouts file cannot be loaded.
pub async fn run(app: &AppContext, args: LaunchArgs) -> Result<ExitCode> {
    let layouts = select_layouts(load_layouts(&args.file)?, &args.names)?;
    let reporter = app.reporter();
    let ctx = LaunchContext {
        factory: &app.factory,
        store: &app.store,
        connector: &app.connector,
        connect: app.connect_options(),
        env: &app.env,
        reporter: &reporter,
        deploy: !args.no_deploy,
    };

    let mut all_ok = true;
    for (name, result) in launch_all(&layouts, &ctx).await {
        match result {
            Ok(report) => {
                match &report.deployment {
                    Some(deployment) => app.output.deployment_summary(deployment),
                    None => app
                        .output
                        .kv(&format!("{name}:"), &report.handle.metadata.login_command()),
                }
                all_ok &= report.succeeded();
            }
            Err(e) => {
                app.output.error(&format!("{name}: {e:#}"));
                all_ok = false;
            }
        }
    }
    Ok(super::exit_code(all_ok))
}
