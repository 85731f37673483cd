//! `skyforge destroy NAME... | --all` — tear down nodes and their records.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::ports::SessionStore;
use crate::application::services::teardown::{TeardownOutcome, destroy_all, destroy_session};

/// Arguments for the destroy command.
#[derive(Args)]
pub struct DestroyArgs {
    /// Sessions to destroy, by layout name
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    pub names: Vec<String>,

    /// Destroy every stored session
    #[arg(long)]
    pub all: bool,

    /// Remove session records without calling the provider
    #[arg(long)]
    pub only_records: bool,
}

/// Run `skyforge destroy`.
///
/// # Errors
///
/// Returns an error if the stored sessions cannot be listed or the
/// confirmation prompt fails.
pub async fn run(app: &AppContext, args: DestroyArgs) -> Result<ExitCode> {
    let targets = if args.all {
        app.store.list().await?
    } else {
        args.names.clone()
    };
    if targets.is_empty() {
        app.output.warn("No sessions to destroy.");
        return Ok(ExitCode::SUCCESS);
    }

    if !app.output.quiet {
        println!();
        if args.only_records {
            println!("This will forget these sessions (their nodes keep running):");
        } else {
            println!("This will permanently destroy:");
        }
        for name in &targets {
            println!("  • {name}");
        }
        println!();
    }
    if !app.confirm("Continue?", true)? {
        println!("Cancelled.");
        return Ok(ExitCode::SUCCESS);
    }

    let reporter = app.reporter();
    let policy = app.key_pair_policy();
    let results: Vec<(String, Result<TeardownOutcome>)> = if args.all {
        destroy_all(&app.factory, &app.store, &policy, args.only_records, &reporter).await?
    } else {
        let mut results = Vec::with_capacity(targets.len());
        for name in targets {
            let result = destroy_session(
                &name,
                &app.factory,
                &app.store,
                &policy,
                args.only_records,
                &reporter,
            )
            .await;
            results.push((name, result));
        }
        results
    };

    let mut all_ok = true;
    for (name, result) in results {
        if let Err(e) = result {
            app.output.error(&format!("{name}: {e:#}"));
            all_ok = false;
        }
    }
    Ok(super::exit_code(all_ok))
}
