//! `skyforge sessions` — list stored sessions.

use std::process::ExitCode;

use anyhow::Result;

use crate::app::AppContext;
use crate::application::ports::SessionStore;

/// Run `skyforge sessions`.
///
/// Prints one tab-separated line per session: name, provider, host, node id
/// and creation time. A record that cannot be read is reported and skipped.
///
/// # Errors
///
/// Returns an error if the session directory cannot be listed.
pub async fn run(app: &AppContext) -> Result<ExitCode> {
    let names = app.store.list().await?;
    if names.is_empty() {
        app.output
            .warn("No sessions recorded. Run 'skyforge launch' to create one.");
        return Ok(ExitCode::SUCCESS);
    }
    let mut all_ok = true;
    for name in names {
        match app.store.load(&name).await {
            Ok(meta) => println!(
                "{name}\t{}\t{}\t{}\t{}",
                meta.layout.provider,
                meta.host,
                meta.node_id,
                meta.created_at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
            Err(e) => {
                app.output.error(&format!("{name}: {e:#}"));
                all_ok = false;
            }
        }
    }
    Ok(super::exit_code(all_ok))
}
