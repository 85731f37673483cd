//! `skyforge config` — show effective settings and where they come from.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::app::AppContext;

/// Config subcommands.
#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show effective settings (file values over defaults)
    Show,
    /// Print the settings file path
    Path,
}

/// Run the config command.
///
/// # Errors
///
/// Returns an error if the settings cannot be serialized.
pub fn run(app: &AppContext, cmd: ConfigCommand) -> Result<ExitCode> {
    match cmd {
        ConfigCommand::Show => {
            app.output
                .kv("Config:", &app.paths.config_path().display().to_string());
            app.output
                .kv("Home:", &app.paths.home().display().to_string());
            let yaml =
                serde_yaml::to_string(&app.settings).context("failed to serialize settings")?;
            print!("{yaml}");
        }
        ConfigCommand::Path => println!("{}", app.paths.config_path().display()),
    }
    Ok(ExitCode::SUCCESS)
}
