//! CLI argument parsing with clap derive

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::app::{AppContext, AppFlags, BehaviourFlags, OutputFlags};
use crate::commands;

/// Provision cloud nodes from layouts and deploy scripted steps onto them
#[derive(Parser)]
#[command(
    name = "skyforge",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Answer yes to confirmation prompts
    #[arg(short, long, global = true)]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create nodes for layouts and deploy their steps
    Launch(commands::launch::LaunchArgs),

    /// Re-run the steps of stored sessions
    Deploy(commands::deploy::DeployArgs),

    /// Copy a local file or directory to a session's node
    Push(commands::transfer::PushArgs),

    /// Copy a file or directory from a session's node
    Pull(commands::transfer::PullArgs),

    /// Destroy nodes and remove their session records
    Destroy(commands::destroy::DestroyArgs),

    /// List stored sessions
    Sessions,

    /// Manage provider key pairs
    #[command(subcommand)]
    KeyPairs(commands::key_pairs::KeyPairsCommand),

    /// Show configuration
    #[command(subcommand)]
    Config(commands::config::ConfigCommand),

    /// Show version
    Version,
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the context cannot be built or the command fails.
    pub async fn run(self) -> Result<ExitCode> {
        let Cli {
            quiet,
            no_color,
            yes,
            command,
        } = self;

        if let Command::Version = command {
            commands::version::run();
            return Ok(ExitCode::SUCCESS);
        }

        let app = AppContext::new(&AppFlags {
            output: OutputFlags { no_color, quiet },
            behaviour: BehaviourFlags { yes },
        })?;

        match command {
            Command::Launch(args) => commands::launch::run(&app, args).await,
            Command::Deploy(args) => commands::deploy::run(&app, args).await,
            Command::Push(args) => commands::transfer::push(&app, args).await,
            Command::Pull(args) => commands::transfer::pull(&app, args).await,
            Command::Destroy(args) => commands::destroy::run(&app, args).await,
            Command::Sessions => commands::sessions::run(&app).await,
            Command::KeyPairs(cmd) => commands::key_pairs::run(&app, cmd).await,
            Command::Config(cmd) => commands::config::run(&app, cmd),
            Command::Version => {
                commands::version::run();
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}
