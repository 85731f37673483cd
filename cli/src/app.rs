//! Application context — unified state passed to every command handler.
//!
//! `AppContext` resolves the home directory, loads settings and builds the
//! production adapters once per invocation. Command handlers only borrow it.

use anyhow::Result;

use crate::application::services::session::ConnectOptions;
use crate::domain::{EnvBindings, RetryPolicy, Settings};
use crate::infra::command_runner::{DEFAULT_EXEC_TIMEOUT, TokioCommandRunner};
use crate::infra::config::{SkyforgePaths, load_settings};
use crate::infra::providers::{CloudProviderFactory, WaitPolicy};
use crate::infra::ssh::SshConnector;
use crate::infra::store::FileSessionStore;
use crate::output::{OutputContext, TerminalReporter};

/// Environment prefixes collected into a run's env bindings.
const ENV_PREFIXES: [&str; 3] = ["AWS_", "GOOGLE_", "SKYFORGE_"];

/// Output rendering flags.
pub struct OutputFlags {
    /// Disable ANSI color output.
    pub no_color: bool,
    /// Suppress non-error output.
    pub quiet: bool,
}

/// Behaviour flags.
pub struct BehaviourFlags {
    /// Skip interactive prompts (also set by `CI` / `SKYFORGE_YES` env vars).
    pub yes: bool,
}

/// Flags passed from the top-level CLI to `AppContext::new`.
pub struct AppFlags {
    /// Output rendering options.
    pub output: OutputFlags,
    /// Behaviour options.
    pub behaviour: BehaviourFlags,
}

/// Unified application context passed to every command handler.
pub struct AppContext {
    /// Terminal output context (colors, quiet mode).
    pub output: OutputContext,
    /// Home directory and config file locations.
    pub paths: SkyforgePaths,
    pub settings: Settings,
    /// Session records under `<home>/sessions`.
    pub store: FileSessionStore,
    pub factory: CloudProviderFactory,
    /// SSH transport; its runner allows long-running steps.
    pub connector: SshConnector<TokioCommandRunner>,
    /// Provider credentials and template values taken from the environment.
    pub env: EnvBindings,
    /// When `true`, skip interactive prompts and use defaults.
    ///
    /// Set when `--yes` / `-y` is passed, or when the `CI` or `SKYFORGE_YES`
    /// environment variables are present.
    pub non_interactive: bool,
}

impl AppContext {
    /// Construct an `AppContext` from top-level CLI flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be resolved or the
    /// settings file is invalid.
    pub fn new(flags: &AppFlags) -> Result<Self> {
        let ci_env = std::env::var("CI").is_ok() || std::env::var("SKYFORGE_YES").is_ok();
        let paths = SkyforgePaths::from_env()?;
        let settings = load_settings(paths.config_path())?;
        Ok(Self::assemble(
            OutputContext::new(flags.output.no_color, flags.output.quiet),
            paths,
            settings,
            collect_env(
                std::env::vars_os()
                    .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?))),
            ),
            flags.behaviour.yes || ci_env,
        ))
    }

    fn assemble(
        output: OutputContext,
        paths: SkyforgePaths,
        settings: Settings,
        env: EnvBindings,
        non_interactive: bool,
    ) -> Self {
        let store = FileSessionStore::with_dir(paths.sessions_dir());
        let factory = CloudProviderFactory::new(WaitPolicy::from_settings(&settings));
        let connector = SshConnector::new(
            TokioCommandRunner::new(DEFAULT_EXEC_TIMEOUT),
            settings.ssh.binary.clone(),
        );
        Self {
            output,
            paths,
            settings,
            store,
            factory,
            connector,
            env,
            non_interactive,
        }
    }

    /// Reporter that prints service progress through `self.output`.
    #[must_use]
    pub fn reporter(&self) -> TerminalReporter<'_> {
        TerminalReporter::new(&self.output)
    }

    #[must_use]
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions::from_settings(&self.settings)
    }

    #[must_use]
    pub fn key_pair_policy(&self) -> RetryPolicy {
        self.settings.key_pair_delete_policy()
    }

    /// Ask the user for confirmation.
    ///
    /// When `non_interactive` is `true` (CI, `--yes` flag, or `SKYFORGE_YES`
    /// env), returns `default` immediately without prompting.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal prompt fails (e.g. no TTY available).
    pub fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        if self.non_interactive {
            return Ok(default);
        }
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()?;
        Ok(confirmed)
    }
}

/// Keep the variables a run may need: provider credentials and
/// `SKYFORGE_*` template values.
fn collect_env(vars: impl IntoIterator<Item = (String, String)>) -> EnvBindings {
    vars.into_iter()
        .filter(|(k, _)| ENV_PREFIXES.iter().any(|p| k.starts_with(p)))
        .collect()
}
