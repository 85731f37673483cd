//! Cloud provider adapters.
//!
//! Each adapter drives its vendor CLI through a `CommandRunner` and
//! translates JSON output into domain types. `CloudProvider` is the closed
//! set of adapters; orchestration only ever sees `ProviderCapability`.

pub mod aws;
pub mod gce;

#[cfg(test)]
pub(crate) mod test_support;

use std::future::Future;
use std::path::Path;
use std::process::Output;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tracing::debug;

use crate::application::ports::{CommandRunner, ProviderCapability, ProviderFactory};
use crate::domain::{
    EnvBindings, Image, KeyPair, Node, NodeFilter, NodeOptions, NodeState, ProvisionError,
    ProviderKind, SecurityPolicy, Settings, Size, SizeConstraints,
};
use crate::infra::command_runner::{DEFAULT_CMD_TIMEOUT, TokioCommandRunner};

pub use aws::AwsProvider;
pub use gce::GoogleProvider;

/// Bounded wait for a new node to report `running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub period: Duration,
    pub timeout: Duration,
}

impl WaitPolicy {
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            period: settings.wait_period(),
            timeout: settings.wait_timeout(),
        }
    }
}

/// Poll `describe` until the node is running or `policy.timeout` elapses.
///
/// `describe` yields `None` while the provider does not report the node yet;
/// freshly launched instances are often invisible for a few polls.
///
/// # Errors
///
/// Returns `ProvisionTimeout` naming `node_id` when the wait elapses, or the
/// first error `describe` returns, wrapped so that it names the node left
/// behind.
pub(crate) async fn wait_until_running<F, Fut>(
    policy: &WaitPolicy,
    node_id: &str,
    mut describe: F,
) -> Result<Node>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<Node>>>,
{
    let started = Instant::now();
    loop {
        let polled = describe().await.with_context(|| {
            format!("node {node_id} was created but its state could not be read; destroy it manually")
        })?;
        match polled {
            Some(node) if node.state == NodeState::Running => return Ok(node),
            Some(node) => debug!(node_id, state = %node.state, "polled node state"),
            None => debug!(node_id, "node not visible yet"),
        }
        if started.elapsed() >= policy.timeout {
            return Err(ProvisionError::ProvisionTimeout {
                node_id: node_id.to_string(),
                waited_secs: policy.timeout.as_secs(),
            }
            .into());
        }
        tokio::time::sleep(policy.period).await;
    }
}

/// Fail with the command's stderr unless it exited 0.
pub(crate) fn ensure_success(output: &Output, what: &str) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }
    anyhow::bail!(
        "{what} failed ({}): {}",
        output.status,
        String::from_utf8_lossy(&output.stderr).trim()
    )
}

/// Parse the stdout of a successful command as JSON.
pub(crate) fn parse_json<T: DeserializeOwned>(output: &Output, what: &str) -> Result<T> {
    ensure_success(output, what)?;
    serde_json::from_slice(&output.stdout).with_context(|| format!("parsing {what} output"))
}

pub(crate) fn stderr_contains(output: &Output, needle: &str) -> bool {
    String::from_utf8_lossy(&output.stderr).contains(needle)
}

pub(crate) fn missing_binding(provider: ProviderKind, key: &str) -> anyhow::Error {
    ProvisionError::Authentication {
        provider: provider.to_string(),
        reason: format!("{key} is not set"),
    }
    .into()
}

/// Every supported provider.
pub enum CloudProvider<R: CommandRunner> {
    Aws(AwsProvider<R>),
    Google(GoogleProvider<R>),
}

macro_rules! delegate {
    ($self:ident, $p:ident => $call:expr) => {
        match $self {
            CloudProvider::Aws($p) => $call,
            CloudProvider::Google($p) => $call,
        }
    };
}

impl<R: CommandRunner> ProviderCapability for CloudProvider<R> {
    fn kind(&self) -> ProviderKind {
        delegate!(self, p => p.kind())
    }

    fn security_policy(&self) -> SecurityPolicy {
        delegate!(self, p => p.security_policy())
    }

    async fn resolve_image(&self, reference: &str) -> Result<Image> {
        delegate!(self, p => p.resolve_image(reference).await)
    }

    async fn resolve_size(&self, constraints: &SizeConstraints) -> Result<Size> {
        delegate!(self, p => p.resolve_size(constraints).await)
    }

    async fn create_node(&self, opts: &NodeOptions) -> Result<Node> {
        delegate!(self, p => p.create_node(opts).await)
    }

    async fn destroy_node(&self, node: &Node) -> Result<()> {
        delegate!(self, p => p.destroy_node(node).await)
    }

    async fn list_nodes(&self, filter: &NodeFilter) -> Result<Vec<Node>> {
        delegate!(self, p => p.list_nodes(filter).await)
    }

    async fn import_key_pair(&self, name: &str, public_key_path: &Path) -> Result<KeyPair> {
        delegate!(self, p => p.import_key_pair(name, public_key_path).await)
    }

    async fn get_key_pair(&self, name: &str) -> Result<Option<KeyPair>> {
        delegate!(self, p => p.get_key_pair(name).await)
    }

    async fn delete_key_pair(&self, key_pair: &KeyPair) -> Result<()> {
        delegate!(self, p => p.delete_key_pair(key_pair).await)
    }

    async fn list_key_pairs(&self) -> Result<Vec<KeyPair>> {
        delegate!(self, p => p.list_key_pairs().await)
    }
}

/// Production factory: one vendor-CLI runner per connected adapter, carrying
/// that adapter's credentials as child-process environment.
pub struct CloudProviderFactory {
    wait: WaitPolicy,
}

impl CloudProviderFactory {
    #[must_use]
    pub fn new(wait: WaitPolicy) -> Self {
        Self { wait }
    }
}

impl ProviderFactory for CloudProviderFactory {
    type Provider = CloudProvider<TokioCommandRunner>;

    async fn connect(&self, kind: ProviderKind, env: &EnvBindings) -> Result<Self::Provider> {
        debug!(provider = %kind, "connecting");
        match kind {
            ProviderKind::Aws => {
                let runner = TokioCommandRunner::new(DEFAULT_CMD_TIMEOUT).with_envs(aws::cli_env(env));
                Ok(CloudProvider::Aws(AwsProvider::connect(runner, env, self.wait).await?))
            }
            ProviderKind::Google => {
                let runner = TokioCommandRunner::new(DEFAULT_CMD_TIMEOUT).with_envs(gce::cli_env(env));
                Ok(CloudProvider::Google(
                    GoogleProvider::connect(runner, env, self.wait).await?,
                ))
            }
        }
    }
}
