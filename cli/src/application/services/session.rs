//! Application service — deployment sessions.
//!
//! A session is either rebuilt from the stored record (`reconnect`) or bound
//! directly to a freshly created node (`ProvisionHandle::into_session`).
//! Either way no step runs until the remote shell is established.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::application::ports::{
    ConnectTarget, ProgressReporter, ProviderCapability, ProviderFactory, RemoteConnector,
    RemoteShell, SessionStore, TransferCallback,
};
use crate::application::services::retry::retry;
use crate::domain::{
    DeploymentResult, Node, NodeFilter, ProvisionError, RetryPolicy, SessionMetadata, Settings,
    render_steps,
};

/// How a session establishes its remote shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    pub retry: RetryPolicy,
    /// Per-attempt connection timeout.
    pub timeout: Duration,
}

impl ConnectOptions {
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            retry: settings.ssh_connect_policy(),
            timeout: settings.ssh_connect_timeout(),
        }
    }
}

/// An established remote shell bound to one stored session.
pub struct DeploymentSession<Sh> {
    metadata: SessionMetadata,
    node: Node,
    shell: Sh,
}

impl<Sh: RemoteShell> DeploymentSession<Sh> {
    /// Rebuild a session purely from the stored record for `name`.
    ///
    /// # Errors
    ///
    /// - `SessionNotFound` when no record exists.
    /// - `NodeLookup` when the provider no longer reports the stored node;
    ///   no connection is attempted in that case.
    /// - `Connection` when every connection attempt fails.
    pub async fn reconnect<F, S, C>(
        name: &str,
        factory: &F,
        store: &S,
        connector: &C,
        opts: &ConnectOptions,
    ) -> Result<Self>
    where
        F: ProviderFactory,
        S: SessionStore,
        C: RemoteConnector<Shell = Sh>,
    {
        if !store.exists(name).await? {
            return Err(ProvisionError::SessionNotFound(name.to_string()).into());
        }
        let metadata = store.load(name).await?;
        let provider = factory
            .connect(metadata.layout.provider, &metadata.env)
            .await?;

        let node = provider
            .list_nodes(&NodeFilter::by_id(&metadata.node_id))
            .await?
            .into_iter()
            .find(|n| n.id == metadata.node_id)
            .ok_or_else(|| ProvisionError::NodeLookup {
                name: name.to_string(),
                node_id: metadata.node_id.clone(),
                provider: provider.kind().to_string(),
            })?;
        debug!(name, node_id = %node.id, state = %node.state, "node located");

        Self::establish(metadata, node, connector, opts).await
    }

    /// Connect to `metadata.host`, retrying per `opts.retry`.
    ///
    /// # Errors
    ///
    /// Returns `ProvisionError::Connection` once every attempt failed.
    pub async fn establish<C>(
        metadata: SessionMetadata,
        node: Node,
        connector: &C,
        opts: &ConnectOptions,
    ) -> Result<Self>
    where
        C: RemoteConnector<Shell = Sh>,
    {
        let target = ConnectTarget::from_metadata(&metadata, opts.timeout);
        let target = &target;
        let shell = retry(&opts.retry, "ssh connect", move |attempt| {
            debug!(host = %target.host, attempt, "connecting");
            connector.connect(target)
        })
        .await
        .map_err(|e| ProvisionError::Connection {
            target: format!("{}@{}", target.username, target.host),
            attempts: e.attempts,
            reason: format!("{:#}", e.last),
        })?;
        info!(peer = shell.peer(), "remote shell established");

        Ok(Self {
            metadata,
            node,
            shell,
        })
    }

    /// Render and execute every step of `metadata.layout`, in order.
    ///
    /// Returns `None` when the layout declares no steps. A failing step does
    /// not stop the batch; its outcome is recorded and the next step runs.
    ///
    /// # Errors
    ///
    /// - `StepRender` before any step runs when a template cannot be resolved.
    /// - `Connection` when the transport drops mid-batch.
    pub async fn run(
        &self,
        metadata: &SessionMetadata,
        reporter: &impl ProgressReporter,
    ) -> Result<Option<DeploymentResult>> {
        let steps = render_steps(metadata)?;
        if steps.is_empty() {
            reporter.step(&format!("no deployment actions for {}", metadata.layout.name));
            return Ok(None);
        }

        let total = steps.len();
        let mut outcomes = Vec::with_capacity(total);
        for (i, step) in steps.iter().enumerate() {
            reporter.step(&format!(
                "{}: [{}/{total}] {}",
                metadata.layout.name,
                i + 1,
                step.label
            ));
            let outcome = self
                .shell
                .execute(step)
                .await
                .map_err(|e| self.transport_error(e))?;
            if outcome.succeeded() {
                debug!(step = %outcome.label, "step succeeded");
            } else {
                warn!(step = %outcome.label, exit = outcome.exit_status, "step failed");
            }
            outcomes.push(outcome);
        }

        Ok(Some(DeploymentResult {
            node: self.node.clone(),
            layout: metadata.layout.clone(),
            ssh_private_key: metadata.ssh_private_key.clone(),
            host: metadata.host.clone(),
            outcomes,
        }))
    }

    /// `run` against the session's own record.
    ///
    /// # Errors
    ///
    /// See [`DeploymentSession::run`].
    pub async fn deploy(
        &self,
        reporter: &impl ProgressReporter,
    ) -> Result<Option<DeploymentResult>> {
        self.run(&self.metadata, reporter).await
    }

    /// Upload `local` to `remote`. Directories are copied recursively.
    ///
    /// # Errors
    ///
    /// Returns an error if the local source is unreadable or the transfer fails.
    pub async fn put(
        &self,
        local: &Path,
        remote: &str,
        progress: TransferCallback<'_>,
    ) -> Result<u64> {
        info!(local = %local.display(), remote, "upload");
        self.shell.upload(local, remote, progress).await
    }

    /// Download `remote` to `local`. A trailing `/` on either path requests a
    /// recursive copy.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote source is missing or the transfer fails.
    pub async fn get(
        &self,
        remote: &str,
        local: &Path,
        progress: TransferCallback<'_>,
    ) -> Result<u64> {
        let recursive = remote.ends_with('/') || local.to_string_lossy().ends_with('/');
        info!(remote, local = %local.display(), recursive, "download");
        self.shell.download(remote, local, recursive, progress).await
    }

    #[must_use]
    pub fn metadata(&self) -> &SessionMetadata {
        &self.metadata
    }

    #[must_use]
    pub fn node(&self) -> &Node {
        &self.node
    }

    #[must_use]
    pub fn peer(&self) -> &str {
        self.shell.peer()
    }

    fn transport_error(&self, err: anyhow::Error) -> anyhow::Error {
        if err.downcast_ref::<ProvisionError>().is_some() {
            return err;
        }
        ProvisionError::Connection {
            target: format!("{}@{}", self.metadata.username, self.metadata.host),
            attempts: 1,
            reason: format!("{err:#}"),
        }
        .into()
    }
}
