//! Application service — node creation use-case.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info};

use crate::application::ports::{ProgressReporter, ProviderCapability, RemoteConnector, SessionStore};
use crate::application::services::session::{ConnectOptions, DeploymentSession};
use crate::domain::{
    CreationRequest, EnvBindings, Layout, Node, NodeOptions, SessionMetadata, SshCredential,
    generate_session_id,
};

/// Drives one node creation through a provider adapter and records the
/// session once the node is running.
///
/// Failures before the final save leave no session record behind. A node
/// that the provider created before a later failure is not destroyed here;
/// the returned error names it so it can be cleaned up.
pub struct NodeLifecycleManager<'a, P, S> {
    provider: &'a P,
    store: &'a S,
}

impl<'a, P: ProviderCapability, S: SessionStore> NodeLifecycleManager<'a, P, S> {
    pub fn new(provider: &'a P, store: &'a S) -> Self {
        Self { provider, store }
    }

    /// Create the node for `layout` and persist its session metadata.
    ///
    /// Any prior record stored under `layout.name` is overwritten.
    ///
    /// # Errors
    ///
    /// Returns `ImageNotFound`/`SizeNotFound` before any remote mutation,
    /// `ProvisionTimeout` when the node never reaches a running state, or an
    /// error naming the orphaned node when metadata cannot be recorded. A
    /// failed creation names the key pair imported for it.
    pub async fn create(
        &self,
        layout: &Layout,
        credential: &SshCredential,
        env: &EnvBindings,
        reporter: &impl ProgressReporter,
    ) -> Result<ProvisionHandle> {
        let kind = self.provider.kind();
        reporter.step(&format!("resolving image and size for {}...", layout.name));
        let image = self.provider.resolve_image(&layout.runs_on).await?;
        let size = self.provider.resolve_size(&layout.constraints).await?;
        debug!(layout = %layout.name, image = %image.id, size = %size.id, "resolved");

        let session_id = generate_session_id();
        let key_pair = self
            .provider
            .import_key_pair(&session_id, &credential.public)
            .await
            .with_context(|| {
                format!(
                    "failed to register {} with {kind}",
                    credential.public.display()
                )
            })?;

        let request = CreationRequest {
            options: NodeOptions {
                name: node_name(&layout.name, &session_id),
                image,
                size,
                username: layout.username.clone(),
                key_name: key_pair.name,
                public_key: credential.public.clone(),
                policy: self.provider.security_policy(),
            },
            session_id,
            layout: layout.clone(),
            credential: credential.clone(),
            env: env.clone(),
        };

        reporter.step(&format!(
            "creating {} on {kind} ({})...",
            request.options.name, request.options.size.id
        ));
        let node = self
            .provider
            .create_node(&request.options)
            .await
            .with_context(|| {
                format!(
                    "key pair {key} on {kind} is still registered; remove it with \
                     'skyforge key-pairs rm --provider {kind} --filter {key}'",
                    key = request.options.key_name
                )
            })?;
        info!(layout = %layout.name, node_id = %node.id, "node running");

        let metadata = SessionMetadata::assemble(&request, &node).ok_or_else(|| {
            anyhow!(
                "node {} on {kind} has no public address; it was not recorded and must be destroyed manually",
                node.id
            )
        })?;

        self.store
            .save(&layout.name, &metadata)
            .await
            .with_context(|| {
                format!(
                    "node {} on {kind} is running but its session could not be saved; destroy it manually",
                    node.id
                )
            })?;
        reporter.success(&format!("{} ready at {}", layout.name, metadata.host));

        Ok(ProvisionHandle {
            node,
            layout: layout.clone(),
            metadata,
        })
    }
}

/// A freshly created node together with the session recorded for it.
#[derive(Debug, Clone)]
pub struct ProvisionHandle {
    pub node: Node,
    pub layout: Layout,
    pub metadata: SessionMetadata,
}

impl ProvisionHandle {
    /// Open the deployment session for this node without reloading the store.
    ///
    /// # Errors
    ///
    /// Returns `ProvisionError::Connection` once connection retries run out.
    pub async fn into_session<C: RemoteConnector>(
        self,
        connector: &C,
        opts: &ConnectOptions,
    ) -> Result<DeploymentSession<C::Shell>> {
        DeploymentSession::establish(self.metadata, self.node, connector, opts).await
    }
}

/// Provider-facing node name: `skyforge-<layout>-<session suffix>`, folded
/// to lowercase alphanumerics and hyphens, at most 63 characters.
#[must_use]
pub fn node_name(layout: &str, session_id: &str) -> String {
    let suffix = session_id.trim_start_matches("sf-");
    let mut folded: String = layout
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    folded.truncate(63usize.saturating_sub("skyforge-".len() + suffix.len() + 1));
    let folded = folded.trim_matches('-');
    format!("skyforge-{folded}-{suffix}")
}
