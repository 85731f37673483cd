//! Application service — concurrent launch of layouts.
//!
//! Each replica gets its own provider adapter from the factory; creations
//! run concurrently and finish in any order.

use anyhow::Result;
use futures_util::future::join_all;
use tracing::info;

use crate::application::ports::{ProgressReporter, ProviderFactory, RemoteConnector, SessionStore};
use crate::application::services::provision::{NodeLifecycleManager, ProvisionHandle};
use crate::application::services::session::ConnectOptions;
use crate::domain::{DeploymentResult, EnvBindings, Layout, LayoutError};

/// Collaborators shared by every replica of one launch.
pub struct LaunchContext<'a, F, S, C, R> {
    pub factory: &'a F,
    pub store: &'a S,
    pub connector: &'a C,
    pub connect: ConnectOptions,
    pub env: &'a EnvBindings,
    pub reporter: &'a R,
    /// Run each layout's steps right after its node is up.
    pub deploy: bool,
}

/// What happened to one replica.
#[derive(Debug)]
pub struct ReplicaReport {
    pub handle: ProvisionHandle,
    /// `None` when deployment was skipped or the layout has no steps.
    pub deployment: Option<DeploymentResult>,
}

impl ReplicaReport {
    /// `true` unless a deployment step exited non-zero.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.deployment
            .as_ref()
            .is_none_or(DeploymentResult::succeeded)
    }
}

/// Launch every replica of every layout concurrently.
///
/// Results are returned in replica order; a failing replica does not abort
/// its siblings.
pub async fn launch_all<F, S, C, R>(
    layouts: &[Layout],
    ctx: &LaunchContext<'_, F, S, C, R>,
) -> Vec<(String, Result<ReplicaReport>)>
where
    F: ProviderFactory,
    S: SessionStore,
    C: RemoteConnector,
    R: ProgressReporter,
{
    let replicas: Vec<Layout> = layouts.iter().flat_map(Layout::replicas).collect();
    info!(count = replicas.len(), "launching");
    let runs = replicas.iter().map(|layout| launch_one(layout, ctx));
    let results = join_all(runs).await;
    replicas
        .into_iter()
        .map(|l| l.name)
        .zip(results)
        .collect()
}

async fn launch_one<F, S, C, R>(
    layout: &Layout,
    ctx: &LaunchContext<'_, F, S, C, R>,
) -> Result<ReplicaReport>
where
    F: ProviderFactory,
    S: SessionStore,
    C: RemoteConnector,
    R: ProgressReporter,
{
    let credential = layout
        .ssh
        .clone()
        .ok_or_else(|| LayoutError::MissingCredential(layout.name.clone()))?;
    let provider = ctx.factory.connect(layout.provider, ctx.env).await?;
    let handle = NodeLifecycleManager::new(&provider, ctx.store)
        .create(layout, &credential, ctx.env, ctx.reporter)
        .await?;

    if !ctx.deploy {
        return Ok(ReplicaReport {
            handle,
            deployment: None,
        });
    }
    let session = handle
        .clone()
        .into_session(ctx.connector, &ctx.connect)
        .await?;
    let deployment = session.deploy(ctx.reporter).await?;
    Ok(ReplicaReport { handle, deployment })
}
