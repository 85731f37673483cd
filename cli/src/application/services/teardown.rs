//! Application service — session teardown use-case.

use anyhow::{Context, Result};
use tracing::info;

use crate::application::ports::{ProgressReporter, ProviderCapability, ProviderFactory, SessionStore};
use crate::application::services::keys::delete_key_pair;
use crate::domain::{NodeFilter, ProvisionError, RetryPolicy};

/// What `destroy_session` did for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownOutcome {
    pub name: String,
    /// `false` when the node was already gone or only the record was removed.
    pub node_destroyed: bool,
    pub key_pair_deleted: bool,
}

/// Destroy the node recorded under `name`, delete its key pair, then delete
/// the record.
///
/// With `only_records` no provider call is made. The record is removed last,
/// so a failed teardown can be retried.
///
/// # Errors
///
/// Returns `SessionNotFound` when no record exists, or the first provider
/// failure.
pub async fn destroy_session(
    name: &str,
    factory: &impl ProviderFactory,
    store: &impl SessionStore,
    key_policy: &RetryPolicy,
    only_records: bool,
    reporter: &impl ProgressReporter,
) -> Result<TeardownOutcome> {
    if !store.exists(name).await? {
        return Err(ProvisionError::SessionNotFound(name.to_string()).into());
    }
    let mut outcome = TeardownOutcome {
        name: name.to_string(),
        ..TeardownOutcome::default()
    };

    if !only_records {
        let record = store.load(name).await?;
        let provider = factory.connect(record.layout.provider, &record.env).await?;

        let node = provider
            .list_nodes(&NodeFilter::by_id(&record.node_id))
            .await?
            .into_iter()
            .find(|n| n.id == record.node_id);
        if let Some(node) = node {
            reporter.step(&format!("destroying {} ({})...", node.name, node.id));
            provider
                .destroy_node(&node)
                .await
                .with_context(|| format!("failed to destroy node {}", node.id))?;
            outcome.node_destroyed = true;
        } else {
            reporter.warn(&format!(
                "node {} for {name} is already gone",
                record.node_id
            ));
        }

        if let Some(key_pair) = provider.get_key_pair(&record.key_pair).await? {
            reporter.step(&format!("deleting key pair {}...", key_pair.name));
            delete_key_pair(&provider, &key_pair, key_policy).await?;
            outcome.key_pair_deleted = true;
        }
    }

    store.delete(name).await?;
    info!(name, node_destroyed = outcome.node_destroyed, "session removed");
    reporter.success(&format!("{name} removed"));
    Ok(outcome)
}

/// Tear down every stored session. Failures are collected per session.
///
/// # Errors
///
/// Returns an error only if the stored sessions cannot be listed.
pub async fn destroy_all(
    factory: &impl ProviderFactory,
    store: &impl SessionStore,
    key_policy: &RetryPolicy,
    only_records: bool,
    reporter: &impl ProgressReporter,
) -> Result<Vec<(String, Result<TeardownOutcome>)>> {
    let mut results = Vec::new();
    for name in store.list().await? {
        let result =
            destroy_session(&name, factory, store, key_policy, only_records, reporter).await;
        results.push((name, result));
    }
    Ok(results)
}
