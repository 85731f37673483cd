//! Application service — provider key-pair cleanup.
//!
//! Deletion is the one provider call that retries: providers report a key
//! pair as still in use for a while after the node holding it is gone.

use anyhow::{Result, anyhow};
use tracing::info;

use crate::application::ports::{ProgressReporter, ProviderCapability};
use crate::application::services::retry::retry;
use crate::domain::{KeyPair, RetryPolicy};

/// Delete `key_pair`, retrying per `policy`.
///
/// # Errors
///
/// Returns the last provider error once every attempt failed.
pub async fn delete_key_pair(
    provider: &impl ProviderCapability,
    key_pair: &KeyPair,
    policy: &RetryPolicy,
) -> Result<()> {
    retry(policy, "delete key pair", |_| provider.delete_key_pair(key_pair))
        .await
        .map_err(|e| {
            anyhow!(
                "failed to delete key pair {} on {} after {} attempt(s): {:#}",
                key_pair.name,
                provider.kind(),
                e.attempts,
                e.last
            )
        })?;
    info!(key_pair = %key_pair.name, "key pair deleted");
    Ok(())
}

/// Result of a bulk key-pair removal.
#[derive(Debug, Default)]
pub struct KeyPairRemoval {
    pub removed: Vec<String>,
    pub failed: Vec<(String, anyhow::Error)>,
}

/// Delete every key pair whose name contains `filter` (all when `None`).
///
/// Each deletion retries independently; one failure does not stop the rest.
///
/// # Errors
///
/// Returns an error only if the key pairs cannot be listed.
pub async fn remove_key_pairs(
    provider: &impl ProviderCapability,
    filter: Option<&str>,
    policy: &RetryPolicy,
    reporter: &impl ProgressReporter,
) -> Result<KeyPairRemoval> {
    let mut removal = KeyPairRemoval::default();
    let matching = provider
        .list_key_pairs()
        .await?
        .into_iter()
        .filter(|k| filter.is_none_or(|f| k.name.contains(f)));
    for key_pair in matching {
        reporter.step(&format!("deleting key pair {}...", key_pair.name));
        match delete_key_pair(provider, &key_pair, policy).await {
            Ok(()) => removal.removed.push(key_pair.name),
            Err(e) => {
                reporter.warn(&format!("{e:#}"));
                removal.failed.push((key_pair.name, e));
            }
        }
    }
    Ok(removal)
}
