//! Session metadata — the persisted record that makes reconnection possible.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::cloud::{Node, NodeOptions};
use crate::domain::layout::{EnvBindings, Layout, SshCredential};

/// Everything needed to reach a node again after a process restart.
///
/// Saved under the layout name. Once saved it is the only source of truth
/// for `reconnect`; it is never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Primary public address of the node.
    pub host: String,
    /// Remote account used for SSH.
    pub username: String,
    /// Snapshot of the layout the node was created from.
    pub layout: Layout,
    pub ssh_public_key: PathBuf,
    pub ssh_private_key: PathBuf,
    /// Provider node id.
    pub node_id: String,
    pub node_name: String,
    /// Unique per orchestration run.
    pub session_id: String,
    /// Provider key pair registered for this node.
    pub key_pair: String,
    /// Env bindings of the run, used to reconnect to the provider.
    pub env: EnvBindings,
    pub created_at: DateTime<Utc>,
}

impl SessionMetadata {
    /// Assemble the record for a freshly created node.
    ///
    /// Returns `None` when the node has no public address to connect to.
    #[must_use]
    pub fn assemble(request: &CreationRequest, node: &Node) -> Option<Self> {
        let host = node.primary_address()?.to_string();
        Some(Self {
            host,
            username: request.layout.username.clone(),
            layout: request.layout.clone(),
            ssh_public_key: request.credential.public.clone(),
            ssh_private_key: request.credential.private.clone(),
            node_id: node.id.clone(),
            node_name: node.name.clone(),
            session_id: request.session_id.clone(),
            key_pair: request.options.key_name.clone(),
            env: request.env.clone(),
            created_at: Utc::now(),
        })
    }

    /// Ready-to-paste login command for this node.
    #[must_use]
    pub fn login_command(&self) -> String {
        format!(
            "ssh -i {} {}@{}",
            self.ssh_private_key.display(),
            self.username,
            self.host
        )
    }
}

/// One node creation: the provider options plus the run context that the
/// provider never sees.
#[derive(Debug, Clone)]
pub struct CreationRequest {
    pub session_id: String,
    pub options: NodeOptions,
    pub layout: Layout,
    pub credential: SshCredential,
    pub env: EnvBindings,
}

/// Generate a unique session identifier.
///
/// Format: `sf-` followed by 8 lowercase hex characters.
/// Entropy sources: nanosecond timestamp and two independent `RandomState` hashes.
#[must_use]
pub fn generate_session_id() -> String {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u128(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0),
    );
    hasher.write_u64(RandomState::new().build_hasher().finish());
    hasher.write_u64(RandomState::new().build_hasher().finish());
    format!("sf-{:08x}", hasher.finish() & 0xffff_ffff)
}
