//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` — never from `crate::infra`,
//! `crate::commands`, or `crate::output`.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use anyhow::Result;

use crate::domain::{
    EnvBindings, Image, KeyPair, Node, NodeFilter, NodeOptions, ProviderKind, RenderedStep,
    SecurityPolicy, SessionMetadata, Size, SizeConstraints, StepOutcome,
};

// ── Provider Ports ────────────────────────────────────────────────────────────

/// Everything the orchestration layer needs from a cloud provider.
///
/// Each call is attempted once; retries are the caller's decision. An
/// adapter instance is not assumed safe for concurrent creations — build one
/// per in-flight operation through a `ProviderFactory`.
#[allow(async_fn_in_trait)]
pub trait ProviderCapability {
    /// Which provider this adapter talks to.
    fn kind(&self) -> ProviderKind;

    /// Creation policy applied to every node. Adapters override as needed.
    fn security_policy(&self) -> SecurityPolicy {
        SecurityPolicy::default()
    }

    /// Map a symbolic image name or native id to a provider image.
    ///
    /// # Errors
    ///
    /// Fails with `ProvisionError::ImageNotFound` when nothing matches.
    async fn resolve_image(&self, reference: &str) -> Result<Image>;

    /// Map size constraints to a provider size.
    ///
    /// # Errors
    ///
    /// Fails with `ProvisionError::SizeNotFound` for unknown names and for
    /// every explicit `{cores, disk, mem}` request.
    async fn resolve_size(&self, constraints: &SizeConstraints) -> Result<Size>;

    /// Create a node and block until it is running or the bounded wait elapses.
    ///
    /// # Errors
    ///
    /// Fails with `ProvisionError::ProvisionTimeout` when the wait elapses.
    async fn create_node(&self, opts: &NodeOptions) -> Result<Node>;

    /// Destroy a node.
    async fn destroy_node(&self, node: &Node) -> Result<()>;

    /// List nodes matching `filter`.
    async fn list_nodes(&self, filter: &NodeFilter) -> Result<Vec<Node>>;

    /// Register the public key at `public_key_path` under `name`.
    async fn import_key_pair(&self, name: &str, public_key_path: &Path) -> Result<KeyPair>;

    /// Look up a key pair by name; `None` when the provider has no such key.
    async fn get_key_pair(&self, name: &str) -> Result<Option<KeyPair>>;

    /// Delete a key pair. Single attempt.
    async fn delete_key_pair(&self, key_pair: &KeyPair) -> Result<()>;

    /// List all key pairs visible to the credentials.
    async fn list_key_pairs(&self) -> Result<Vec<KeyPair>>;
}

/// Builds an authenticated provider adapter from env bindings.
#[allow(async_fn_in_trait)]
pub trait ProviderFactory {
    type Provider: ProviderCapability;

    /// Authenticate against `kind` using `env`.
    ///
    /// # Errors
    ///
    /// Fails with `ProvisionError::Authentication` when required bindings are
    /// absent or rejected.
    async fn connect(&self, kind: ProviderKind, env: &EnvBindings) -> Result<Self::Provider>;
}

// ── Session Store Port ────────────────────────────────────────────────────────

/// Keyed persistence of session metadata, addressed by layout name.
///
/// `save` always replaces the whole record and is atomic per key.
#[allow(async_fn_in_trait)]
pub trait SessionStore {
    async fn exists(&self, key: &str) -> Result<bool>;
    async fn save(&self, key: &str, record: &SessionMetadata) -> Result<()>;
    /// # Errors
    ///
    /// Fails with `ProvisionError::SessionNotFound` when no record exists.
    async fn load(&self, key: &str) -> Result<SessionMetadata>;
    /// Remove a record. Returns `false` when none existed.
    async fn delete(&self, key: &str) -> Result<bool>;
    /// All stored keys, sorted.
    async fn list(&self) -> Result<Vec<String>>;
}

// ── Remote Shell Ports ────────────────────────────────────────────────────────

/// Where and how to open a remote shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    pub host: String,
    pub username: String,
    pub private_key: PathBuf,
    /// Per-attempt connection timeout.
    pub timeout: Duration,
}

impl ConnectTarget {
    #[must_use]
    pub fn from_metadata(meta: &SessionMetadata, timeout: Duration) -> Self {
        Self {
            host: meta.host.clone(),
            username: meta.username.clone(),
            private_key: meta.ssh_private_key.clone(),
            timeout,
        }
    }
}

/// One progress tick of a file transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress<'a> {
    pub filename: &'a str,
    pub total: u64,
    pub sent: u64,
    /// Remote peer, `host:port`.
    pub peer: &'a str,
}

/// Per-chunk transfer callback. Invoked from the transfer's own task at
/// high frequency; implementations must return quickly.
pub type TransferCallback<'a> = &'a (dyn Fn(&TransferProgress<'_>) + Send + Sync);

/// Opens remote shells. One attempt per call.
#[allow(async_fn_in_trait)]
pub trait RemoteConnector {
    type Shell: RemoteShell;

    /// # Errors
    ///
    /// Returns an error if the host is unreachable or rejects the key.
    async fn connect(&self, target: &ConnectTarget) -> Result<Self::Shell>;
}

/// An established remote shell.
#[allow(async_fn_in_trait)]
pub trait RemoteShell {
    /// Peer address, `host:port`.
    fn peer(&self) -> &str;

    /// Run one rendered step and report its exit status.
    ///
    /// A non-zero step exit is an `Ok` outcome; only transport failures are
    /// errors.
    async fn execute(&self, step: &RenderedStep) -> Result<StepOutcome>;

    /// Copy `local` to `remote`. A directory source is copied as a tree.
    /// Returns bytes transferred.
    async fn upload(
        &self,
        local: &Path,
        remote: &str,
        progress: TransferCallback<'_>,
    ) -> Result<u64>;

    /// Copy `remote` to `local`; `recursive` copies a directory tree.
    /// Returns bytes transferred.
    async fn download(
        &self,
        remote: &str,
        local: &Path,
        recursive: bool,
        progress: TransferCallback<'_>,
    ) -> Result<u64>;
}

// ── Command Runner Port ───────────────────────────────────────────────────────

/// Abstracts process execution so infrastructure can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program and capture its output.
    ///
    /// Implementations should delegate to `run_with_timeout` using the
    /// instance's configured default timeout.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;
    /// Run a program with a custom timeout override.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds `timeout`.
    /// On timeout, the child process must be killed (not left orphaned).
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output>;
    /// Run a program with stdin piped from `stdin`.
    async fn run_with_stdin(&self, program: &str, args: &[&str], stdin: &[u8]) -> Result<Output>;
    /// Spawn a program with piped stdin/stdout without waiting for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned.
    fn spawn(&self, program: &str, args: &[&str]) -> Result<tokio::process::Child>;
}

// ── Progress Reporting Port ───────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the Presentation layer. Sync trait — no async needed.
pub trait ProgressReporter {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
}
