//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator; callers recover them with `downcast_ref`.

use thiserror::Error;

// ── Provisioning errors ───────────────────────────────────────────────────────

/// Failures of the provisioning and deployment lifecycle.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("{provider} authentication failed: {reason}")]
    Authentication { provider: String, reason: String },

    #[error("Could not locate image for '{reference}' on {provider}")]
    ImageNotFound { provider: String, reference: String },

    #[error("Could not locate instance size for {requested} on {provider}")]
    SizeNotFound { provider: String, requested: String },

    #[error(
        "Node {node_id} did not reach a running state within {waited_secs}s. \
         It may still exist at the provider and must be cleaned up manually."
    )]
    ProvisionTimeout { node_id: String, waited_secs: u64 },

    #[error("No session recorded for '{0}'. Run 'skyforge launch' to provision it.")]
    SessionNotFound(String),

    #[error("Node {node_id} for '{name}' is no longer reported by {provider}")]
    NodeLookup {
        name: String,
        node_id: String,
        provider: String,
    },

    #[error("Could not reach {target} after {attempts} attempt(s): {reason}")]
    Connection {
        target: String,
        attempts: u32,
        reason: String,
    },

    #[error("Could not render step '{step}': {reason}")]
    StepRender { step: String, reason: String },

    #[error("Unknown provider '{0}'. Valid providers: aws, google")]
    UnknownProvider(String),
}

// ── Layout errors ─────────────────────────────────────────────────────────────

/// Validation failures for loaded layouts.
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("Invalid layout name '{0}': must match ^[A-Za-z0-9][A-Za-z0-9._-]{{0,127}}$")]
    InvalidName(String),

    #[error("Duplicate layout name '{0}'")]
    DuplicateName(String),

    #[error("Layout '{0}' has scale 0; scale must be at least 1")]
    ZeroScale(String),

    #[error("Layout '{0}' has no username for the remote account")]
    MissingUsername(String),

    #[error("Layout '{0}' has no SSH credential (set `ssh` at file or layout level)")]
    MissingCredential(String),

    #[error(
        "Layout '{0}' has no usable constraints: give a size name or at least one of cores, disk, mem"
    )]
    EmptyConstraints(String),
}

// ── Config errors ─────────────────────────────────────────────────────────────

/// Errors related to settings validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value} (must be at least {min})")]
    BelowMinimum { key: String, value: u64, min: u64 },
}
