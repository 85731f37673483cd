//! Domain layer — pure business logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod cloud;
pub mod config;
pub mod deploy;
pub mod error;
pub mod layout;
pub mod session;

pub use cloud::{
    Image, KeyPair, Node, NodeFilter, NodeOptions, NodeState, ProviderKind, SecurityPolicy, Size,
};
pub use config::{RetryPolicy, Settings, validate_settings};
pub use deploy::{
    DeploymentResult, LineKind, ProvisionResult, RenderedStep, StepOutcome, render_steps,
    shell_quote,
};
pub use error::{ConfigError, LayoutError, ProvisionError};
pub use layout::{
    DeploymentStep, EnvBindings, Layout, SizeConstraints, SshCredential, validate_layout_name,
    validate_layouts,
};
pub use session::{CreationRequest, SessionMetadata, generate_session_id};
