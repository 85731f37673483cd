//! Provider-agnostic cloud resource types.
//!
//! Pure data only — the adapters in `crate::infra::providers` translate
//! vendor JSON into these shapes.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::ProvisionError;

/// Supported cloud providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Amazon EC2.
    Aws,
    /// Google Compute Engine. Accepts `gce` as an alias.
    #[serde(alias = "gce")]
    Google,
}

impl ProviderKind {
    /// Lowercase identifier used in layouts and on the command line.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aws => "aws",
            Self::Google => "google",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aws" => Ok(Self::Aws),
            "google" | "gce" => Ok(Self::Google),
            other => Err(ProvisionError::UnknownProvider(other.to_string())),
        }
    }
}

/// Provider-reported node state, normalised across vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Pending,
    Running,
    Stopping,
    Stopped,
    Terminated,
    Unknown,
}

impl NodeState {
    /// Map an AWS `State.Name` or GCE `status` string onto a `NodeState`.
    #[must_use]
    pub fn from_provider(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "pending" | "provisioning" | "staging" => Self::Pending,
            "running" => Self::Running,
            "stopping" | "shutting-down" | "suspending" => Self::Stopping,
            "stopped" | "suspended" => Self::Stopped,
            "terminated" => Self::Terminated,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Terminated => "terminated",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A provider-assigned compute node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Opaque provider id (EC2 instance id, GCE numeric id).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Public network addresses, primary first.
    #[serde(default)]
    pub public_ips: Vec<String>,
    pub state: NodeState,
}

impl Node {
    /// First public address, if the provider assigned one.
    #[must_use]
    pub fn primary_address(&self) -> Option<&str> {
        self.public_ips.first().map(String::as_str)
    }
}

/// A resolved provider image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Provider-native identifier (AMI id, GCE image self-link or name).
    pub id: String,
    pub name: String,
    /// Image project (GCE only).
    pub project: Option<String>,
}

/// A resolved provider instance size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Size {
    /// Provider-native size id, e.g. `t3.small` or `e2-small`.
    pub id: String,
    pub cores: Option<u32>,
    /// Memory in MiB.
    pub mem: Option<u64>,
}

/// An SSH key pair registered with a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub name: String,
    pub fingerprint: Option<String>,
}

/// Filter for `list_nodes`. An empty filter lists everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeFilter {
    pub ids: Vec<String>,
}

impl NodeFilter {
    /// Filter matching exactly one node id.
    #[must_use]
    pub fn by_id(id: &str) -> Self {
        Self {
            ids: vec![id.to_string()],
        }
    }
}

/// Creation-time policy applied to every node an adapter launches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityPolicy {
    /// Request spot / preemptible capacity.
    pub spot: bool,
    /// Terminate (rather than stop) when the guest shuts down.
    pub terminate_on_shutdown: bool,
    /// Security group to attach, where the provider has that concept.
    pub security_group: Option<String>,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            spot: true,
            terminate_on_shutdown: true,
            security_group: Some("e2e".to_string()),
        }
    }
}

/// Options handed to `ProviderCapability::create_node`.
///
/// Carries only what the provider needs; the layout, credential and env of
/// the run travel alongside in `CreationRequest`.
#[derive(Debug, Clone)]
pub struct NodeOptions {
    pub name: String,
    pub image: Image,
    pub size: Size,
    /// Remote account the public key is installed for.
    pub username: String,
    /// Key pair registered for this node.
    pub key_name: String,
    /// OpenSSH public key file installed for `username`.
    pub public_key: PathBuf,
    pub policy: SecurityPolicy,
}
