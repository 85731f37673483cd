//! Layout domain types and pure validation functions.
//!
//! This module is intentionally free of I/O, async, and external layer imports.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::cloud::ProviderKind;
use crate::domain::error::LayoutError;

/// Environment bindings for a run (provider credentials, template values).
pub type EnvBindings = BTreeMap<String, String>;

/// Valid layout names double as session-store keys and file names.
#[allow(clippy::expect_used)] // Compile-time constant pattern
pub static LAYOUT_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,127}$").expect("valid regex"));

/// SSH key file paths. Referenced, never copied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshCredential {
    /// Path to the OpenSSH public key.
    pub public: PathBuf,
    /// Path to the matching private key.
    pub private: PathBuf,
}

/// Instance sizing: a provider size name, or an explicit resource triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SizeConstraints {
    Named(String),
    Explicit {
        #[serde(default)]
        cores: Option<u32>,
        /// Disk in GB.
        #[serde(default)]
        disk: Option<u32>,
        /// Memory in MiB.
        #[serde(default)]
        mem: Option<u32>,
    },
}

impl SizeConstraints {
    /// `true` for an explicit triple with no field set. Unknown keys such as
    /// `{size: small}` deserialize to this shape.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(
            self,
            Self::Explicit {
                cores: None,
                disk: None,
                mem: None
            }
        )
    }
}

impl fmt::Display for SizeConstraints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "'{name}'"),
            Self::Explicit { cores, disk, mem } => {
                let show = |v: &Option<u32>| v.map_or_else(|| "-".to_string(), |n| n.to_string());
                write!(f, "cores={} disk={} mem={}", show(cores), show(disk), show(mem))
            }
        }
    }
}

/// One unit of remote work. `script` is a template rendered against session
/// metadata just before execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(alias = "run")]
    pub script: String,
    /// Run the script through `sudo`.
    #[serde(default)]
    pub sudo: bool,
}

impl DeploymentStep {
    /// Name shown in results: the explicit name, or the first script line.
    #[must_use]
    pub fn label(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        let first = self.script.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
        let first = first.trim();
        if first.chars().count() > 60 {
            let cut: String = first.chars().take(57).collect();
            format!("{cut}...")
        } else {
            first.to_string()
        }
    }
}

fn default_scale() -> u32 {
    1
}

/// Declarative description of one node and the steps to run on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    /// Unique name; the session-store key.
    pub name: String,
    pub provider: ProviderKind,
    /// Symbolic image alias or provider-native image id.
    pub runs_on: String,
    pub constraints: SizeConstraints,
    /// Remote account used for SSH.
    pub username: String,
    /// Number of identical nodes to launch from this layout.
    #[serde(default = "default_scale")]
    pub scale: u32,
    #[serde(default)]
    pub steps: Vec<DeploymentStep>,
    #[serde(default)]
    pub env: EnvBindings,
    /// Per-layout credential override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh: Option<SshCredential>,
}

impl Layout {
    /// Expand into one layout per replica.
    ///
    /// `scale == 1` keeps the bare name; otherwise replicas are named
    /// `<name>-1` .. `<name>-N`. Every replica has `scale == 1`.
    #[must_use]
    pub fn replicas(&self) -> Vec<Layout> {
        if self.scale <= 1 {
            let mut single = self.clone();
            single.scale = 1;
            return vec![single];
        }
        (1..=self.scale)
            .map(|i| {
                let mut replica = self.clone();
                replica.name = format!("{}-{i}", self.name);
                replica.scale = 1;
                replica
            })
            .collect()
    }
}

/// Validates a layout name / session-store key.
///
/// # Errors
///
/// Returns an error if the name could escape the store directory or is empty.
pub fn validate_layout_name(name: &str) -> Result<()> {
    if !LAYOUT_NAME_RE.is_match(name) {
        return Err(LayoutError::InvalidName(name.to_string()).into());
    }
    Ok(())
}

/// Validates a set of layouts loaded for one run.
///
/// Names of all replicas must be valid and unique; every layout needs a
/// username, a credential and non-empty constraints.
///
/// # Errors
///
/// Returns the first validation failure found, in declaration order.
pub fn validate_layouts(layouts: &[Layout]) -> Result<()> {
    let mut seen = HashSet::new();
    for layout in layouts {
        validate_layout_name(&layout.name)?;
        if layout.scale == 0 {
            return Err(LayoutError::ZeroScale(layout.name.clone()).into());
        }
        if layout.username.trim().is_empty() {
            return Err(LayoutError::MissingUsername(layout.name.clone()).into());
        }
        if layout.ssh.is_none() {
            return Err(LayoutError::MissingCredential(layout.name.clone()).into());
        }
        if layout.constraints.is_empty() {
            return Err(LayoutError::EmptyConstraints(layout.name.clone()).into());
        }
        for replica in layout.replicas() {
            validate_layout_name(&replica.name)?;
            if !seen.insert(replica.name.clone()) {
                return Err(LayoutError::DuplicateName(replica.name).into());
            }
        }
    }
    Ok(())
}
