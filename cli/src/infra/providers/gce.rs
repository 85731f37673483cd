//! Google Compute Engine adapter, driven through the `gcloud` CLI.
//!
//! Credentials reach `gcloud` through `CLOUDSDK_*` environment overrides on
//! the child process, so the user's own gcloud configuration is never
//! modified. Key pairs map onto OS Login SSH keys, named by fingerprint.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Output;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use super::{
    WaitPolicy, ensure_success, missing_binding, parse_json, stderr_contains, wait_until_running,
};
use crate::application::ports::{CommandRunner, ProviderCapability};
use crate::domain::{
    EnvBindings, Image, KeyPair, Node, NodeFilter, NodeOptions, NodeState, ProviderKind,
    ProvisionError, SecurityPolicy, Size, SizeConstraints,
};

pub const DEFAULT_ZONE: &str = "us-central1-a";

const PUBLIC_IMAGE_PROJECT: &str = "ubuntu-os-cloud";

const IMAGE_FAMILIES: &[(&str, &str)] = &[
    ("ubuntu-18.04", "ubuntu-1804-lts"),
    ("ubuntu-20.04", "ubuntu-2004-lts"),
    ("ubuntu-22.04", "ubuntu-2204-lts"),
];

const SIZE_ALIASES: &[(&str, &str)] = &[
    ("small", "e2-small"),
    ("medium", "e2-medium"),
    ("large", "e2-standard-4"),
    ("xlarge", "e2-standard-8"),
];

const NOT_FOUND: &str = "was not found";

/// Environment handed to the `gcloud` child process.
#[must_use]
pub fn cli_env(env: &EnvBindings) -> EnvBindings {
    let mut out: EnvBindings = env
        .iter()
        .filter(|(k, _)| k.starts_with("GOOGLE_") || k.starts_with("CLOUDSDK_"))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let overrides = [
        (
            "GOOGLE_APPLICATION_CREDENTIALS",
            "CLOUDSDK_AUTH_CREDENTIAL_FILE_OVERRIDE",
        ),
        ("GOOGLE_PROJECT", "CLOUDSDK_CORE_PROJECT"),
        ("GOOGLE_APPLICATION_SERVICE_ACCOUNT", "CLOUDSDK_CORE_ACCOUNT"),
    ];
    for (from, to) in overrides {
        if let Some(v) = env.get(from) {
            out.insert(to.to_string(), v.clone());
        }
    }
    out.insert("CLOUDSDK_CORE_DISABLE_PROMPTS".to_string(), "1".to_string());
    out
}

pub struct GoogleProvider<R> {
    runner: R,
    project: String,
    zone: String,
    wait: WaitPolicy,
}

impl<R: CommandRunner> GoogleProvider<R> {
    /// Validate bindings in `env` and confirm the credential can mint a token.
    ///
    /// # Errors
    ///
    /// Returns `ProvisionError::Authentication` when a binding is missing or
    /// the credential is rejected.
    pub async fn connect(runner: R, env: &EnvBindings, wait: WaitPolicy) -> Result<Self> {
        let required = |key: &str| -> Result<String> {
            env.get(key)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or_else(|| missing_binding(ProviderKind::Google, key))
        };
        required("GOOGLE_APPLICATION_CREDENTIALS")?;
        let project = required("GOOGLE_PROJECT")?;
        let zone = env
            .get("GOOGLE_DATACENTER")
            .filter(|z| !z.is_empty())
            .map_or(DEFAULT_ZONE, String::as_str)
            .to_string();

        let out = runner
            .run("gcloud", &["auth", "print-access-token"])
            .await
            .context("gcloud auth print-access-token")?;
        if !out.status.success() {
            return Err(ProvisionError::Authentication {
                provider: ProviderKind::Google.to_string(),
                reason: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            }
            .into());
        }
        info!(project = %project, zone = %zone, "authenticated with google");
        Ok(Self {
            runner,
            project,
            zone,
            wait,
        })
    }

    /// Run `gcloud <args> --project <project> --format json`.
    async fn gcloud(&self, project: &str, args: &[&str]) -> Result<Output> {
        let mut full: Vec<&str> = args.to_vec();
        full.extend_from_slice(&["--project", project, "--format", "json"]);
        let what = args.iter().take(3).copied().collect::<Vec<_>>().join(" ");
        self.runner
            .run("gcloud", &full)
            .await
            .with_context(|| format!("gcloud {what}"))
    }

    fn image_not_found(reference: &str) -> anyhow::Error {
        ProvisionError::ImageNotFound {
            provider: ProviderKind::Google.to_string(),
            reference: reference.to_string(),
        }
        .into()
    }

    /// `None` while the instance is not reported yet.
    async fn describe_instance(&self, name: &str) -> Result<Option<Node>> {
        let out = self
            .gcloud(
                &self.project,
                &["compute", "instances", "describe", name, "--zone", &self.zone],
            )
            .await?;
        if stderr_contains(&out, NOT_FOUND) {
            return Ok(None);
        }
        let instance: GceInstance = parse_json(&out, "instances describe")?;
        Ok(Some(instance.into_node()))
    }

    async fn os_login_keys(&self) -> Result<Vec<KeyPair>> {
        let out = self
            .gcloud(&self.project, &["compute", "os-login", "ssh-keys", "list"])
            .await?;
        let keys: Vec<OsLoginKey> = parse_json(&out, "os-login ssh-keys list")?;
        Ok(keys.into_iter().map(OsLoginKey::into_key_pair).collect())
    }
}

/// Split `projects/<project>/global/images/<image>` (or `.../images/family/<f>`).
fn parse_image_path(reference: &str) -> Option<(&str, ImageRef<'_>)> {
    let rest = reference.strip_prefix("projects/")?;
    let (project, rest) = rest.split_once('/')?;
    let image = rest.strip_prefix("global/images/")?;
    if project.is_empty() || image.is_empty() {
        return None;
    }
    match image.strip_prefix("family/") {
        Some(family) if !family.is_empty() => Some((project, ImageRef::Family(family))),
        Some(_) => None,
        None => Some((project, ImageRef::Name(image))),
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ImageRef<'a> {
    Name(&'a str),
    Family(&'a str),
}

impl<R: CommandRunner> ProviderCapability for GoogleProvider<R> {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    fn security_policy(&self) -> SecurityPolicy {
        SecurityPolicy {
            security_group: None,
            ..SecurityPolicy::default()
        }
    }

    async fn resolve_image(&self, reference: &str) -> Result<Image> {
        let (project, image) = if let Some(parsed) = parse_image_path(reference) {
            parsed
        } else if let Some((_, family)) = IMAGE_FAMILIES.iter().find(|(a, _)| *a == reference) {
            (PUBLIC_IMAGE_PROJECT, ImageRef::Family(*family))
        } else {
            return Err(Self::image_not_found(reference));
        };

        let out = match image {
            ImageRef::Name(name) => {
                self.gcloud(project, &["compute", "images", "describe", name])
                    .await?
            }
            ImageRef::Family(family) => {
                self.gcloud(project, &["compute", "images", "describe-from-family", family])
                    .await?
            }
        };
        if stderr_contains(&out, NOT_FOUND) {
            return Err(Self::image_not_found(reference));
        }
        let found: GceImage = parse_json(&out, "images describe")?;
        debug!(reference, image = %found.name, "image resolved");
        Ok(Image {
            id: found.name.clone(),
            name: found.name,
            project: Some(project.to_string()),
        })
    }

    async fn resolve_size(&self, constraints: &SizeConstraints) -> Result<Size> {
        let not_found = || -> anyhow::Error {
            ProvisionError::SizeNotFound {
                provider: ProviderKind::Google.to_string(),
                requested: constraints.to_string(),
            }
            .into()
        };
        let SizeConstraints::Named(name) = constraints else {
            return Err(not_found());
        };
        let id = SIZE_ALIASES
            .iter()
            .find(|(alias, _)| *alias == name.as_str())
            .map_or(name.as_str(), |(_, id)| *id);

        let out = self
            .gcloud(
                &self.project,
                &["compute", "machine-types", "describe", id, "--zone", &self.zone],
            )
            .await?;
        if stderr_contains(&out, NOT_FOUND) {
            return Err(not_found());
        }
        let found: MachineType = parse_json(&out, "machine-types describe")?;
        Ok(Size {
            id: found.name,
            cores: found.guest_cpus,
            mem: found.memory_mb,
        })
    }

    async fn create_node(&self, opts: &NodeOptions) -> Result<Node> {
        let key = tokio::fs::read_to_string(&opts.public_key)
            .await
            .with_context(|| format!("reading {}", opts.public_key.display()))?;
        let metadata = format!("ssh-keys={}:{}", opts.username, key.trim());
        let image_project = opts
            .image
            .project
            .as_deref()
            .unwrap_or(PUBLIC_IMAGE_PROJECT);

        let mut args: Vec<&str> = vec![
            "compute",
            "instances",
            "create",
            &opts.name,
            "--zone",
            &self.zone,
            "--machine-type",
            &opts.size.id,
            "--image",
            &opts.image.id,
            "--image-project",
            image_project,
            "--metadata",
            &metadata,
        ];
        if opts.policy.spot {
            args.push("--provisioning-model=SPOT");
            args.push(if opts.policy.terminate_on_shutdown {
                "--instance-termination-action=DELETE"
            } else {
                "--instance-termination-action=STOP"
            });
        }

        let out = self.gcloud(&self.project, &args).await?;
        let created: Vec<GceInstance> = parse_json(&out, "instances create")?;
        let first = created
            .into_iter()
            .next()
            .context("instances create returned no instance")?;
        info!(instance = %first.id, name = %opts.name, "instance created, waiting for running");

        let name = first.name;
        wait_until_running(&self.wait, &first.id, || self.describe_instance(&name)).await
    }

    async fn destroy_node(&self, node: &Node) -> Result<()> {
        let out = self
            .gcloud(
                &self.project,
                &[
                    "compute",
                    "instances",
                    "delete",
                    &node.name,
                    "--zone",
                    &self.zone,
                    "--quiet",
                ],
            )
            .await?;
        ensure_success(&out, "instances delete")?;
        info!(instance = %node.name, "instance deleted");
        Ok(())
    }

    async fn list_nodes(&self, filter: &NodeFilter) -> Result<Vec<Node>> {
        let expr = format!("id:({})", filter.ids.join(" "));
        let mut args = vec!["compute", "instances", "list"];
        if !filter.ids.is_empty() {
            args.extend_from_slice(&["--filter", &expr]);
        }
        let out = self.gcloud(&self.project, &args).await?;
        let instances: Vec<GceInstance> = parse_json(&out, "instances list")?;
        Ok(instances
            .into_iter()
            .map(GceInstance::into_node)
            .filter(|n| n.state != NodeState::Terminated)
            .collect())
    }

    async fn import_key_pair(&self, name: &str, public_key_path: &Path) -> Result<KeyPair> {
        let key = tokio::fs::read_to_string(public_key_path)
            .await
            .with_context(|| format!("reading {}", public_key_path.display()))?;
        let key_file = public_key_path.to_string_lossy();
        let out = self
            .gcloud(
                &self.project,
                &["compute", "os-login", "ssh-keys", "add", "--key-file", &key_file],
            )
            .await?;
        let reply: OsLoginAddReply = parse_json(&out, "os-login ssh-keys add")?;
        let added = reply
            .login_profile
            .ssh_public_keys
            .into_values()
            .find(|k| k.key.trim() == key.trim())
            .with_context(|| format!("OS Login did not report the key added for {name}"))?;
        debug!(session = name, fingerprint = %added.fingerprint, "key registered");
        Ok(added.into_key_pair())
    }

    async fn get_key_pair(&self, name: &str) -> Result<Option<KeyPair>> {
        Ok(self
            .os_login_keys()
            .await?
            .into_iter()
            .find(|k| k.name == name))
    }

    async fn delete_key_pair(&self, key_pair: &KeyPair) -> Result<()> {
        let out = self
            .gcloud(
                &self.project,
                &["compute", "os-login", "ssh-keys", "remove", "--key", &key_pair.name],
            )
            .await?;
        ensure_success(&out, "os-login ssh-keys remove")
    }

    async fn list_key_pairs(&self) -> Result<Vec<KeyPair>> {
        self.os_login_keys().await
    }
}

// ── CLI JSON shapes ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct GceImage {
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MachineType {
    name: String,
    guest_cpus: Option<u32>,
    memory_mb: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GceInstance {
    id: String,
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    network_interfaces: Vec<NetworkInterface>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetworkInterface {
    #[serde(default)]
    access_configs: Vec<AccessConfig>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessConfig {
    #[serde(rename = "natIP")]
    nat_ip: Option<String>,
}

impl GceInstance {
    fn into_node(self) -> Node {
        let public_ips = self
            .network_interfaces
            .into_iter()
            .flat_map(|n| n.access_configs)
            .filter_map(|a| a.nat_ip)
            .collect();
        Node {
            id: self.id,
            name: self.name,
            public_ips,
            state: NodeState::from_provider(&self.status),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OsLoginAddReply {
    login_profile: LoginProfile,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginProfile {
    #[serde(default)]
    ssh_public_keys: BTreeMap<String, OsLoginKey>,
}

#[derive(Deserialize)]
struct OsLoginKey {
    fingerprint: String,
    #[serde(default)]
    key: String,
}

impl OsLoginKey {
    fn into_key_pair(self) -> KeyPair {
        KeyPair {
            name: self.fingerprint.clone(),
            fingerprint: Some(self.fingerprint),
        }
    }
}
