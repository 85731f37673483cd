//! Amazon EC2 adapter, driven through the `aws` CLI.

use std::path::Path;
use std::process::Output;

use anyhow::{Context, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use tracing::{debug, info};

use super::{
    WaitPolicy, ensure_success, missing_binding, parse_json, stderr_contains, wait_until_running,
};
use crate::application::ports::{CommandRunner, ProviderCapability};
use crate::domain::{
    EnvBindings, Image, KeyPair, Node, NodeFilter, NodeOptions, NodeState, ProviderKind,
    ProvisionError, Size, SizeConstraints,
};

pub const DEFAULT_REGION: &str = "us-east-2";

/// Canonical's AWS account, owner of the official Ubuntu AMIs.
const CANONICAL_OWNER: &str = "099720109477";

const IMAGE_ALIASES: &[(&str, &str)] = &[
    (
        "ubuntu-18.04",
        "ubuntu/images/hvm-ssd/ubuntu-bionic-18.04-amd64-server-*",
    ),
    (
        "ubuntu-20.04",
        "ubuntu/images/hvm-ssd/ubuntu-focal-20.04-amd64-server-*",
    ),
    (
        "ubuntu-22.04",
        "ubuntu/images/hvm-ssd/ubuntu-jammy-22.04-amd64-server-*",
    ),
];

const SIZE_ALIASES: &[(&str, &str)] = &[
    ("small", "t3.small"),
    ("medium", "t3.medium"),
    ("large", "t3.large"),
    ("xlarge", "t3.xlarge"),
];

/// Environment handed to the `aws` child process.
#[must_use]
pub fn cli_env(env: &EnvBindings) -> EnvBindings {
    let mut out: EnvBindings = env
        .iter()
        .filter(|(k, _)| k.starts_with("AWS_"))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    out.insert("AWS_PAGER".to_string(), String::new());
    out
}

pub struct AwsProvider<R> {
    runner: R,
    region: String,
    wait: WaitPolicy,
}

impl<R: CommandRunner> AwsProvider<R> {
    /// Validate credentials in `env` and confirm them with STS.
    ///
    /// # Errors
    ///
    /// Returns `ProvisionError::Authentication` when a key is missing or the
    /// identity call is rejected.
    pub async fn connect(runner: R, env: &EnvBindings, wait: WaitPolicy) -> Result<Self> {
        for key in ["AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY"] {
            if env.get(key).is_none_or(String::is_empty) {
                return Err(missing_binding(ProviderKind::Aws, key));
            }
        }
        let region = env
            .get("AWS_REGION")
            .filter(|r| !r.is_empty())
            .map_or(DEFAULT_REGION, String::as_str)
            .to_string();
        let provider = Self {
            runner,
            region,
            wait,
        };

        let out = provider
            .runner
            .run(
                "aws",
                &["sts", "get-caller-identity", "--region", &provider.region, "--output", "json"],
            )
            .await
            .context("aws sts get-caller-identity")?;
        if !out.status.success() {
            return Err(ProvisionError::Authentication {
                provider: ProviderKind::Aws.to_string(),
                reason: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            }
            .into());
        }
        info!(region = %provider.region, "authenticated with aws");
        Ok(provider)
    }

    async fn ec2(&self, args: &[&str]) -> Result<Output> {
        let mut full = Vec::with_capacity(args.len() + 5);
        full.push("ec2");
        full.extend_from_slice(args);
        full.extend_from_slice(&["--region", &self.region, "--output", "json"]);
        self.runner
            .run("aws", &full)
            .await
            .with_context(|| format!("aws ec2 {}", args.first().copied().unwrap_or_default()))
    }

    fn image_not_found(reference: &str) -> anyhow::Error {
        ProvisionError::ImageNotFound {
            provider: ProviderKind::Aws.to_string(),
            reference: reference.to_string(),
        }
        .into()
    }

    /// `None` while EC2 does not report the instance yet.
    async fn describe_instance(&self, id: &str) -> Result<Option<Node>> {
        let out = self.ec2(&["describe-instances", "--instance-ids", id]).await?;
        if stderr_contains(&out, "InvalidInstanceID.NotFound") {
            return Ok(None);
        }
        let reply: DescribeInstancesReply = parse_json(&out, "describe-instances")?;
        Ok(reply
            .reservations
            .into_iter()
            .flat_map(|r| r.instances)
            .next()
            .map(AwsInstance::into_node))
    }

    async fn describe_key_pairs(&self, names: &[&str]) -> Result<Option<Vec<KeyPair>>> {
        let mut args = vec!["describe-key-pairs"];
        if !names.is_empty() {
            args.push("--key-names");
            args.extend_from_slice(names);
        }
        let out = self.ec2(&args).await?;
        if stderr_contains(&out, "InvalidKeyPair.NotFound") {
            return Ok(None);
        }
        let reply: KeyPairsReply = parse_json(&out, "describe-key-pairs")?;
        Ok(Some(
            reply.key_pairs.into_iter().map(AwsKeyPair::into_key_pair).collect(),
        ))
    }
}

impl<R: CommandRunner> ProviderCapability for AwsProvider<R> {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Aws
    }

    async fn resolve_image(&self, reference: &str) -> Result<Image> {
        let out = if reference.starts_with("ami-") {
            self.ec2(&["describe-images", "--image-ids", reference]).await?
        } else {
            let Some((_, pattern)) = IMAGE_ALIASES.iter().find(|(alias, _)| *alias == reference)
            else {
                return Err(Self::image_not_found(reference));
            };
            let name_filter = format!("Name=name,Values={pattern}");
            self.ec2(&[
                "describe-images",
                "--owners",
                CANONICAL_OWNER,
                "--filters",
                &name_filter,
                "Name=state,Values=available",
            ])
            .await?
        };
        if stderr_contains(&out, "InvalidAMIID") {
            return Err(Self::image_not_found(reference));
        }
        let reply: ImagesReply = parse_json(&out, "describe-images")?;
        let newest = reply
            .images
            .into_iter()
            .max_by(|a, b| a.creation_date.cmp(&b.creation_date))
            .ok_or_else(|| Self::image_not_found(reference))?;
        debug!(reference, ami = %newest.image_id, "image resolved");
        Ok(Image {
            id: newest.image_id,
            name: newest.name,
            project: None,
        })
    }

    async fn resolve_size(&self, constraints: &SizeConstraints) -> Result<Size> {
        let not_found = || -> anyhow::Error {
            ProvisionError::SizeNotFound {
                provider: ProviderKind::Aws.to_string(),
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
            .ec2(&["describe-instance-types", "--instance-types", id])
            .await?;
        if stderr_contains(&out, "InvalidInstanceType") {
            return Err(not_found());
        }
        let reply: InstanceTypesReply = parse_json(&out, "describe-instance-types")?;
        let found = reply.instance_types.into_iter().next().ok_or_else(not_found)?;
        Ok(Size {
            id: found.instance_type,
            cores: found.v_cpu_info.map(|c| c.default_v_cpus),
            mem: found.memory_info.map(|m| m.size_mib),
        })
    }

    async fn create_node(&self, opts: &NodeOptions) -> Result<Node> {
        let tags = format!(
            "ResourceType=instance,Tags=[{{Key=Name,Value={}}}]",
            opts.name
        );
        let mut args: Vec<&str> = vec![
            "run-instances",
            "--image-id",
            &opts.image.id,
            "--instance-type",
            &opts.size.id,
            "--key-name",
            &opts.key_name,
            "--count",
            "1",
            "--tag-specifications",
            &tags,
        ];
        if let Some(group) = &opts.policy.security_group {
            args.extend_from_slice(&["--security-groups", group]);
        }
        if opts.policy.spot {
            args.extend_from_slice(&["--instance-market-options", "MarketType=spot"]);
        }
        if opts.policy.terminate_on_shutdown {
            args.extend_from_slice(&["--instance-initiated-shutdown-behavior", "terminate"]);
        }

        let out = self.ec2(&args).await?;
        let reply: RunInstancesReply = parse_json(&out, "run-instances")?;
        let id = reply
            .instances
            .into_iter()
            .next()
            .map(|i| i.instance_id)
            .context("run-instances returned no instance")?;
        info!(instance = %id, name = %opts.name, "instance launched, waiting for running");

        wait_until_running(&self.wait, &id, || self.describe_instance(&id)).await
    }

    async fn destroy_node(&self, node: &Node) -> Result<()> {
        let out = self
            .ec2(&["terminate-instances", "--instance-ids", &node.id])
            .await?;
        ensure_success(&out, "terminate-instances")?;
        info!(instance = %node.id, "instance terminated");
        Ok(())
    }

    async fn list_nodes(&self, filter: &NodeFilter) -> Result<Vec<Node>> {
        let mut args = vec![
            "describe-instances",
            "--filters",
            "Name=instance-state-name,Values=pending,running,stopping,stopped",
        ];
        if !filter.ids.is_empty() {
            args.push("--instance-ids");
            args.extend(filter.ids.iter().map(String::as_str));
        }
        let out = self.ec2(&args).await?;
        if stderr_contains(&out, "InvalidInstanceID") {
            return Ok(Vec::new());
        }
        let reply: DescribeInstancesReply = parse_json(&out, "describe-instances")?;
        Ok(reply
            .reservations
            .into_iter()
            .flat_map(|r| r.instances)
            .map(AwsInstance::into_node)
            .collect())
    }

    async fn import_key_pair(&self, name: &str, public_key_path: &Path) -> Result<KeyPair> {
        let material = tokio::fs::read(public_key_path)
            .await
            .with_context(|| format!("reading {}", public_key_path.display()))?;
        let encoded = STANDARD.encode(material);
        let out = self
            .ec2(&[
                "import-key-pair",
                "--key-name",
                name,
                "--public-key-material",
                &encoded,
            ])
            .await?;
        let reply: AwsKeyPair = parse_json(&out, "import-key-pair")?;
        Ok(reply.into_key_pair())
    }

    async fn get_key_pair(&self, name: &str) -> Result<Option<KeyPair>> {
        Ok(self
            .describe_key_pairs(&[name])
            .await?
            .and_then(|pairs| pairs.into_iter().find(|k| k.name == name)))
    }

    async fn delete_key_pair(&self, key_pair: &KeyPair) -> Result<()> {
        let out = self
            .ec2(&["delete-key-pair", "--key-name", &key_pair.name])
            .await?;
        ensure_success(&out, "delete-key-pair")
    }

    async fn list_key_pairs(&self) -> Result<Vec<KeyPair>> {
        Ok(self.describe_key_pairs(&[]).await?.unwrap_or_default())
    }
}

// ── CLI JSON shapes ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ImagesReply {
    #[serde(default)]
    images: Vec<AwsImage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AwsImage {
    image_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    creation_date: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceTypesReply {
    #[serde(default)]
    instance_types: Vec<AwsInstanceType>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AwsInstanceType {
    instance_type: String,
    #[serde(rename = "VCpuInfo")]
    v_cpu_info: Option<VCpuInfo>,
    memory_info: Option<MemoryInfo>,
}

#[derive(Deserialize)]
struct VCpuInfo {
    #[serde(rename = "DefaultVCpus")]
    default_v_cpus: u32,
}

#[derive(Deserialize)]
struct MemoryInfo {
    #[serde(rename = "SizeInMiB")]
    size_mib: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RunInstancesReply {
    #[serde(default)]
    instances: Vec<AwsInstance>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstancesReply {
    #[serde(default)]
    reservations: Vec<Reservation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Reservation {
    #[serde(default)]
    instances: Vec<AwsInstance>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AwsInstance {
    instance_id: String,
    state: Option<InstanceState>,
    public_ip_address: Option<String>,
    #[serde(default)]
    tags: Vec<Tag>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceState {
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Tag {
    key: String,
    value: String,
}

impl AwsInstance {
    fn into_node(self) -> Node {
        let name = self
            .tags
            .into_iter()
            .find(|t| t.key == "Name")
            .map_or_else(|| self.instance_id.clone(), |t| t.value);
        Node {
            state: self
                .state
                .map_or(NodeState::Unknown, |s| NodeState::from_provider(&s.name)),
            public_ips: self.public_ip_address.into_iter().collect(),
            id: self.instance_id,
            name,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KeyPairsReply {
    #[serde(default)]
    key_pairs: Vec<AwsKeyPair>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AwsKeyPair {
    key_name: String,
    key_fingerprint: Option<String>,
}

impl AwsKeyPair {
    fn into_key_pair(self) -> KeyPair {
        KeyPair {
            name: self.key_name,
            fingerprint: self.key_fingerprint,
        }
    }
}
