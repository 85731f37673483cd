//! Deployment steps: rendering, outcomes, and result summaries.
//!
//! Rendering is pure so that every template error is found before the first
//! remote command runs.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;

use crate::domain::cloud::Node;
use crate::domain::error::ProvisionError;
use crate::domain::layout::{DeploymentStep, Layout};
use crate::domain::session::SessionMetadata;

#[allow(clippy::expect_used)] // Compile-time constant pattern
static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)?)\s*\}\}")
        .expect("valid regex")
});

#[allow(clippy::expect_used)] // Compile-time constant pattern
static ENV_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

/// A step resolved against session metadata, ready to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedStep {
    pub label: String,
    /// Full script body, including the env preamble.
    pub script: String,
    pub sudo: bool,
}

/// Result of executing one rendered step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub label: String,
    pub exit_status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl StepOutcome {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.exit_status == 0
    }

    /// One-line detail: last non-empty line of stderr on failure, else stdout.
    #[must_use]
    pub fn detail(&self) -> &str {
        let source = if self.succeeded() || self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        source
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .map_or("", str::trim)
    }
}

/// Outcome of one full deployment run against one node. Not persisted.
#[derive(Debug, Clone)]
pub struct DeploymentResult {
    pub node: Node,
    pub layout: Layout,
    pub ssh_private_key: PathBuf,
    pub host: String,
    /// One outcome per step, in declared order.
    pub outcomes: Vec<StepOutcome>,
}

impl DeploymentResult {
    /// `true` when every step exited 0.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.outcomes.iter().all(StepOutcome::succeeded)
    }

    #[must_use]
    pub fn summary(&self) -> ProvisionResult<'_> {
        ProvisionResult { result: self }
    }
}

/// Kind of a summary line, so presenters can style it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Heading,
    StepOk,
    StepFailed,
    Info,
}

/// Human-readable summary of a deployment run.
pub struct ProvisionResult<'a> {
    result: &'a DeploymentResult,
}

impl ProvisionResult<'_> {
    /// Emit the summary line by line: step outcomes, then connection info.
    pub fn render(&self, mut emit: impl FnMut(LineKind, &str)) {
        let r = self.result;
        emit(LineKind::Heading, &format!("Provision result: {}", r.layout.name));
        for outcome in &r.outcomes {
            let kind = if outcome.succeeded() {
                LineKind::StepOk
            } else {
                LineKind::StepFailed
            };
            let detail = outcome.detail();
            let line = if detail.is_empty() {
                format!("[{}]: {}", outcome.exit_status, outcome.label)
            } else {
                format!("[{}]: {} ({detail})", outcome.exit_status, outcome.label)
            };
            emit(kind, &line);
        }
        emit(LineKind::Heading, "Connection information:");
        emit(
            LineKind::Info,
            &format!("Node: {} [{}]", r.node.name, r.node.state),
        );
        emit(
            LineKind::Info,
            &format!(
                "ssh -i {} {}@{}",
                r.ssh_private_key.display(),
                r.layout.username,
                r.host
            ),
        );
    }
}

/// Quote `value` for a POSIX shell.
#[must_use]
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Render every step of `meta.layout` against `meta`, in declared order.
///
/// # Errors
///
/// Returns `ProvisionError::StepRender` for the first step that references an
/// unknown placeholder or declares an unexportable env key.
pub fn render_steps(meta: &SessionMetadata) -> Result<Vec<RenderedStep>> {
    let context = template_context(meta);
    let preamble = env_preamble(meta)?;
    meta.layout
        .steps
        .iter()
        .map(|step| render_step(step, &context, &preamble))
        .collect()
}

fn render_step(
    step: &DeploymentStep,
    context: &BTreeMap<String, String>,
    preamble: &str,
) -> Result<RenderedStep> {
    let label = step.label();
    let mut missing = None;
    let body = PLACEHOLDER_RE.replace_all(&step.script, |caps: &regex::Captures<'_>| {
        let key = &caps[1];
        if let Some(value) = context.get(key) {
            value.clone()
        } else {
            missing.get_or_insert_with(|| key.to_string());
            String::new()
        }
    });
    if let Some(key) = missing {
        return Err(ProvisionError::StepRender {
            step: label,
            reason: format!("unknown placeholder '{{{{ {key} }}}}'"),
        }
        .into());
    }
    let script = if preamble.is_empty() {
        body.into_owned()
    } else {
        format!("{preamble}{body}")
    };
    Ok(RenderedStep {
        label,
        script,
        sudo: step.sudo,
    })
}

/// Values available to `{{ ... }}` placeholders. Layout env overrides run env.
fn template_context(meta: &SessionMetadata) -> BTreeMap<String, String> {
    let mut ctx = BTreeMap::new();
    ctx.insert("host".to_string(), meta.host.clone());
    ctx.insert("username".to_string(), meta.username.clone());
    ctx.insert("name".to_string(), meta.layout.name.clone());
    ctx.insert("session_id".to_string(), meta.session_id.clone());
    ctx.insert("node_id".to_string(), meta.node_id.clone());
    ctx.insert(
        "ssh_private_key".to_string(),
        meta.ssh_private_key.display().to_string(),
    );
    ctx.insert(
        "ssh_public_key".to_string(),
        meta.ssh_public_key.display().to_string(),
    );
    for (k, v) in meta.env.iter().chain(meta.layout.env.iter()) {
        ctx.insert(format!("env.{k}"), v.clone());
    }
    ctx
}

/// `export` lines for the layout's own env bindings. Run env (provider
/// credentials) is never exported to the node.
fn env_preamble(meta: &SessionMetadata) -> Result<String> {
    let mut out = String::new();
    for (key, value) in &meta.layout.env {
        if !ENV_KEY_RE.is_match(key) {
            return Err(ProvisionError::StepRender {
                step: "env".to_string(),
                reason: format!("'{key}' is not a valid environment variable name"),
            }
            .into());
        }
        let _ = writeln!(out, "export {key}={}", shell_quote(value));
    }
    Ok(out)
}
