//! Layouts file loading.
//!
//! A layouts file is YAML with an optional file-level `ssh` credential and a
//! `layouts` list. A layout without its own `ssh` block inherits the
//! file-level one.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::domain::{Layout, SshCredential, validate_layouts};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LayoutsFile {
    #[serde(default)]
    ssh: Option<SshCredential>,
    #[serde(default)]
    layouts: Vec<Layout>,
}

/// Parse layouts from YAML text and validate them as one run.
///
/// # Errors
///
/// Returns an error if the YAML is malformed or any layout fails validation.
pub fn parse_layouts(content: &str) -> Result<Vec<Layout>> {
    let file: LayoutsFile = serde_yaml::from_str(content).context("invalid layouts document")?;
    let layouts: Vec<Layout> = file
        .layouts
        .into_iter()
        .map(|mut layout| {
            if layout.ssh.is_none() {
                layout.ssh.clone_from(&file.ssh);
            }
            layout
        })
        .collect();
    validate_layouts(&layouts)?;
    Ok(layouts)
}

/// Load and validate the layouts file at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or its content is invalid.
pub fn load_layouts(path: &Path) -> Result<Vec<Layout>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read layouts file {}", path.display()))?;
    parse_layouts(&content).with_context(|| format!("in {}", path.display()))
}

/// Keep only the layouts named in `names`, in file order. An empty `names`
/// selects everything.
///
/// # Errors
///
/// Returns an error naming the first requested layout the file does not
/// declare.
pub fn select_layouts(layouts: Vec<Layout>, names: &[String]) -> Result<Vec<Layout>> {
    if names.is_empty() {
        return Ok(layouts);
    }
    if let Some(missing) = names.iter().find(|n| !layouts.iter().any(|l| &l.name == *n)) {
        anyhow::bail!("layout '{missing}' is not declared in the layouts file");
    }
    Ok(layouts
        .into_iter()
        .filter(|l| names.contains(&l.name))
        .collect())
}
