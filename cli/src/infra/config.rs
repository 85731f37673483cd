//! Settings file and on-disk layout of the skyforge home directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::domain::{Settings, validate_settings};

/// Resolved locations under the skyforge home directory.
#[derive(Debug, Clone)]
pub struct SkyforgePaths {
    home: PathBuf,
    config: PathBuf,
}

impl SkyforgePaths {
    /// `$SKYFORGE_HOME` or `~/.skyforge`; config at `$SKYFORGE_CONFIG` or
    /// `<home>/config.yaml`.
    ///
    /// # Errors
    ///
    /// Returns an error if neither `SKYFORGE_HOME` nor a home directory is
    /// available.
    pub fn from_env() -> Result<Self> {
        let home = match std::env::var_os("SKYFORGE_HOME") {
            Some(h) if !h.is_empty() => PathBuf::from(h),
            _ => dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?
                .join(".skyforge"),
        };
        let mut paths = Self::with_home(home);
        if let Some(c) = std::env::var_os("SKYFORGE_CONFIG").filter(|c| !c.is_empty()) {
            paths.config = PathBuf::from(c);
        }
        Ok(paths)
    }

    /// Paths rooted at an explicit home (used in tests).
    #[must_use]
    pub fn with_home(home: PathBuf) -> Self {
        let config = home.join("config.yaml");
        Self { home, config }
    }

    #[must_use]
    pub fn home(&self) -> &Path {
        &self.home
    }

    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config
    }

    #[must_use]
    pub fn sessions_dir(&self) -> PathBuf {
        self.home.join("sessions")
    }
}

/// Load settings from `path`. A missing file yields the defaults.
///
/// # Errors
///
/// Returns an error if the file is unreadable, is not valid YAML, or holds
/// out-of-range values.
pub fn load_settings(path: &Path) -> Result<Settings> {
    let settings = match std::fs::read_to_string(path) {
        Ok(content) if content.trim().is_empty() => Settings::default(),
        Ok(content) => serde_yaml::from_str(&content)
            .with_context(|| format!("cannot parse {}", path.display()))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Settings::default(),
        Err(e) => return Err(e).with_context(|| format!("cannot read {}", path.display())),
    };
    validate_settings(&settings).with_context(|| format!("invalid {}", path.display()))?;
    Ok(settings)
}
