//! Infrastructure implementation of the `SessionStore` port.
//!
//! `FileSessionStore` keeps one JSON document per layout name and writes it
//! through a uniquely named temp file in the same directory followed by an
//! atomic rename, so a reader never sees a partial record. Blocking file I/O
//! runs under `tokio::task::spawn_blocking`.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::application::ports::SessionStore;
use crate::domain::{ProvisionError, SessionMetadata, validate_layout_name};

/// Session records under `<dir>/<name>.json`.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    /// Create a store rooted at `dir`; the directory is created on first save.
    #[must_use]
    pub fn with_dir(dir: PathBuf) -> Self {
        Self { dir }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_layout_name(key)?;
        Ok(self.dir.join(format!("{key}.json")))
    }

    fn save_sync(dir: &Path, path: &Path, record: &SessionMetadata) -> Result<()> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating directory {}", dir.display()))?;
        let content = serde_json::to_vec_pretty(record).context("serializing session")?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".session-")
            .suffix(".tmp")
            .tempfile_in(dir)
            .with_context(|| format!("creating temp file in {}", dir.display()))?;
        tmp.write_all(&content)
            .and_then(|()| tmp.as_file().sync_all())
            .with_context(|| format!("writing temp file {}", tmp.path().display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("setting permissions on {}", tmp.path().display()))?;
        }

        tmp.persist(path)
            .map_err(|e| e.error)
            .with_context(|| format!("finalizing session file {}", path.display()))?;
        Ok(())
    }

    fn load_sync(key: &str, path: &Path) -> Result<SessionMetadata> {
        let content = match std::fs::read(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProvisionError::SessionNotFound(key.to_string()).into());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("reading session file {}", path.display()));
            }
        };
        serde_json::from_slice(&content)
            .with_context(|| format!("parsing session file {}", path.display()))
    }

    fn list_sync(dir: &Path) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("listing {}", dir.display()));
            }
        };
        let mut keys = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            let Some(key) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            if validate_layout_name(key).is_ok() {
                keys.push(key.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

impl SessionStore for FileSessionStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        tokio::fs::try_exists(&path)
            .await
            .with_context(|| format!("checking {}", path.display()))
    }

    async fn save(&self, key: &str, record: &SessionMetadata) -> Result<()> {
        let path = self.path_for(key)?;
        let dir = self.dir.clone();
        let record = record.clone();
        debug!(key, path = %path.display(), "saving session");
        tokio::task::spawn_blocking(move || Self::save_sync(&dir, &path, &record))
            .await
            .context("session save task panicked")?
    }

    async fn load(&self, key: &str) -> Result<SessionMetadata> {
        let path = self.path_for(key)?;
        let key = key.to_string();
        tokio::task::spawn_blocking(move || Self::load_sync(&key, &path))
            .await
            .context("session load task panicked")?
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
        }
    }

    async fn list(&self) -> Result<Vec<String>> {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || Self::list_sync(&dir))
            .await
            .context("session list task panicked")?
    }
}
