//! Remote shell over the system OpenSSH client.
//!
//! Every remote action is one `ssh` invocation through a `CommandRunner`:
//! steps are piped to `bash -s`, uploads to `cat > <path>`, downloads read
//! `cat <path>`. Transfers stream in fixed-size chunks and report progress
//! after each chunk.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

use crate::application::ports::{
    CommandRunner, ConnectTarget, RemoteConnector, RemoteShell, TransferCallback,
    TransferProgress,
};
use crate::domain::{ProvisionError, RenderedStep, StepOutcome, shell_quote};

/// Transfer chunk size.
pub const CHUNK_SIZE: usize = 32 * 1024;

/// Exit status the `ssh` client reserves for its own failures.
const SSH_TRANSPORT_FAILURE: i32 = 255;

/// Arguments for `ssh` running `remote_cmd` on `target`.
#[must_use]
pub fn ssh_args(target: &ConnectTarget, remote_cmd: &str) -> Vec<String> {
    vec![
        "-i".to_string(),
        target.private_key.display().to_string(),
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        "-o".to_string(),
        "StrictHostKeyChecking=accept-new".to_string(),
        "-o".to_string(),
        format!("ConnectTimeout={}", target.timeout.as_secs().max(1)),
        "-o".to_string(),
        "LogLevel=ERROR".to_string(),
        format!("{}@{}", target.username, target.host),
        remote_cmd.to_string(),
    ]
}

/// Opens `SshShell`s after a reachability probe.
pub struct SshConnector<R> {
    runner: Arc<R>,
    binary: String,
}

impl<R: CommandRunner> SshConnector<R> {
    pub fn new(runner: R, binary: impl Into<String>) -> Self {
        Self {
            runner: Arc::new(runner),
            binary: binary.into(),
        }
    }
}

impl<R: CommandRunner> RemoteConnector for SshConnector<R> {
    type Shell = SshShell<R>;

    async fn connect(&self, target: &ConnectTarget) -> Result<SshShell<R>> {
        let args = ssh_args(target, "true");
        let argv: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = self
            .runner
            .run_with_timeout(&self.binary, &argv, target.timeout + Duration::from_secs(5))
            .await?;
        if !out.status.success() {
            anyhow::bail!(
                "ssh {}@{}: {}",
                target.username,
                target.host,
                String::from_utf8_lossy(&out.stderr).trim()
            );
        }
        Ok(SshShell {
            runner: Arc::clone(&self.runner),
            binary: self.binary.clone(),
            peer: format!("{}:22", target.host),
            target: target.clone(),
        })
    }
}

/// An `ssh` destination that answered the probe.
pub struct SshShell<R> {
    runner: Arc<R>,
    binary: String,
    target: ConnectTarget,
    peer: String,
}

impl<R: CommandRunner> SshShell<R> {
    fn transport_error(&self, stderr: &[u8]) -> anyhow::Error {
        ProvisionError::Connection {
            target: format!("{}@{}", self.target.username, self.target.host),
            attempts: 1,
            reason: String::from_utf8_lossy(stderr).trim().to_string(),
        }
        .into()
    }

    /// Run `remote_cmd` and fail unless it exits 0.
    async fn checked(&self, remote_cmd: &str) -> Result<String> {
        let args = ssh_args(&self.target, remote_cmd);
        let argv: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = self.runner.run(&self.binary, &argv).await?;
        match out.status.code() {
            Some(0) => Ok(String::from_utf8_lossy(&out.stdout).into_owned()),
            Some(SSH_TRANSPORT_FAILURE) => Err(self.transport_error(&out.stderr)),
            _ => anyhow::bail!(
                "remote command failed: {remote_cmd}: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            ),
        }
    }

    fn spawn(&self, remote_cmd: &str) -> Result<tokio::process::Child> {
        let args = ssh_args(&self.target, remote_cmd);
        let argv: Vec<&str> = args.iter().map(String::as_str).collect();
        self.runner.spawn(&self.binary, &argv)
    }

    async fn finish(&self, child: tokio::process::Child, what: &str) -> Result<()> {
        let out = child
            .wait_with_output()
            .await
            .with_context(|| format!("waiting for {what}"))?;
        match out.status.code() {
            Some(0) => Ok(()),
            Some(SSH_TRANSPORT_FAILURE) => Err(self.transport_error(&out.stderr)),
            _ => anyhow::bail!(
                "{what} failed: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            ),
        }
    }

    async fn upload_file(
        &self,
        local: &Path,
        remote: &str,
        progress: TransferCallback<'_>,
    ) -> Result<u64> {
        let mut file = tokio::fs::File::open(local)
            .await
            .with_context(|| format!("opening {}", local.display()))?;
        let total = file.metadata().await?.len();
        let filename = file_name(local);

        let mut child = self.spawn(&format!("cat > {}", shell_quote(remote)))?;
        let mut stdin = child.stdin.take().context("ssh stdin not piped")?;
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut sent = 0u64;
        progress(&TransferProgress {
            filename: &filename,
            total,
            sent,
            peer: &self.peer,
        });
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            stdin
                .write_all(&buf[..n])
                .await
                .with_context(|| format!("streaming {} to {}", local.display(), self.peer))?;
            sent += n as u64;
            progress(&TransferProgress {
                filename: &filename,
                total,
                sent,
                peer: &self.peer,
            });
        }
        stdin.shutdown().await?;
        drop(stdin);
        self.finish(child, &format!("upload of {}", local.display()))
            .await?;
        debug!(file = %local.display(), remote, bytes = sent, "uploaded");
        Ok(sent)
    }

    async fn download_file(
        &self,
        remote: &str,
        local: &Path,
        progress: TransferCallback<'_>,
    ) -> Result<u64> {
        let quoted = shell_quote(remote);
        let total: u64 = self
            .checked(&format!("wc -c < {quoted}"))
            .await
            .with_context(|| format!("sizing {remote}"))?
            .trim()
            .parse()
            .with_context(|| format!("unexpected size for {remote}"))?;
        let filename = remote.rsplit('/').next().unwrap_or(remote).to_string();

        if let Some(parent) = local.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(local)
            .await
            .with_context(|| format!("creating {}", local.display()))?;

        let mut child = self.spawn(&format!("cat {quoted}"))?;
        drop(child.stdin.take());
        let mut stdout = child.stdout.take().context("ssh stdout not piped")?;
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut received = 0u64;
        loop {
            let n = stdout.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n]).await?;
            received += n as u64;
            progress(&TransferProgress {
                filename: &filename,
                total,
                sent: received,
                peer: &self.peer,
            });
        }
        file.flush().await?;
        self.finish(child, &format!("download of {remote}")).await?;
        debug!(remote, file = %local.display(), bytes = received, "downloaded");
        Ok(received)
    }
}

impl<R: CommandRunner> RemoteShell for SshShell<R> {
    fn peer(&self) -> &str {
        &self.peer
    }

    async fn execute(&self, step: &RenderedStep) -> Result<StepOutcome> {
        let remote_cmd = if step.sudo { "sudo bash -s" } else { "bash -s" };
        let args = ssh_args(&self.target, remote_cmd);
        let argv: Vec<&str> = args.iter().map(String::as_str).collect();
        info!(step = %step.label, peer = %self.peer, "executing");
        let out = self
            .runner
            .run_with_stdin(&self.binary, &argv, step.script.as_bytes())
            .await
            .with_context(|| format!("running '{}'", step.label))?;
        let exit_status = match out.status.code() {
            Some(SSH_TRANSPORT_FAILURE) => return Err(self.transport_error(&out.stderr)),
            Some(code) => code,
            None => anyhow::bail!("'{}' was terminated by a signal", step.label),
        };
        Ok(StepOutcome {
            label: step.label.clone(),
            exit_status,
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        })
    }

    async fn upload(
        &self,
        local: &Path,
        remote: &str,
        progress: TransferCallback<'_>,
    ) -> Result<u64> {
        let meta = tokio::fs::metadata(local)
            .await
            .with_context(|| format!("reading {}", local.display()))?;
        if !meta.is_dir() {
            return self.upload_file(local, remote, progress).await;
        }

        let (dirs, files) = walk(local).await?;
        let root = remote.trim_end_matches('/');
        let mut mkdir = format!("mkdir -p {}", shell_quote(root));
        for dir in &dirs {
            mkdir.push(' ');
            mkdir.push_str(&shell_quote(&remote_join(root, dir)));
        }
        self.checked(&mkdir).await?;

        let mut total = 0;
        for rel in &files {
            total += self
                .upload_file(&local.join(rel), &remote_join(root, rel), progress)
                .await?;
        }
        Ok(total)
    }

    async fn download(
        &self,
        remote: &str,
        local: &Path,
        recursive: bool,
        progress: TransferCallback<'_>,
    ) -> Result<u64> {
        if !recursive {
            let dest = if tokio::fs::metadata(local).await.is_ok_and(|m| m.is_dir()) {
                local.join(remote.rsplit('/').next().unwrap_or(remote))
            } else {
                local.to_path_buf()
            };
            return self.download_file(remote, &dest, progress).await;
        }

        let root = match remote.trim_end_matches('/') {
            "" => "/",
            r => r,
        };
        let listing = self
            .checked(&format!("find {} -type f", shell_quote(root)))
            .await?;
        let mut total = 0;
        for path in listing.lines().filter(|l| !l.is_empty()) {
            let rel = path
                .strip_prefix(root)
                .unwrap_or(path)
                .trim_start_matches('/');
            total += self
                .download_file(path, &local.join(rel), progress)
                .await?;
        }
        Ok(total)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

/// Join a relative local path onto a remote directory with `/` separators.
fn remote_join(root: &str, rel: &Path) -> String {
    let mut out = root.to_string();
    for part in rel.components() {
        out.push('/');
        out.push_str(&part.as_os_str().to_string_lossy());
    }
    out
}

/// Relative subdirectories and files under `root`, sorted.
async fn walk(root: &Path) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let mut dirs = Vec::new();
    let mut files = Vec::new();
    let mut pending = vec![PathBuf::new()];
    while let Some(rel) = pending.pop() {
        let mut entries = tokio::fs::read_dir(root.join(&rel))
            .await
            .with_context(|| format!("listing {}", root.join(&rel).display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let child = rel.join(entry.file_name());
            if entry.file_type().await?.is_dir() {
                dirs.push(child.clone());
                pending.push(child);
            } else {
                files.push(child);
            }
        }
    }
    dirs.sort();
    files.sort();
    Ok((dirs, files))
}
