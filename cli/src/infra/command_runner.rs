//! Infrastructure implementation of the `CommandRunner` port.
//!
//! `TokioCommandRunner` is the production implementation that uses tokio
//! for async process execution with guaranteed timeout and kill on all platforms.

use std::process::{Output, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::debug;

use crate::application::ports::CommandRunner;
use crate::domain::EnvBindings;

/// Default timeout for provider CLI calls.
pub const DEFAULT_CMD_TIMEOUT: Duration = Duration::from_secs(120);

/// Default timeout for a single remote deployment step.
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(3600);

/// Production `CommandRunner`.
///
/// The child is killed explicitly when the timeout fires; dropping the
/// future alone would leave the OS process running on some platforms.
/// Extra environment variables are set on every child without touching the
/// parent process environment.
pub struct TokioCommandRunner {
    timeout: Duration,
    envs: EnvBindings,
}

impl TokioCommandRunner {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            envs: EnvBindings::new(),
        }
    }

    /// Set `envs` on every spawned child.
    #[must_use]
    pub fn with_envs(mut self, envs: EnvBindings) -> Self {
        self.envs = envs;
        self
    }

    fn command(&self, program: &str, args: &[&str]) -> Command {
        let mut cmd = Command::new(program);
        cmd.args(args).envs(&self.envs).kill_on_drop(true);
        cmd
    }

    async fn collect(
        program: &str,
        mut child: Child,
        stdin: Option<Vec<u8>>,
        timeout: Duration,
    ) -> Result<Output> {
        let stdin_handle = child.stdin.take();
        let mut stdout_handle = child.stdout.take();
        let mut stderr_handle = child.stderr.take();

        let feed = async move {
            if let (Some(mut pipe), Some(input)) = (stdin_handle, stdin) {
                let _ = pipe.write_all(&input).await;
                let _ = pipe.shutdown().await;
            }
        };

        tokio::select! {
            result = async {
                let ((), status, stdout, stderr) = tokio::join!(
                    feed,
                    child.wait(),
                    drain(stdout_handle.as_mut()),
                    drain(stderr_handle.as_mut()),
                );
                Ok(Output {
                    status: status.with_context(|| format!("waiting for {program}"))?,
                    stdout,
                    stderr,
                })
            } => result,
            () = tokio::time::sleep(timeout) => {
                let _ = child.kill().await;
                anyhow::bail!("{program} timed out after {}s", timeout.as_secs())
            }
        }
    }
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<&mut R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(h) = pipe {
        let _ = h.read_to_end(&mut buf).await;
    }
    buf
}

impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        self.run_with_timeout(program, args, self.timeout).await
    }

    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output> {
        debug!(program, ?args, "run");
        let child = self
            .command(program, args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;
        Self::collect(program, child, None, timeout).await
    }

    async fn run_with_stdin(&self, program: &str, args: &[&str], input: &[u8]) -> Result<Output> {
        debug!(program, ?args, stdin_bytes = input.len(), "run with stdin");
        let child = self
            .command(program, args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;
        Self::collect(program, child, Some(input.to_vec()), self.timeout).await
    }

    fn spawn(&self, program: &str, args: &[&str]) -> Result<Child> {
        debug!(program, ?args, "spawn");
        self.command(program, args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))
    }
}
