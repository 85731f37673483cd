//! Scripted `CommandRunner` for adapter tests.

#![allow(clippy::expect_used)]

use std::collections::VecDeque;
use std::process::{ExitStatus, Output};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;

use crate::application::ports::CommandRunner;

#[cfg(unix)]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    ExitStatus::from_raw(code << 8)
}

#[cfg(windows)]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;
    #[allow(clippy::cast_sign_loss)]
    ExitStatus::from_raw(code as u32)
}

pub fn ok(stdout: &str) -> Output {
    Output {
        status: exit_status(0),
        stdout: stdout.as_bytes().to_vec(),
        stderr: Vec::new(),
    }
}

pub fn fail(code: i32, stderr: &str) -> Output {
    Output {
        status: exit_status(code),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// Returns queued outputs in order and records every `(program, args, stdin)`.
///
/// Running out of queued outputs is an error, so a test fails loudly when an
/// adapter makes a call it did not expect.
#[derive(Default)]
pub struct ScriptedRunner {
    replies: Mutex<VecDeque<Output>>,
    calls: Mutex<Vec<Call>>,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<Vec<u8>>,
}

impl Call {
    /// Args joined by spaces, for substring assertions.
    pub fn line(&self) -> String {
        self.args.join(" ")
    }
}

impl ScriptedRunner {
    pub fn new(replies: impl IntoIterator<Item = Output>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, reply: Output) {
        self.replies.lock().expect("mutex").push_back(reply);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("mutex").clone()
    }

    fn next(&self, program: &str, args: &[&str], stdin: Option<&[u8]>) -> Result<Output> {
        self.calls.lock().expect("mutex").push(Call {
            program: program.to_string(),
            args: args.iter().map(ToString::to_string).collect(),
            stdin: stdin.map(<[u8]>::to_vec),
        });
        self.replies
            .lock()
            .expect("mutex")
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("unexpected call: {program} {}", args.join(" ")))
    }
}

impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        self.next(program, args, None)
    }

    async fn run_with_timeout(&self, program: &str, args: &[&str], _: Duration) -> Result<Output> {
        self.next(program, args, None)
    }

    async fn run_with_stdin(&self, program: &str, args: &[&str], stdin: &[u8]) -> Result<Output> {
        self.next(program, args, Some(stdin))
    }

    fn spawn(&self, program: &str, _: &[&str]) -> Result<tokio::process::Child> {
        anyhow::bail!("spawn not scripted: {program}")
    }
}
