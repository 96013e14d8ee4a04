//! Process execution seam for the external DNS server tools

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, trace};

/// Captured result of an external command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// A successful run with the given standard output
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed run with the given exit code and standard error
    pub fn failed(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Best human-readable explanation of the outcome, verbatim from the tool
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.status {
            Some(code) => format!("exited with status {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Runs external programs on behalf of the engine
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, feeding `stdin` when given
    async fn run(
        &self,
        program: &str,
        args: &[String],
        stdin: Option<&str>,
    ) -> std::io::Result<CommandOutput>;
}

/// Runs commands as child processes
///
/// Children are killed when the future is dropped, so wrapping a call in
/// `tokio::time::timeout` also stops the process.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        stdin: Option<&str>,
    ) -> std::io::Result<CommandOutput> {
        debug!("Running {} {}", program, args.join(" "));

        let mut command = Command::new(program);
        command
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .kill_on_drop(true);

        let mut child = command.spawn()?;

        if let Some(input) = stdin {
            if let Some(mut handle) = child.stdin.take() {
                handle.write_all(input.as_bytes()).await?;
                handle.shutdown().await?;
            }
        }

        let output = child.wait_with_output().await?;
        let result = CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        trace!("{} exited with {:?}", program, result.status);
        Ok(result)
    }
}
