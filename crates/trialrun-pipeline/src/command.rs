//! External command execution with captured output.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

/// An external command to run to completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Human-readable name used in logs.
    pub name: String,

    /// Executable followed by its arguments.
    pub command: Vec<String>,

    /// Working directory, inherited when unset.
    pub cwd: Option<PathBuf>,

    /// Extra environment variables.
    pub envs: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(name: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command,
            cwd: None,
            envs: Vec::new(),
        }
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Exit code (-1 when killed by a signal or never started).
    pub exit_code: i32,

    pub stdout: String,

    pub stderr: String,

    pub duration_ms: u64,
}

impl CommandOutput {
    /// Whether the command exited with code 0.
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }

    /// Output for a command that could not be started.
    pub fn spawn_failure(error: &std::io::Error) -> Self {
        Self {
            exit_code: -1,
            stdout: String::new(),
            stderr: format!("failed to start process: {error}"),
            duration_ms: 0,
        }
    }

    /// Log-file rendering with explicit section markers.
    pub fn render_log(&self) -> String {
        format!(
            "=== STDOUT ===\n{}\n=== STDERR ===\n{}\n=== EXIT CODE: {} ===\n",
            self.stdout.trim_end(),
            self.stderr.trim_end(),
            self.exit_code
        )
    }
}

/// Run `spec` to completion and capture its output.
///
/// Blocks the task until the process exits; there is no timeout. Dropping
/// the returned future kills the child.
pub async fn execute(spec: &CommandSpec) -> std::io::Result<CommandOutput> {
    let (exe, args) = spec.command.split_first().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("command {} is empty", spec.name),
        )
    })?;

    let start = Instant::now();
    let mut cmd = Command::new(exe);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &spec.cwd {
        cmd.current_dir(dir);
    }
    for (key, value) in &spec.envs {
        cmd.env(key, value);
    }

    let output = cmd.spawn()?.wait_with_output().await?;

    Ok(CommandOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        duration_ms: start.elapsed().as_millis() as u64,
    })
}
