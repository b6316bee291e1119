//! External command invocation
//!
//! Every one-shot tool call in devdroid goes through [`CommandRunner`] so the
//! layers above it can be exercised against a scripted fake.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;

use devdroid_core::prelude::*;

/// A single external command invocation.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub program: String,
    pub args: Vec<String>,
    /// Working directory, when it differs from the session's.
    pub cwd: Option<PathBuf>,
    /// Treat a non-zero exit as a failure outcome: log captured output and
    /// return `Ok(None)` so the caller decides how to react.
    pub check: bool,
    /// Buffer and decode stdout/stderr. When `false` the child inherits the
    /// session's own streams (needed for interactive build output).
    pub capture: bool,
}

impl CommandRequest {
    /// A checked, captured invocation. Most bridge queries use this shape.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
            check: true,
            capture: true,
        }
    }

    /// Run in the given working directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Return the full output even on a non-zero exit.
    pub fn unchecked(mut self) -> Self {
        self.check = false;
        self
    }

    /// Let the child write straight to the session's stdout/stderr.
    pub fn inherit_stdio(mut self) -> Self {
        self.capture = false;
        self
    }

    /// Human-readable rendering of the command line.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Captured result of a completed command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Capability interface for running external commands.
///
/// The pipeline and bridge are generic over this trait; tests substitute a
/// fake that replays scripted outputs instead of spawning processes.
#[trait_variant::make(CommandRunner: Send)]
pub trait LocalCommandRunner {
    /// Run a command to completion.
    ///
    /// Returns `Ok(None)` when the request is checked and the command exited
    /// non-zero. Executable-not-found surfaces as [`Error::ToolNotFound`],
    /// naming the missing program.
    async fn run(&self, request: CommandRequest) -> Result<Option<CommandOutput>>;
}

/// The real runner, backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl LocalCommandRunner for SystemRunner {
    async fn run(&self, request: CommandRequest) -> Result<Option<CommandOutput>> {
        info!(">>> {}", request.display());

        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args);
        if let Some(dir) = &request.cwd {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null());
        if request.capture {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        }

        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::tool_not_found(&request.program)
            } else {
                Error::process_spawn(e.to_string())
            }
        })?;

        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if request.check && !output.status.success() {
            warn!(
                "Command failed ({}), exit code: {:?}",
                request.display(),
                result.code
            );
            if request.capture {
                if !result.stdout.trim().is_empty() {
                    warn!("stdout: {}", result.stdout.trim_end());
                }
                if !result.stderr.trim().is_empty() {
                    warn!("stderr: {}", result.stderr.trim_end());
                }
            }
            return Ok(None);
        }

        Ok(Some(result))
    }
}
