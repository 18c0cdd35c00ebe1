//! External tool invocation with bounded timeouts.
//!
//! Every subprocess the release touches (uv, python, git, gh, arch) goes
//! through [`ToolCommand`] so failures always name the tool and what it was
//! doing, and nothing can hang indefinitely.

use crate::error::{ReleaseError, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Timeout for a full target build step (30 minutes)
/// Dependency resolution plus PyInstaller analysis can be slow on cold caches
pub const BUILD_TIMEOUT: Duration = Duration::from_secs(1800);

/// Timeout for git and gh operations (5 minutes)
pub const VCS_TIMEOUT: Duration = Duration::from_secs(300);

/// Timeout for availability probes (10 seconds)
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Captured result of a finished tool invocation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Exit code, `None` if terminated by a signal
    pub code: Option<i32>,
    /// Captured stdout (lossy UTF-8)
    pub stdout: String,
    /// Captured stderr (lossy UTF-8)
    pub stderr: String,
}

impl ToolOutput {
    /// Whether the tool exited with status 0.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Description of one external tool invocation.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    tool: String,
    program: OsString,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    env_remove: Vec<String>,
    env_set: Vec<(String, OsString)>,
    timeout: Duration,
    context: String,
}

impl ToolCommand {
    /// Creates a command for `program`; the tool name defaults to the
    /// program's file name.
    pub fn new(program: impl Into<OsString>) -> Self {
        let program = program.into();
        let tool = Path::new(&program)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.to_string_lossy().into_owned());
        Self {
            tool,
            program,
            args: Vec::new(),
            cwd: None,
            env_remove: Vec::new(),
            env_set: Vec::new(),
            timeout: VCS_TIMEOUT,
            context: "running".to_string(),
        }
    }

    /// Overrides the tool name reported in errors.
    pub fn tool_name(mut self, tool: impl Into<String>) -> Self {
        self.tool = tool.into();
        self
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Removes inherited environment variables before spawning.
    pub fn env_remove<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.env_remove.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Sets an environment variable for the child.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<OsString>) -> Self {
        self.env_set.push((key.into(), value.into()));
        self
    }

    /// Sets the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Describes what the invocation is for, used in error messages
    /// (e.g. "creating build environment for macos-arm64").
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Reported tool name.
    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Variables removed from the inherited environment.
    pub fn removed_env(&self) -> &[String] {
        &self.env_remove
    }

    /// Wraps this command so it runs as an argument of `launcher`
    /// (e.g. `arch -x86_64 <program> <args..>`), keeping tool name,
    /// environment, timeout and context.
    pub fn wrapped_by(mut self, launcher: impl Into<OsString>, launcher_args: &[&str]) -> Self {
        let mut args: Vec<OsString> = launcher_args.iter().map(OsString::from).collect();
        args.push(std::mem::take(&mut self.program));
        args.append(&mut self.args);
        self.program = launcher.into();
        self.args = args;
        self
    }

    /// Human-readable command line for logs.
    pub fn display_line(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|s| s.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Runs the command to completion, capturing output.
    ///
    /// A missing program maps to [`ReleaseError::ToolUnavailable`], an expired
    /// timeout kills the child and maps to [`ReleaseError::BuildTimedOut`].
    /// A non-zero exit is returned as output, not an error; use
    /// [`ToolCommand::run_checked`] to treat it as failure.
    pub async fn run(&self) -> Result<ToolOutput> {
        log::debug!("[{}] {}", self.context, self.display_line());

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        for key in &self.env_remove {
            command.env_remove(key);
        }
        for (key, value) in &self.env_set {
            command.env(key, value);
        }

        let child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ReleaseError::ToolUnavailable {
                    tool: self.tool.clone(),
                    reason: format!("{} not found: {}", self.program.to_string_lossy(), e),
                }
            } else {
                ReleaseError::ToolFailed {
                    tool: self.tool.clone(),
                    context: self.context.clone(),
                    code: None,
                    stderr: format!("failed to spawn: {e}"),
                }
            }
        })?;

        // Dropping the wait future on timeout drops the child, and
        // kill_on_drop terminates it.
        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(ToolOutput {
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }),
            Ok(Err(e)) => Err(ReleaseError::ToolFailed {
                tool: self.tool.clone(),
                context: self.context.clone(),
                code: None,
                stderr: e.to_string(),
            }),
            Err(_elapsed) => {
                log::warn!(
                    "{} timed out after {}s, terminated",
                    self.tool,
                    self.timeout.as_secs()
                );
                Err(ReleaseError::BuildTimedOut {
                    tool: self.tool.clone(),
                    context: self.context.clone(),
                    timeout: self.timeout,
                })
            }
        }
    }

    /// Runs the command and fails with [`ReleaseError::ToolFailed`] on a
    /// non-zero exit.
    pub async fn run_checked(&self) -> Result<ToolOutput> {
        let output = self.run().await?;
        if output.success() {
            Ok(output)
        } else {
            Err(ReleaseError::ToolFailed {
                tool: self.tool.clone(),
                context: self.context.clone(),
                code: output.code,
                stderr: output.stderr,
            })
        }
    }
}

/// Resolves a tool on PATH.
pub fn resolve_tool(tool: &str) -> Result<PathBuf> {
    match which::which(tool) {
        Ok(path) => {
            log::debug!("Found {} at: {}", tool, path.display());
            Ok(path)
        }
        Err(e) => Err(ReleaseError::ToolUnavailable {
            tool: tool.to_string(),
            reason: format!("not found in PATH: {e}"),
        }),
    }
}
