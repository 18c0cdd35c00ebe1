//! Error types for release operations.
//!
//! Every variant carries enough context (tool, target, path) to tell the
//! operator what failed, plus recovery suggestions where an action exists.

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Result type alias for release operations
pub type Result<T> = std::result::Result<T, ReleaseError>;

/// Main error type for all release operations
#[derive(Error, Debug)]
pub enum ReleaseError {
    /// Version manifest missing, ambiguous, or not a strict `major.minor.patch`
    #[error("Malformed version manifest {}: {reason}", path.display())]
    ManifestMalformed {
        /// Manifest path
        path: PathBuf,
        /// What was wrong with it
        reason: String,
    },

    /// Bump kind other than major/minor/patch
    #[error("Invalid bump kind '{value}' (expected major, minor or patch)")]
    InvalidBumpKind {
        /// Rejected value
        value: String,
    },

    /// Uncommitted changes in the working tree
    #[error("Working tree at {} has uncommitted changes:\n{}", repo.display(), entries.join("\n"))]
    DirtyWorkingTree {
        /// Repository root
        repo: PathBuf,
        /// `git status --porcelain` lines
        entries: Vec<String>,
    },

    /// Required external tool cannot be resolved or started
    #[error("Required tool '{tool}' is unavailable: {reason}")]
    ToolUnavailable {
        /// Tool name
        tool: String,
        /// Resolution failure
        reason: String,
    },

    /// Remote client is present but not logged in
    #[error("'{tool}' is not authenticated: {reason}")]
    Unauthenticated {
        /// Tool name
        tool: String,
        /// Output of the auth check
        reason: String,
    },

    /// Foreign-architecture execution layer missing for an emulated target
    #[error("Cannot build {target}: {layer} is not available on this host.\n{remediation}")]
    EmulationUnavailable {
        /// Target identifier (e.g. macos-x86_64)
        target: String,
        /// Layer name (e.g. Rosetta 2)
        layer: String,
        /// How to install the layer
        remediation: String,
    },

    /// Target build did not produce its executable
    #[error("Build failed for {target}: {reason}")]
    BuildFailed {
        /// Target identifier
        target: String,
        /// Failure description
        reason: String,
    },

    /// External tool exceeded its time budget
    #[error("'{tool}' timed out after {}s while {context}", timeout.as_secs())]
    BuildTimedOut {
        /// Tool name
        tool: String,
        /// What the tool was doing
        context: String,
        /// Timeout that elapsed
        timeout: Duration,
    },

    /// Archive staging, compression or verification failed
    #[error("Packaging failed for {target}: {reason}")]
    StagingFailed {
        /// Target identifier
        target: String,
        /// Failure description
        reason: String,
    },

    /// Release tag already present
    #[error("Tag '{tag}' already exists; refusing to overwrite a release tag")]
    TagExists {
        /// Tag name
        tag: String,
    },

    /// Commit reached the remote but the tag did not
    #[error("Partial push to '{remote}': commit pushed, tag '{tag}' was not: {reason}")]
    PartialPush {
        /// Remote name
        remote: String,
        /// Tag that failed to push
        tag: String,
        /// Underlying failure
        reason: String,
        /// Release assets still to be published
        assets: Vec<PathBuf>,
    },

    /// External tool exited unsuccessfully
    #[error("'{tool}' failed while {context} (exit code: {code:?}){}", stderr_suffix(stderr))]
    ToolFailed {
        /// Tool name
        tool: String,
        /// What the tool was doing
        context: String,
        /// Exit code, if the process exited normally
        code: Option<i32>,
        /// Captured stderr
        stderr: String,
    },

    /// Invalid project or environment configuration
    #[error("Configuration error: {reason}")]
    Config {
        /// Reason for the error
        reason: String,
    },

    /// Formula template failed to render
    #[error("Template error: {0}")]
    Template(String),

    /// IO errors with the action and path that failed
    #[error("IO error while {action} {}: {source}", path.display())]
    Io {
        /// Action being performed
        action: &'static str,
        /// File or directory involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Operator interrupted the run
    #[error("Release cancelled")]
    Cancelled,
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("\n{trimmed}")
    }
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },
}

impl From<CliError> for ReleaseError {
    fn from(err: CliError) -> Self {
        Self::Config {
            reason: err.to_string(),
        }
    }
}

impl From<handlebars::RenderError> for ReleaseError {
    fn from(err: handlebars::RenderError) -> Self {
        Self::Template(err.to_string())
    }
}

impl From<handlebars::TemplateError> for ReleaseError {
    fn from(err: handlebars::TemplateError) -> Self {
        Self::Template(err.to_string())
    }
}

impl ReleaseError {
    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            Self::ManifestMalformed { path, .. } => vec![format!(
                "Ensure {} contains exactly one line of the form: version = \"X.Y.Z\"",
                path.display()
            )],
            Self::DirtyWorkingTree { .. } => vec![
                "Commit or stash your changes: git stash --include-untracked".to_string(),
            ],
            Self::ToolUnavailable { tool, .. } => {
                vec![format!("Install '{tool}' and make sure it is on PATH")]
            }
            Self::Unauthenticated { tool, .. } => vec![format!("Log in first: {tool} auth login")],
            Self::EmulationUnavailable { remediation, .. } => vec![remediation.clone()],
            Self::BuildTimedOut { .. } => vec![
                "Check network access for dependency downloads and rerun".to_string(),
            ],
            Self::TagExists { tag } => vec![
                format!("Inspect the existing tag: git show {tag}"),
                "Bump again to a fresh version instead of reusing the tag".to_string(),
            ],
            Self::PartialPush {
                remote,
                tag,
                assets,
                ..
            } => {
                let assets: String = assets
                    .iter()
                    .map(|a| format!(" {}", a.display()))
                    .collect();
                vec![
                    format!("Push the tag manually: git push {remote} {tag}"),
                    format!(
                        "Then publish the release: gh release create {tag} --verify-tag --title {tag} --generate-notes{assets}"
                    ),
                ]
            }
            _ => vec!["Check the error message above for specific details".to_string()],
        }
    }

    /// Build an IO error with context.
    pub fn io(action: &'static str, path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

/// Attach filesystem context to IO results.
pub trait ErrorExt<T> {
    /// Map an IO error into [`ReleaseError::Io`] naming the action and path.
    fn fs_context(self, action: &'static str, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, std::io::Error> {
    fn fs_context(self, action: &'static str, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|source| ReleaseError::io(action, path, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_failed_includes_stderr() {
        let err = ReleaseError::ToolFailed {
            tool: "git".to_string(),
            context: "committing release".to_string(),
            code: Some(128),
            stderr: "fatal: not a git repository\n".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("'git' failed while committing release"));
        assert!(msg.ends_with("fatal: not a git repository"));
    }

    #[test]
    fn partial_push_suggests_manual_tag_push() {
        let err = ReleaseError::PartialPush {
            remote: "origin".to_string(),
            tag: "v0.1.3".to_string(),
            reason: "rejected".to_string(),
            assets: vec![
                PathBuf::from("/out/artifacts/opendev-macos-arm64.tar.gz"),
                PathBuf::from("/out/artifacts/checksums.txt"),
            ],
        };
        let suggestions = err.recovery_suggestions();
        assert_eq!(suggestions[0], "Push the tag manually: git push origin v0.1.3");
        assert_eq!(
            suggestions[1],
            "Then publish the release: gh release create v0.1.3 --verify-tag --title v0.1.3 \
--generate-notes /out/artifacts/opendev-macos-arm64.tar.gz /out/artifacts/checksums.txt"
        );
    }

    #[test]
    fn fs_context_names_path() {
        let res: std::io::Result<()> = Err(std::io::Error::from(std::io::ErrorKind::NotFound));
        let err = res.fs_context("reading manifest", "/tmp/pyproject.toml").unwrap_err();
        assert!(err.to_string().contains("reading manifest /tmp/pyproject.toml"));
    }
}
