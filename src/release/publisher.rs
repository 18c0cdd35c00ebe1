//! Remote release publishing.

use crate::error::{ReleaseError, Result};
use crate::process::{PROBE_TIMEOUT, ToolCommand, VCS_TIMEOUT, resolve_tool};
use std::future::Future;
use std::path::PathBuf;

/// Creates remote releases.
pub trait ReleasePublisher: Send + Sync {
    /// Fails with `ToolUnavailable` or `Unauthenticated` if publishing cannot work.
    fn check_ready(&self) -> impl Future<Output = Result<()>> + Send;

    /// Creates the release for the existing remote `tag` and uploads `assets`.
    fn publish(&self, tag: &str, assets: &[PathBuf]) -> impl Future<Output = Result<()>> + Send;
}

/// [`ReleasePublisher`] backed by the GitHub CLI.
#[derive(Debug, Clone)]
pub struct GhCli {
    repo_root: PathBuf,
}

impl GhCli {
    /// Publisher for the GitHub repository checked out at `repo_root`.
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    /// Arguments of `gh release create` for `tag` and `assets`.
    pub fn release_args(tag: &str, assets: &[PathBuf]) -> Vec<String> {
        let mut args: Vec<String> = [
            "release",
            "create",
            tag,
            "--verify-tag",
            "--title",
            tag,
            "--generate-notes",
        ]
        .iter()
        .map(|s| (*s).to_string())
        .collect();
        args.extend(assets.iter().map(|p| p.display().to_string()));
        args
    }

    fn gh(&self, context: impl Into<String>) -> ToolCommand {
        ToolCommand::new("gh")
            .current_dir(self.repo_root.as_path())
            .context(context)
    }
}

impl ReleasePublisher for GhCli {
    async fn check_ready(&self) -> Result<()> {
        resolve_tool("gh")?;
        let output = self
            .gh("checking GitHub authentication")
            .args(["auth", "status"])
            .timeout(PROBE_TIMEOUT)
            .run()
            .await?;
        if output.success() {
            Ok(())
        } else {
            Err(ReleaseError::Unauthenticated {
                tool: "gh".to_string(),
                reason: output.stderr.trim().to_string(),
            })
        }
    }

    async fn publish(&self, tag: &str, assets: &[PathBuf]) -> Result<()> {
        log::info!("Creating GitHub release {} with {} assets", tag, assets.len());
        self.gh(format!("creating release {tag}"))
            .args(Self::release_args(tag, assets))
            .timeout(VCS_TIMEOUT)
            .run_checked()
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_uploads_archives_and_ledger() {
        let args = GhCli::release_args(
            "v0.1.3",
            &[
                PathBuf::from("/out/opendev-macos-arm64.tar.gz"),
                PathBuf::from("/out/checksums.txt"),
            ],
        );
        assert_eq!(
            args,
            vec![
                "release",
                "create",
                "v0.1.3",
                "--verify-tag",
                "--title",
                "v0.1.3",
                "--generate-notes",
                "/out/opendev-macos-arm64.tar.gz",
                "/out/checksums.txt",
            ]
        );
    }
}
