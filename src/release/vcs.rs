//! Version control operations used by a release.

use crate::error::{ReleaseError, Result};
use crate::process::{ToolCommand, VCS_TIMEOUT, resolve_tool};
use std::future::Future;
use std::path::{Path, PathBuf};

/// Repository operations of a release.
///
/// Each value is bound to one working tree; [`VersionControl::at`] opens
/// another one (e.g. a tap checkout) with the same backend.
pub trait VersionControl: Send + Sync {
    /// Working tree root.
    fn root(&self) -> &Path;

    /// Same backend bound to the working tree at `root`.
    fn at(&self, root: &Path) -> Self
    where
        Self: Sized;

    /// Fails with `ToolUnavailable` if the backend cannot run.
    fn check_available(&self) -> impl Future<Output = Result<()>> + Send;

    /// One entry per uncommitted change; empty when clean.
    fn status(&self) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Whether `path` differs from its last committed content (untracked counts).
    fn differs_from_head(&self, path: &Path) -> impl Future<Output = Result<bool>> + Send;

    /// Stages `paths`.
    fn stage(&self, paths: &[PathBuf]) -> impl Future<Output = Result<()>> + Send;

    /// Removes `paths` from the index, keeping working tree content.
    fn unstage(&self, paths: &[PathBuf]) -> impl Future<Output = Result<()>> + Send;

    /// Commits the index.
    fn commit(&self, message: &str) -> impl Future<Output = Result<()>> + Send;

    /// Whether `tag` exists locally.
    fn tag_exists(&self, tag: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Whether `tag` exists on `remote`.
    fn remote_tag_exists(&self, remote: &str, tag: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Creates the annotated `tag` at HEAD.
    fn create_tag(&self, tag: &str, message: &str) -> impl Future<Output = Result<()>> + Send;

    /// Pushes the current branch.
    fn push_branch(&self, remote: &str) -> impl Future<Output = Result<()>> + Send;

    /// Pushes `tag`.
    fn push_tag(&self, remote: &str, tag: &str) -> impl Future<Output = Result<()>> + Send;

    /// Clones `url` into `dest`.
    fn clone_repo(&self, url: &str, dest: &Path) -> impl Future<Output = Result<()>> + Send;
}

/// [`VersionControl`] backed by the `git` command line.
#[derive(Debug, Clone)]
pub struct GitCli {
    root: PathBuf,
}

impl GitCli {
    /// Git working tree at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn git(&self, context: impl Into<String>) -> ToolCommand {
        ToolCommand::new("git")
            .arg("-C")
            .arg(&self.root)
            .timeout(VCS_TIMEOUT)
            .context(context)
    }

    /// `path` relative to the root when it lies inside it.
    fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.root).unwrap_or(path).to_path_buf()
    }
}

impl VersionControl for GitCli {
    fn root(&self) -> &Path {
        &self.root
    }

    fn at(&self, root: &Path) -> Self {
        Self::new(root)
    }

    async fn check_available(&self) -> Result<()> {
        resolve_tool("git").map(|_| ())
    }

    async fn status(&self) -> Result<Vec<String>> {
        let output = self
            .git("checking working tree")
            .args(["status", "--porcelain"])
            .run_checked()
            .await?;
        Ok(output
            .stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn differs_from_head(&self, path: &Path) -> Result<bool> {
        let output = self
            .git(format!("checking {} for changes", path.display()))
            .args(["status", "--porcelain", "--"])
            .arg(self.relative(path))
            .run_checked()
            .await?;
        Ok(!output.stdout.trim().is_empty())
    }

    async fn stage(&self, paths: &[PathBuf]) -> Result<()> {
        self.git("staging release files")
            .args(["add", "--"])
            .args(paths.iter().map(|p| self.relative(p)))
            .run_checked()
            .await?;
        Ok(())
    }

    async fn unstage(&self, paths: &[PathBuf]) -> Result<()> {
        self.git("unstaging release files")
            .args(["reset", "-q", "--"])
            .args(paths.iter().map(|p| self.relative(p)))
            .run_checked()
            .await?;
        Ok(())
    }

    async fn commit(&self, message: &str) -> Result<()> {
        self.git("committing release")
            .args(["commit", "-m", message])
            .run_checked()
            .await?;
        Ok(())
    }

    async fn tag_exists(&self, tag: &str) -> Result<bool> {
        let output = self
            .git(format!("looking up tag {tag}"))
            .args(["rev-parse", "-q", "--verify"])
            .arg(format!("refs/tags/{tag}"))
            .run()
            .await?;
        match output.code {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            code => Err(ReleaseError::ToolFailed {
                tool: "git".to_string(),
                context: format!("looking up tag {tag}"),
                code,
                stderr: output.stderr,
            }),
        }
    }

    async fn remote_tag_exists(&self, remote: &str, tag: &str) -> Result<bool> {
        let output = self
            .git(format!("looking up tag {tag} on {remote}"))
            .args(["ls-remote", "--tags", remote])
            .arg(format!("refs/tags/{tag}"))
            .run_checked()
            .await?;
        Ok(!output.stdout.trim().is_empty())
    }

    async fn create_tag(&self, tag: &str, message: &str) -> Result<()> {
        self.git(format!("creating tag {tag}"))
            .args(["tag", "-a", tag, "-m", message])
            .run_checked()
            .await?;
        Ok(())
    }

    async fn push_branch(&self, remote: &str) -> Result<()> {
        self.git(format!("pushing to {remote}"))
            .args(["push", remote, "HEAD"])
            .run_checked()
            .await?;
        Ok(())
    }

    async fn push_tag(&self, remote: &str, tag: &str) -> Result<()> {
        self.git(format!("pushing tag {tag} to {remote}"))
            .args(["push", remote])
            .arg(format!("refs/tags/{tag}"))
            .run_checked()
            .await?;
        Ok(())
    }

    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<()> {
        ToolCommand::new("git")
            .args(["clone", "--quiet", url])
            .arg(dest)
            .timeout(VCS_TIMEOUT)
            .context(format!("cloning {url}"))
            .run_checked()
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn git(dir: &Path, args: &[&str]) {
        ToolCommand::new("git")
            .arg("-C")
            .arg(dir)
            .args(args.iter().copied())
            .run_checked()
            .await
            .unwrap();
    }

    /// Repository with one commit, or `None` where git is not installed.
    async fn repo() -> Option<(tempfile::TempDir, GitCli)> {
        which::which("git").ok()?;
        let dir = tempfile::tempdir().unwrap();
        git(dir.path(), &["init", "-q"]).await;
        git(dir.path(), &["config", "user.email", "release@example.com"]).await;
        git(dir.path(), &["config", "user.name", "Release"]).await;
        git(dir.path(), &["config", "commit.gpgsign", "false"]).await;
        git(dir.path(), &["config", "tag.gpgsign", "false"]).await;
        std::fs::write(dir.path().join("pyproject.toml"), "version = \"0.1.2\"\n").unwrap();
        git(dir.path(), &["add", "."]).await;
        git(dir.path(), &["commit", "-q", "-m", "init"]).await;
        let cli = GitCli::new(dir.path());
        Some((dir, cli))
    }

    #[tokio::test]
    async fn status_lists_changes() {
        let Some((dir, git)) = repo().await else { return };
        assert!(git.status().await.unwrap().is_empty());

        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        let entries = git.status().await.unwrap();
        assert_eq!(entries, vec!["?? notes.txt".to_string()]);
    }

    #[tokio::test]
    async fn differs_from_head_sees_untracked_and_modified() {
        let Some((dir, git)) = repo().await else { return };
        let manifest = dir.path().join("pyproject.toml");
        assert!(!git.differs_from_head(&manifest).await.unwrap());

        std::fs::write(&manifest, "version = \"0.1.3\"\n").unwrap();
        assert!(git.differs_from_head(&manifest).await.unwrap());

        let formula = dir.path().join("Formula/opendev.rb");
        std::fs::create_dir_all(formula.parent().unwrap()).unwrap();
        std::fs::write(&formula, "class Opendev < Formula\nend\n").unwrap();
        assert!(git.differs_from_head(&formula).await.unwrap());
    }

    #[tokio::test]
    async fn commit_and_tag() {
        let Some((dir, git)) = repo().await else { return };
        let manifest = dir.path().join("pyproject.toml");
        std::fs::write(&manifest, "version = \"0.1.3\"\n").unwrap();

        git.stage(&[manifest.clone()]).await.unwrap();
        git.commit("chore(release): v0.1.3").await.unwrap();
        assert!(git.status().await.unwrap().is_empty());

        assert!(!git.tag_exists("v0.1.3").await.unwrap());
        git.create_tag("v0.1.3", "Release v0.1.3").await.unwrap();
        assert!(git.tag_exists("v0.1.3").await.unwrap());
        assert!(git.create_tag("v0.1.3", "again").await.is_err());
    }

    #[tokio::test]
    async fn unstage_keeps_content() {
        let Some((dir, git)) = repo().await else { return };
        let manifest = dir.path().join("pyproject.toml");
        std::fs::write(&manifest, "version = \"0.1.3\"\n").unwrap();

        git.stage(&[manifest.clone()]).await.unwrap();
        git.unstage(&[manifest.clone()]).await.unwrap();

        assert_eq!(git.status().await.unwrap(), vec![" M pyproject.toml".to_string()]);
        assert_eq!(std::fs::read_to_string(&manifest).unwrap(), "version = \"0.1.3\"\n");
    }

    #[tokio::test]
    async fn remote_tags_are_looked_up_on_the_remote() {
        let Some((_dir, cli)) = repo().await else { return };
        let remote = tempfile::tempdir().unwrap();
        git(remote.path(), &["init", "-q", "--bare"]).await;
        git(
            cli.root(),
            &["remote", "add", "origin", &remote.path().display().to_string()],
        )
        .await;

        cli.create_tag("v0.1.3", "Release v0.1.3").await.unwrap();
        assert!(!cli.remote_tag_exists("origin", "v0.1.3").await.unwrap());

        cli.push_tag("origin", "v0.1.3").await.unwrap();
        assert!(cli.remote_tag_exists("origin", "v0.1.3").await.unwrap());
        assert!(!cli.remote_tag_exists("origin", "v0.1.30").await.unwrap());
    }
}
