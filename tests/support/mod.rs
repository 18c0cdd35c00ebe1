//! Fakes and fixtures shared by the pipeline tests.
//!
//! Every external system the coordinator touches has an in-memory stand-in
//! whose state stays inspectable after the fake is moved into the
//! coordinator.

#![allow(dead_code)]

use opendev_release::bundler::{
    Arch, BuildTarget, Builder, ExecutionLayer, Os, TargetPaths,
};
use opendev_release::config::{self, Overrides, PublishMode, ReleaseConfig};
use opendev_release::process::ToolCommand;
use opendev_release::release::{ReleaseCoordinator, ReleasePublisher, VersionControl};
use opendev_release::{ReleaseError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// One commit recorded by [`FakeVcs`].
#[derive(Debug, Clone)]
pub struct Commit {
    pub message: String,
    pub paths: Vec<PathBuf>,
}

/// State of one fake repository.
#[derive(Debug, Default)]
pub struct RepoState {
    /// Porcelain entries reported by `status`
    pub dirty: Vec<String>,
    /// File contents at HEAD
    pub head: HashMap<PathBuf, String>,
    pub staged: Vec<PathBuf>,
    pub commits: Vec<Commit>,
    pub tags: Vec<String>,
    /// Tags on the remote that are missing locally
    pub remote_tags: Vec<String>,
    pub pushed_branches: Vec<String>,
    pub pushed_tags: Vec<String>,
    pub fail_commit: bool,
    pub fail_tag_push: bool,
}

/// In-memory [`VersionControl`]; clones share state across roots.
#[derive(Debug, Clone)]
pub struct FakeVcs {
    root: PathBuf,
    repos: Arc<Mutex<HashMap<PathBuf, RepoState>>>,
    clones: Arc<Mutex<Vec<(String, PathBuf)>>>,
}

impl FakeVcs {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            repos: Arc::default(),
            clones: Arc::default(),
        }
    }

    /// Runs `f` on the state of the repository at `root`.
    pub fn repo<R>(&self, root: &Path, f: impl FnOnce(&mut RepoState) -> R) -> R {
        let mut repos = self.repos.lock().unwrap();
        f(repos.entry(root.to_path_buf()).or_default())
    }

    /// Runs `f` on the state of this value's repository.
    pub fn with<R>(&self, f: impl FnOnce(&mut RepoState) -> R) -> R {
        self.repo(&self.root.clone(), f)
    }

    /// Records `path`'s current on-disk content as committed.
    pub fn commit_existing(&self, path: &Path) {
        let contents = std::fs::read_to_string(path).unwrap();
        self.with(|repo| repo.head.insert(path.to_path_buf(), contents));
    }

    pub fn clones(&self) -> Vec<(String, PathBuf)> {
        self.clones.lock().unwrap().clone()
    }
}

impl VersionControl for FakeVcs {
    fn root(&self) -> &Path {
        &self.root
    }

    fn at(&self, root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            repos: Arc::clone(&self.repos),
            clones: Arc::clone(&self.clones),
        }
    }

    async fn check_available(&self) -> Result<()> {
        Ok(())
    }

    async fn status(&self) -> Result<Vec<String>> {
        Ok(self.with(|repo| repo.dirty.clone()))
    }

    async fn differs_from_head(&self, path: &Path) -> Result<bool> {
        let on_disk = std::fs::read_to_string(path).ok();
        Ok(self.with(|repo| repo.head.get(path).cloned() != on_disk))
    }

    async fn stage(&self, paths: &[PathBuf]) -> Result<()> {
        self.with(|repo| repo.staged.extend_from_slice(paths));
        Ok(())
    }

    async fn unstage(&self, paths: &[PathBuf]) -> Result<()> {
        self.with(|repo| repo.staged.retain(|p| !paths.contains(p)));
        Ok(())
    }

    async fn commit(&self, message: &str) -> Result<()> {
        self.with(|repo| {
            if repo.fail_commit {
                return Err(ReleaseError::ToolFailed {
                    tool: "git".to_string(),
                    context: "committing release".to_string(),
                    code: Some(1),
                    stderr: "pre-commit hook failed".to_string(),
                });
            }
            let paths = std::mem::take(&mut repo.staged);
            for path in &paths {
                if let Ok(contents) = std::fs::read_to_string(path) {
                    repo.head.insert(path.clone(), contents);
                }
            }
            repo.commits.push(Commit {
                message: message.to_string(),
                paths,
            });
            Ok(())
        })
    }

    async fn tag_exists(&self, tag: &str) -> Result<bool> {
        Ok(self.with(|repo| repo.tags.iter().any(|t| t == tag)))
    }

    async fn remote_tag_exists(&self, _remote: &str, tag: &str) -> Result<bool> {
        Ok(self.with(|repo| {
            repo.remote_tags.iter().chain(&repo.pushed_tags).any(|t| t == tag)
        }))
    }

    async fn create_tag(&self, tag: &str, _message: &str) -> Result<()> {
        self.with(|repo| repo.tags.push(tag.to_string()));
        Ok(())
    }

    async fn push_branch(&self, remote: &str) -> Result<()> {
        self.with(|repo| repo.pushed_branches.push(remote.to_string()));
        Ok(())
    }

    async fn push_tag(&self, remote: &str, tag: &str) -> Result<()> {
        self.with(|repo| {
            if repo.fail_tag_push {
                return Err(ReleaseError::ToolFailed {
                    tool: "git".to_string(),
                    context: format!("pushing tag {tag} to {remote}"),
                    code: Some(1),
                    stderr: "! [rejected] (protected tag)".to_string(),
                });
            }
            repo.pushed_tags.push(tag.to_string());
            Ok(())
        })
    }

    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<()> {
        std::fs::create_dir_all(dest).map_err(|e| ReleaseError::io("cloning into", dest, e))?;
        self.clones
            .lock()
            .unwrap()
            .push((url.to_string(), dest.to_path_buf()));
        Ok(())
    }
}

/// Records releases; optionally unauthenticated.
#[derive(Debug, Clone, Default)]
pub struct FakePublisher {
    pub unauthenticated: bool,
    pub releases: Arc<Mutex<Vec<(String, Vec<PathBuf>)>>>,
}

impl ReleasePublisher for FakePublisher {
    async fn check_ready(&self) -> Result<()> {
        if self.unauthenticated {
            Err(ReleaseError::Unauthenticated {
                tool: "gh".to_string(),
                reason: "You are not logged into any GitHub hosts".to_string(),
            })
        } else {
            Ok(())
        }
    }

    async fn publish(&self, tag: &str, assets: &[PathBuf]) -> Result<()> {
        self.releases
            .lock()
            .unwrap()
            .push((tag.to_string(), assets.to_vec()));
        Ok(())
    }
}

/// Writes a small deterministic executable per target.
#[derive(Debug, Clone, Default)]
pub struct FakeBuilder {
    pub fail_on: Option<Arch>,
    /// `(target id, layer name)` per build
    pub builds: Arc<Mutex<Vec<(String, String)>>>,
}

impl Builder for FakeBuilder {
    async fn check_available(&self, _target: &BuildTarget) -> Result<()> {
        Ok(())
    }

    async fn build<L: ExecutionLayer>(
        &self,
        target: &BuildTarget,
        paths: &TargetPaths,
        layer: &L,
    ) -> Result<()> {
        self.builds
            .lock()
            .unwrap()
            .push((target.id(), layer.name().to_string()));
        if self.fail_on == Some(target.arch) {
            return Err(ReleaseError::ToolFailed {
                tool: "pyinstaller".to_string(),
                context: format!("running PyInstaller for {target}"),
                code: Some(1),
                stderr: "ERROR: Unable to find 'app/ui/style.tcss'".to_string(),
            });
        }
        std::fs::write(&paths.binary, format!("#!/bin/sh\necho opendev {target}\n"))
            .map_err(|e| ReleaseError::io("writing", &paths.binary, e))
    }
}

/// Foreign-architecture layer that can be switched off.
#[derive(Debug, Clone)]
pub struct FakeLayer {
    pub available: bool,
    pub probes: Arc<AtomicUsize>,
}

impl FakeLayer {
    pub fn available() -> Self {
        Self {
            available: true,
            probes: Arc::default(),
        }
    }

    pub fn missing() -> Self {
        Self {
            available: false,
            probes: Arc::default(),
        }
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

impl ExecutionLayer for FakeLayer {
    fn name(&self) -> &str {
        "fake rosetta"
    }

    async fn probe(&self, target: &BuildTarget) -> Result<()> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.available {
            Ok(())
        } else {
            Err(ReleaseError::EmulationUnavailable {
                target: target.id(),
                layer: self.name().to_string(),
                remediation: "softwareupdate --install-rosetta --agree-to-license".to_string(),
            })
        }
    }

    fn wrap(&self, command: ToolCommand) -> ToolCommand {
        command.wrapped_by("arch", &["-x86_64"])
    }
}

/// A throwaway opendev checkout with its tap and output directories.
pub struct Project {
    _dir: TempDir,
    pub root: PathBuf,
    pub tap_dir: PathBuf,
    pub out_dir: PathBuf,
}

pub const PYPROJECT: &str = "[project]\nname = \"opendev\"\nversion = \"{version}\"\ndescription = \"AI coding assistant for the terminal\"\nrequires-python = \">=3.12\"\n\n[tool.ruff]\nline-length = 100\n";

impl Project {
    pub fn new(version: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("opendev");
        std::fs::create_dir_all(root.join("app/ui")).unwrap();
        std::fs::write(root.join("app/ui/app.py"), "print('opendev')\n").unwrap();
        std::fs::write(root.join("app/ui/style.tcss"), "Screen {}\n").unwrap();
        std::fs::write(root.join("pyproject.toml"), PYPROJECT.replace("{version}", version)).unwrap();
        Self {
            tap_dir: dir.path().join("homebrew-opendev"),
            out_dir: dir.path().join("out"),
            root,
            _dir: dir,
        }
    }

    pub fn manifest(&self) -> String {
        std::fs::read_to_string(self.root.join("pyproject.toml")).unwrap()
    }

    pub fn formula_path(&self) -> PathBuf {
        self.root.join("Formula/opendev.rb")
    }

    pub fn config(&self, mode: PublishMode) -> ReleaseConfig {
        let overrides = Overrides {
            tap_dir: Some(self.tap_dir.clone()),
            out_dir: Some(self.out_dir.clone()),
            local_only: mode == PublishMode::LocalOnly,
            ..Overrides::default()
        };
        config::from_manifest_text(
            &self.root,
            &self.manifest(),
            &overrides,
            BuildTarget::plan(Os::MacOs, Arch::AArch64),
        )
        .unwrap()
    }

    /// Fakes bound to this project.
    pub fn fakes(&self) -> Fakes {
        Fakes {
            vcs: FakeVcs::new(&self.root),
            publisher: FakePublisher::default(),
            builder: FakeBuilder::default(),
            layer: FakeLayer::available(),
            cancel: CancellationToken::new(),
        }
    }
}

/// Handles to every fake of one run.
#[derive(Clone)]
pub struct Fakes {
    pub vcs: FakeVcs,
    pub publisher: FakePublisher,
    pub builder: FakeBuilder,
    pub layer: FakeLayer,
    pub cancel: CancellationToken,
}

impl Fakes {
    pub fn coordinator(
        &self,
        config: ReleaseConfig,
    ) -> ReleaseCoordinator<FakeVcs, FakePublisher, FakeBuilder, FakeLayer> {
        ReleaseCoordinator::new(
            self.vcs.clone(),
            self.publisher.clone(),
            self.builder.clone(),
            self.layer.clone(),
            self.cancel.clone(),
            config,
        )
        .unwrap()
    }
}
