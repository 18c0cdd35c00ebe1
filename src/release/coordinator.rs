//! Release pipeline coordination.
//!
//! This module provides the [`ReleaseCoordinator`] that drives one release
//! from precondition checks to the published release, and the
//! [`PipelineError`] that reports where a failed run stopped.

use super::{ReleasePublisher, ReleaseState, VersionControl};
use crate::bundler::utils::fs;
use crate::bundler::{
    Artifact, ArtifactPackager, BuildMatrixExecutor, Builder, ExecutionLayer,
};
use crate::config::{DescriptorTarget, PublishMode, ReleaseConfig};
use crate::error::{ReleaseError, Result};
use crate::formula::FormulaGenerator;
use crate::version::{BumpKind, Version, VersionStore};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Steps after the tag, in order.
const POST_TAG_STEPS: [ReleaseState; 3] = [
    ReleaseState::Pushed,
    ReleaseState::Published,
    ReleaseState::Done,
];

/// A failed release run.
#[derive(Debug, thiserror::Error)]
#[error("Release failed during {} (last completed: {reached}): {source}", .phase.step())]
pub struct PipelineError {
    /// State the failing step would have reached
    pub phase: ReleaseState,
    /// Last state actually reached
    pub reached: ReleaseState,
    /// Whether the manifest and formula were restored
    pub rolled_back: bool,
    /// Local-only runs have no remote steps to recover
    pub local_only: bool,
    /// Underlying failure
    #[source]
    pub source: ReleaseError,
}

impl PipelineError {
    /// Actionable next steps for the operator.
    ///
    /// Failures after the commit are never rolled back; the guidance then
    /// lists what already happened and what is left to do by hand.
    pub fn recovery_guidance(&self) -> Vec<String> {
        let mut guidance = self.source.recovery_suggestions();
        if self.rolled_back {
            guidance.push("The version manifest and formula were restored; rerun when fixed".to_string());
        }
        if self.reached >= ReleaseState::Committed {
            guidance.push(format!("Completed: release commit{}", if self.reached >= ReleaseState::Tagged { ", tag" } else { "" }));
            let remaining: Vec<&str> = std::iter::once(ReleaseState::Tagged)
                .chain(POST_TAG_STEPS)
                .filter(|s| *s > self.reached)
                .filter(|s| !self.local_only || *s == ReleaseState::Tagged)
                .map(|s| s.step())
                .collect();
            if !remaining.is_empty() {
                guidance.push(format!("Remaining: {}", remaining.join(", ")));
            }
        }
        guidance
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct ReleaseReport {
    /// Version released
    pub version: Version,
    /// Release tag
    pub tag: String,
    /// Archives, sorted by target
    pub artifacts: Vec<Artifact>,
    /// Fingerprint ledger
    pub ledger_path: PathBuf,
    /// Whether the repository formula was part of the release commit
    pub descriptor_committed: bool,
    /// Tap checkouts that received a new formula commit
    pub taps_updated: Vec<PathBuf>,
    /// Every state reached, in order
    pub history: Vec<ReleaseState>,
}

/// File contents captured before the first mutation.
struct Snapshot {
    manifest: String,
    descriptor: Option<(PathBuf, Option<String>)>,
}

/// Drives one release run.
///
/// # Examples
///
/// ```no_run
/// use opendev_release::bundler::{PyInstallerBuilder, RosettaLayer};
/// use opendev_release::release::{GhCli, GitCli, ReleaseCoordinator};
/// use opendev_release::version::BumpKind;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example(config: opendev_release::config::ReleaseConfig) -> Result<(), Box<dyn std::error::Error>> {
/// let mut coordinator = ReleaseCoordinator::new(
///     GitCli::new(&config.project_root),
///     GhCli::new(&config.project_root),
///     PyInstallerBuilder::from_config(&config),
///     RosettaLayer::default(),
///     CancellationToken::new(),
///     config,
/// )?;
/// let report = coordinator.run(BumpKind::Patch).await?;
/// println!("released {}", report.tag);
/// # Ok(())
/// # }
/// ```
pub struct ReleaseCoordinator<V, P, B, L> {
    config: ReleaseConfig,
    vcs: V,
    publisher: P,
    executor: BuildMatrixExecutor<B, L>,
    packager: ArtifactPackager,
    formula: FormulaGenerator,
    store: VersionStore,
    cancel: CancellationToken,
    descriptor_text: Option<String>,
    state: ReleaseState,
    history: Vec<ReleaseState>,
}

impl<V, P, B, L> ReleaseCoordinator<V, P, B, L>
where
    V: VersionControl,
    P: ReleasePublisher,
    B: Builder,
    L: ExecutionLayer,
{
    /// Creates a coordinator for `config`.
    ///
    /// # Arguments
    ///
    /// * `vcs` - Repository of the project
    /// * `publisher` - Remote release backend
    /// * `builder` - Per-target executable builder
    /// * `emulation` - Layer for emulated targets
    /// * `cancel` - Cancels the run before the commit
    /// * `config` - Release configuration
    pub fn new(
        vcs: V,
        publisher: P,
        builder: B,
        emulation: L,
        cancel: CancellationToken,
        config: ReleaseConfig,
    ) -> Result<Self> {
        let executor = BuildMatrixExecutor::new(
            builder,
            emulation,
            config.build_root(),
            &config.product.name,
            cancel.clone(),
        );
        let packager = ArtifactPackager::new(
            config.product.name.clone(),
            config.stage_root(),
            config.artifact_dir(),
        );
        let formula = FormulaGenerator::new(config.product.clone(), config.download_base_url.clone())?;
        let store = VersionStore::new(&config.version_manifest);
        Ok(Self {
            config,
            vcs,
            publisher,
            executor,
            packager,
            formula,
            store,
            cancel,
            descriptor_text: None,
            state: ReleaseState::Idle,
            history: vec![ReleaseState::Idle],
        })
    }

    /// Current state.
    pub fn state(&self) -> ReleaseState {
        self.state
    }

    /// Runs the release with a `kind` bump.
    pub async fn run(&mut self, kind: BumpKind) -> std::result::Result<ReleaseReport, PipelineError> {
        let current = self
            .preconditions()
            .await
            .map_err(|e| self.abort(ReleaseState::PreconditionsChecked, e, false))?;
        self.advance(ReleaseState::PreconditionsChecked);

        let next = current
            .bump(kind)
            .map_err(|e| self.abort(ReleaseState::VersionBumped, e, false))?;
        let snapshot = self
            .snapshot()
            .await
            .map_err(|e| self.abort(ReleaseState::VersionBumped, e, false))?;
        log::info!("Bumping {} → {} ({})", current, next, kind);

        match self.prepare(next).await {
            Ok((artifacts, ledger_path, descriptor_committed)) => {
                self.finish(next, artifacts, ledger_path, descriptor_committed).await
            }
            Err((phase, e)) => {
                let rolled_back = match self.roll_back(&snapshot).await {
                    Ok(()) => true,
                    Err(rollback) => {
                        log::error!("Rollback failed: {rollback}");
                        false
                    }
                };
                Err(self.abort(phase, e, rolled_back))
            }
        }
    }

    /// Everything up to and including the release commit. Errors carry the
    /// phase they happened in and leave the working tree to be restored.
    async fn prepare(
        &mut self,
        next: Version,
    ) -> std::result::Result<(Vec<Artifact>, PathBuf, bool), (ReleaseState, ReleaseError)> {
        let at = |phase: ReleaseState| move |e: ReleaseError| (phase, e);

        self.checkpoint().map_err(at(ReleaseState::VersionBumped))?;
        self.store.write(next).await.map_err(at(ReleaseState::VersionBumped))?;
        self.advance(ReleaseState::VersionBumped);

        let outputs = self
            .executor
            .build(&self.config.targets)
            .await
            .map_err(at(ReleaseState::Built))?;
        self.advance(ReleaseState::Built);

        self.checkpoint().map_err(at(ReleaseState::Packaged))?;
        let (artifacts, ledger_path) = self
            .packager
            .package_all(&outputs)
            .await
            .map_err(at(ReleaseState::Packaged))?;
        self.advance(ReleaseState::Packaged);

        self.checkpoint().map_err(at(ReleaseState::ManifestRendered))?;
        let text = self
            .formula
            .render(next, &artifacts)
            .map_err(at(ReleaseState::ManifestRendered))?;
        if let Some(path) = self.config.repository_descriptor() {
            fs::write_file(&path, &text)
                .await
                .map_err(at(ReleaseState::ManifestRendered))?;
            log::info!("Rendered formula to {}", path.display());
        }
        self.descriptor_text = Some(text);
        self.advance(ReleaseState::ManifestRendered);

        self.checkpoint().map_err(at(ReleaseState::Committed))?;
        let descriptor_committed = self
            .commit(next)
            .await
            .map_err(at(ReleaseState::Committed))?;
        self.advance(ReleaseState::Committed);

        Ok((artifacts, ledger_path, descriptor_committed))
    }

    /// Tag, push, publish and tap sync. Never rolls back.
    async fn finish(
        &mut self,
        next: Version,
        artifacts: Vec<Artifact>,
        ledger_path: PathBuf,
        descriptor_committed: bool,
    ) -> std::result::Result<ReleaseReport, PipelineError> {
        let tag = next.tag();

        self.tag(&tag, next)
            .await
            .map_err(|e| self.abort(ReleaseState::Tagged, e, false))?;
        self.advance(ReleaseState::Tagged);

        let mut taps_updated = Vec::new();
        if self.config.publish == PublishMode::LocalOnly {
            log::info!("Local-only release: {tag} created, nothing pushed");
        } else {
            let mut assets: Vec<PathBuf> = artifacts.iter().map(|a| a.archive_path.clone()).collect();
            assets.push(ledger_path.clone());

            self.push(&tag, &assets)
                .await
                .map_err(|e| self.abort(ReleaseState::Pushed, e, false))?;
            self.advance(ReleaseState::Pushed);

            self.publisher
                .publish(&tag, &assets)
                .await
                .map_err(|e| self.abort(ReleaseState::Published, e, false))?;
            self.advance(ReleaseState::Published);

            taps_updated = self
                .sync_taps(next)
                .await
                .map_err(|e| self.abort(ReleaseState::Done, e, false))?;
        }
        self.advance(ReleaseState::Done);
        self.remove_work_trees().await;

        Ok(ReleaseReport {
            version: next,
            tag,
            artifacts,
            ledger_path,
            descriptor_committed,
            taps_updated,
            history: self.history.clone(),
        })
    }

    async fn preconditions(&self) -> Result<Version> {
        self.vcs.check_available().await?;
        let entries = self.vcs.status().await?;
        if !entries.is_empty() {
            return Err(ReleaseError::DirtyWorkingTree {
                repo: self.vcs.root().to_path_buf(),
                entries,
            });
        }
        self.executor.check_prerequisites(&self.config.targets).await?;
        if self.config.publish == PublishMode::Remote {
            self.publisher.check_ready().await?;
            self.check_taps_clean().await?;
        }
        self.store.read_version().await
    }

    /// Existing tap checkouts must be clean before anything is published.
    async fn check_taps_clean(&self) -> Result<()> {
        for target in &self.config.descriptor_targets {
            let DescriptorTarget::Tap { dir, .. } = target else {
                continue;
            };
            if !dir.exists() {
                continue;
            }
            let entries = self.vcs.at(dir).status().await?;
            if !entries.is_empty() {
                return Err(ReleaseError::DirtyWorkingTree {
                    repo: dir.clone(),
                    entries,
                });
            }
        }
        Ok(())
    }

    async fn snapshot(&self) -> Result<Snapshot> {
        let manifest = self.store.snapshot().await?;
        let descriptor = match self.config.repository_descriptor() {
            Some(path) => {
                let contents = fs::read_optional(&path).await?;
                Some((path, contents))
            }
            None => None,
        };
        Ok(Snapshot {
            manifest,
            descriptor,
        })
    }

    async fn roll_back(&self, snapshot: &Snapshot) -> Result<()> {
        log::warn!("Restoring {}", self.store.path().display());
        self.store.restore(&snapshot.manifest).await?;
        if let Some((path, contents)) = &snapshot.descriptor {
            match contents {
                Some(text) => fs::write_file(path, text).await?,
                None => match tokio::fs::remove_file(path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(ReleaseError::io("removing", path, e)),
                },
            }
        }
        Ok(())
    }

    /// Stages the manifest, and the formula only if it changed, then commits.
    async fn commit(&self, next: Version) -> Result<bool> {
        let mut staged = vec![self.config.version_manifest.clone()];
        let mut descriptor_committed = false;
        if let Some(path) = self.config.repository_descriptor() {
            if self.vcs.differs_from_head(&path).await? {
                staged.push(path);
                descriptor_committed = true;
            } else {
                log::info!(
                    "Formula {} unchanged, not staging it",
                    path.display()
                );
            }
        }

        self.vcs.stage(&staged).await?;
        if let Err(e) = self.vcs.commit(&format!("chore(release): {}", next.tag())).await {
            if let Err(unstage) = self.vcs.unstage(&staged).await {
                log::error!("Failed to unstage release files: {unstage}");
            }
            return Err(e);
        }
        log::info!("Committed release {}", next.tag());
        Ok(descriptor_committed)
    }

    async fn tag(&self, tag: &str, next: Version) -> Result<()> {
        let on_remote = self.config.publish == PublishMode::Remote
            && self.vcs.remote_tag_exists(&self.config.remote, tag).await?;
        if on_remote || self.vcs.tag_exists(tag).await? {
            return Err(ReleaseError::TagExists {
                tag: tag.to_string(),
            });
        }
        self.vcs
            .create_tag(tag, &format!("{} {}", self.config.product.name, next))
            .await
    }

    async fn push(&self, tag: &str, assets: &[PathBuf]) -> Result<()> {
        let remote = &self.config.remote;
        self.vcs.push_branch(remote).await?;
        self.vcs
            .push_tag(remote, tag)
            .await
            .map_err(|e| ReleaseError::PartialPush {
                remote: remote.clone(),
                tag: tag.to_string(),
                reason: e.to_string(),
                assets: assets.to_vec(),
            })
    }

    /// Writes the formula into every tap target and commits it where it changed.
    async fn sync_taps(&self, next: Version) -> Result<Vec<PathBuf>> {
        let Some(text) = self.descriptor_text.as_deref() else {
            return Ok(Vec::new());
        };
        let mut updated = Vec::new();
        for target in &self.config.descriptor_targets {
            let DescriptorTarget::Tap { dir, url, path } = target else {
                continue;
            };
            if self.sync_tap(dir, url, path, text, next).await? {
                updated.push(dir.clone());
            }
        }
        Ok(updated)
    }

    async fn sync_tap(
        &self,
        dir: &Path,
        url: &str,
        path: &Path,
        text: &str,
        next: Version,
    ) -> Result<bool> {
        if !dir.exists() {
            log::info!("Cloning tap {} into {}", url, dir.display());
            self.vcs.clone_repo(url, dir).await?;
        }
        let tap = self.vcs.at(dir);
        let entries = tap.status().await?;
        if !entries.is_empty() {
            return Err(ReleaseError::DirtyWorkingTree {
                repo: dir.to_path_buf(),
                entries,
            });
        }

        let formula = dir.join(path);
        fs::write_file(&formula, text).await?;
        if !tap.differs_from_head(&formula).await? {
            log::info!("Tap formula {} unchanged", formula.display());
            return Ok(false);
        }

        tap.stage(&[formula]).await?;
        tap.commit(&format!("{} {}", self.config.product.name, next))
            .await?;
        tap.push_branch("origin").await?;
        log::info!("Updated tap {}", dir.display());
        Ok(true)
    }

    /// Removes build environments and staged binaries; archives stay.
    async fn remove_work_trees(&self) {
        for dir in [self.config.build_root(), self.config.stage_root()] {
            if let Err(e) = fs::remove_dir_all(&dir).await {
                log::warn!("Could not remove {}: {e}", dir.display());
            }
        }
    }

    /// Fails with `Cancelled` once the operator interrupted the run.
    fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(ReleaseError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn advance(&mut self, state: ReleaseState) {
        log::debug!("Release state: {} → {}", self.state, state);
        self.state = state;
        self.history.push(state);
    }

    fn abort(&mut self, phase: ReleaseState, source: ReleaseError, rolled_back: bool) -> PipelineError {
        let reached = self.state;
        self.state = ReleaseState::Aborted;
        self.history.push(ReleaseState::Aborted);
        PipelineError {
            phase,
            reached,
            rolled_back,
            local_only: self.config.publish == PublishMode::LocalOnly,
            source,
        }
    }
}
