//! Build matrix execution.
//!
//! This module provides the [`BuildMatrixExecutor`] that runs one build per
//! target, sequentially, with cooperative cancellation.

use super::{BinaryOutput, Builder, TargetPaths};
use crate::bundler::utils::fs;
use crate::bundler::{BuildTarget, ExecutionLayer, NativeLayer};
use crate::error::{ReleaseError, Result};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Runs a [`Builder`] across a build matrix.
///
/// Emulated targets run through the injected foreign-architecture layer;
/// every other target runs through [`NativeLayer`]. Targets that share the
/// same build root never share directories.
///
/// # Examples
///
/// ```no_run
/// use opendev_release::bundler::{BuildMatrixExecutor, BuildTarget, PyInstallerBuilder, RosettaLayer};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example(config: opendev_release::config::ReleaseConfig) -> opendev_release::Result<()> {
/// let executor = BuildMatrixExecutor::new(
///     PyInstallerBuilder::from_config(&config),
///     RosettaLayer::default(),
///     config.build_root(),
///     &config.product.name,
///     CancellationToken::new(),
/// );
/// let outputs = executor.build(&config.targets).await?;
/// for output in outputs {
///     println!("{}: {}", output.target, output.binary_path.display());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct BuildMatrixExecutor<B, L> {
    builder: B,
    emulation: L,
    build_root: PathBuf,
    product: String,
    cancel: CancellationToken,
}

impl<B: Builder, L: ExecutionLayer> BuildMatrixExecutor<B, L> {
    /// Creates an executor.
    ///
    /// # Arguments
    ///
    /// * `builder` - Produces the executable for one target
    /// * `emulation` - Layer used for emulated targets
    /// * `build_root` - Parent of all per-target directory trees
    /// * `product` - Executable name
    /// * `cancel` - Cancels the running and all remaining builds
    pub fn new(
        builder: B,
        emulation: L,
        build_root: impl Into<PathBuf>,
        product: &str,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            builder,
            emulation,
            build_root: build_root.into(),
            product: product.to_string(),
            cancel,
        }
    }

    /// Paths a target builds into.
    pub fn paths_for(&self, target: &BuildTarget) -> TargetPaths {
        TargetPaths::new(&self.build_root, target, &self.product)
    }

    /// Builds every target, in target order.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<BinaryOutput>)` - One verified executable per target
    /// * `Err(EmulationUnavailable)` - Before any target directory is created
    /// * `Err(BuildFailed | BuildTimedOut)` - The failing target's directory is kept
    /// * `Err(Cancelled)` - The interrupted target's directory is removed
    pub async fn build(&self, targets: &[BuildTarget]) -> Result<Vec<BinaryOutput>> {
        let mut targets = targets.to_vec();
        targets.sort();

        self.check_prerequisites(&targets).await?;

        let mut outputs = Vec::with_capacity(targets.len());
        for target in &targets {
            if self.cancel.is_cancelled() {
                return Err(ReleaseError::Cancelled);
            }
            outputs.push(self.build_target(target).await?);
        }
        Ok(outputs)
    }

    /// Probes layers and builder prerequisites without touching the filesystem.
    pub async fn check_prerequisites(&self, targets: &[BuildTarget]) -> Result<()> {
        for target in targets.iter().filter(|t| t.is_emulated()) {
            log::debug!("Probing {} for {}", self.emulation.name(), target);
            self.emulation.probe(target).await?;
        }
        for target in targets {
            self.builder.check_available(target).await?;
        }
        Ok(())
    }

    async fn build_target(&self, target: &BuildTarget) -> Result<BinaryOutput> {
        let paths = self.paths_for(target);
        fs::create_dir_all(&paths.root, true).await?;
        for dir in paths.directories() {
            fs::create_dir_all(dir, false).await?;
        }

        log::info!(
            "Building {} for {} ({})",
            self.product,
            target,
            target.strategy
        );

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ReleaseError::Cancelled),
            result = self.run_builder(target, &paths) => result,
        };

        match result {
            Ok(()) => self.verify(target, &paths).await,
            Err(ReleaseError::Cancelled) => {
                log::warn!("Build of {target} cancelled, removing {}", paths.root.display());
                fs::remove_dir_all(&paths.root).await?;
                Err(ReleaseError::Cancelled)
            }
            Err(e) => {
                log::error!(
                    "Build of {target} failed, partial output kept at {}",
                    paths.root.display()
                );
                Err(match e {
                    ReleaseError::ToolFailed { .. } => ReleaseError::BuildFailed {
                        target: target.id(),
                        reason: e.to_string(),
                    },
                    other => other,
                })
            }
        }
    }

    async fn run_builder(&self, target: &BuildTarget, paths: &TargetPaths) -> Result<()> {
        if target.is_emulated() {
            self.builder.build(target, paths, &self.emulation).await
        } else {
            self.builder.build(target, paths, &NativeLayer).await
        }
    }

    /// The expected executable must exist and be non-empty.
    async fn verify(&self, target: &BuildTarget, paths: &TargetPaths) -> Result<BinaryOutput> {
        let metadata = match tokio::fs::metadata(&paths.binary).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ReleaseError::BuildFailed {
                    target: target.id(),
                    reason: format!("expected executable {} was not produced", paths.binary.display()),
                });
            }
            Err(e) => return Err(ReleaseError::io("reading metadata of", &paths.binary, e)),
        };

        if !metadata.is_file() || metadata.len() == 0 {
            return Err(ReleaseError::BuildFailed {
                target: target.id(),
                reason: format!("executable {} is empty", paths.binary.display()),
            });
        }

        log::info!(
            "✓ {target}: {} ({} bytes)",
            paths.binary.display(),
            metadata.len()
        );
        Ok(BinaryOutput {
            target: *target,
            binary_path: paths.binary.clone(),
        })
    }
}
