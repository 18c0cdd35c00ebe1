//! Archive staging, compression and fingerprinting.
//!
//! Each verified executable is staged under a fixed name, wrapped in a
//! reproducible `<product>-<os>-<arch>.tar.gz`, decoded again to prove it is
//! intact, and fingerprinted with SHA-256. The fingerprints of a run are
//! collected in a [`FingerprintLedger`].

mod archive;
mod checksum;
mod ledger;

pub use archive::{ArchiveSummary, inspect as inspect_archive};
pub use checksum::calculate_sha256;
pub use ledger::{FingerprintLedger, LEDGER_FILE_NAME};

use crate::bundler::utils::fs;
use crate::bundler::{BinaryOutput, BuildTarget};
use crate::error::{ReleaseError, Result};
use std::path::PathBuf;

/// A packaged, fingerprinted release archive.
///
/// The fingerprint is computed once over the finalized archive and never
/// changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Target the archive was built for
    pub target: BuildTarget,
    /// Executable that was archived
    pub binary_path: PathBuf,
    /// Archive location
    pub archive_path: PathBuf,
    /// Archive file name (e.g. `opendev-macos-arm64.tar.gz`)
    pub archive_name: String,
    /// Lowercase hex SHA-256 of the archive
    pub fingerprint: String,
}

/// Turns [`BinaryOutput`]s into [`Artifact`]s.
#[derive(Debug, Clone)]
pub struct ArtifactPackager {
    product: String,
    stage_root: PathBuf,
    artifact_dir: PathBuf,
}

impl ArtifactPackager {
    /// Packager staging under `stage_root` and writing archives to `artifact_dir`.
    pub fn new(
        product: impl Into<String>,
        stage_root: impl Into<PathBuf>,
        artifact_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            product: product.into(),
            stage_root: stage_root.into(),
            artifact_dir: artifact_dir.into(),
        }
    }

    /// Archive file name for `target`.
    pub fn archive_name(&self, target: &BuildTarget) -> String {
        format!("{}-{}-{}.tar.gz", self.product, target.os, target.arch)
    }

    /// Path of the ledger for this run.
    pub fn ledger_path(&self) -> PathBuf {
        self.artifact_dir.join(LEDGER_FILE_NAME)
    }

    /// Stages, archives, verifies and fingerprints one executable.
    pub async fn package(&self, output: &BinaryOutput) -> Result<Artifact> {
        let target = output.target;
        let entry_name = target.os.executable_name(&self.product);

        let stage_dir = self.stage_root.join(target.id());
        fs::create_dir_all(&stage_dir, true).await?;
        let staged = stage_dir.join(&entry_name);
        fs::copy_file(&output.binary_path, &staged).await?;
        fs::make_executable(&staged).await?;

        fs::create_dir_all(&self.artifact_dir, false).await?;
        let archive_name = self.archive_name(&target);
        let archive_path = self.artifact_dir.join(&archive_name);

        let (src, dst, id) = (staged.clone(), archive_path.clone(), target.id());
        let summary = tokio::task::spawn_blocking(move || {
            archive::write_tarball(&src, &entry_name, &dst).map_err(|e| {
                ReleaseError::StagingFailed {
                    target: id.clone(),
                    reason: format!("writing {}: {e}", dst.display()),
                }
            })?;
            archive::verify(&dst, &id)
        })
        .await
        .map_err(|e| ReleaseError::StagingFailed {
            target: target.id(),
            reason: format!("archive task failed: {e}"),
        })??;

        let fingerprint = calculate_sha256(&archive_path).await?;
        log::info!(
            "✓ {}: {} ({} bytes archived, sha256 {})",
            target,
            archive_name,
            summary.total_size,
            fingerprint
        );

        Ok(Artifact {
            target,
            binary_path: output.binary_path.clone(),
            archive_path,
            archive_name,
            fingerprint,
        })
    }

    /// Packages every output and writes the ledger.
    ///
    /// # Returns
    ///
    /// Artifacts sorted by target, and the ledger path.
    pub async fn package_all(&self, outputs: &[BinaryOutput]) -> Result<(Vec<Artifact>, PathBuf)> {
        let mut artifacts = Vec::with_capacity(outputs.len());
        for output in outputs {
            artifacts.push(self.package(output).await?);
        }
        artifacts.sort_by_key(|a| a.target);

        let ledger_path = self.ledger_path();
        FingerprintLedger::from_artifacts(&artifacts)
            .write(&ledger_path)
            .await?;
        Ok((artifacts, ledger_path))
    }
}
