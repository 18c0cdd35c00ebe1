//! The `checksums.txt` fingerprint ledger.

use super::Artifact;
use crate::bundler::utils::fs;
use crate::error::Result;
use std::path::Path;

/// File name of the ledger inside the artifact directory.
pub const LEDGER_FILE_NAME: &str = "checksums.txt";

/// One `<sha256>  <archive>` line per artifact, ordered by target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FingerprintLedger {
    lines: Vec<(String, String)>,
}

impl FingerprintLedger {
    /// Ledger for `artifacts`, sorted by target.
    pub fn from_artifacts(artifacts: &[Artifact]) -> Self {
        let mut sorted: Vec<&Artifact> = artifacts.iter().collect();
        sorted.sort_by_key(|a| a.target);
        Self {
            lines: sorted
                .into_iter()
                .map(|a| (a.fingerprint.clone(), a.archive_name.clone()))
                .collect(),
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether the ledger has no entries.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Ledger text in `sha256sum` format.
    pub fn render(&self) -> String {
        self.lines
            .iter()
            .map(|(sha256, name)| format!("{sha256}  {name}\n"))
            .collect()
    }

    /// Writes the ledger to `path`.
    pub async fn write(&self, path: &Path) -> Result<()> {
        fs::write_file(path, &self.render()).await?;
        log::info!("Wrote {} fingerprints to {}", self.len(), path.display());
        Ok(())
    }
}
