//! Reproducible `.tar.gz` archives holding a single executable.

use crate::error::{ReleaseError, Result};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Header mtime; fixed so identical binaries yield identical archives.
const FIXED_MTIME: u64 = 0;

/// Mode of the archived executable.
const EXECUTABLE_MODE: u32 = 0o755;

/// Writes `archive` with one entry named `entry_name` holding `binary`.
///
/// Blocking; call from `spawn_blocking`.
pub fn write_tarball(binary: &Path, entry_name: &str, archive: &Path) -> std::io::Result<()> {
    let source = File::open(binary)?;
    let size = source.metadata()?.len();

    let encoder = GzEncoder::new(BufWriter::new(File::create(archive)?), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let mut header = tar::Header::new_gnu();
    header.set_path(entry_name)?;
    header.set_size(size);
    header.set_mode(EXECUTABLE_MODE);
    header.set_mtime(FIXED_MTIME);
    header.set_uid(0);
    header.set_gid(0);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_cksum();

    builder.append(&header, BufReader::new(source))?;
    let encoder = builder.into_inner()?;
    let mut writer = encoder.finish()?;
    std::io::Write::flush(&mut writer)?;
    Ok(())
}

/// Summary of a decoded archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Entry paths in order
    pub entries: Vec<String>,
    /// Sum of entry sizes
    pub total_size: u64,
}

/// Decodes `archive` end to end.
///
/// Blocking; call from `spawn_blocking`.
pub fn inspect(archive: &Path) -> std::io::Result<ArchiveSummary> {
    let mut reader = tar::Archive::new(GzDecoder::new(BufReader::new(File::open(archive)?)));
    let mut entries = Vec::new();
    let mut total_size = 0;
    for entry in reader.entries()? {
        let mut entry = entry?;
        entries.push(entry.path()?.to_string_lossy().into_owned());
        // Reading the body validates the gzip stream and its CRC
        total_size += std::io::copy(&mut entry, &mut std::io::sink())?;
    }
    Ok(ArchiveSummary {
        entries,
        total_size,
    })
}

/// Requires `archive` to decode and hold at least one non-empty entry.
pub fn verify(archive: &Path, target: &str) -> Result<ArchiveSummary> {
    let failed = |reason: String| ReleaseError::StagingFailed {
        target: target.to_string(),
        reason,
    };

    let summary = inspect(archive)
        .map_err(|e| failed(format!("archive {} is unreadable: {e}", archive.display())))?;
    if summary.entries.is_empty() {
        return Err(failed(format!("archive {} has no entries", archive.display())));
    }
    if summary.total_size == 0 {
        return Err(failed(format!("archive {} holds only empty files", archive.display())));
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_binaries_give_identical_archives() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::write(&a, b"#!/bin/sh\necho opendev\n").unwrap();
        std::fs::write(&b, b"#!/bin/sh\necho opendev\n").unwrap();

        write_tarball(&a, "opendev", &dir.path().join("a.tar.gz")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(1100));
        write_tarball(&b, "opendev", &dir.path().join("b.tar.gz")).unwrap();

        assert_eq!(
            std::fs::read(dir.path().join("a.tar.gz")).unwrap(),
            std::fs::read(dir.path().join("b.tar.gz")).unwrap()
        );
    }

    #[test]
    fn single_entry_with_fixed_name() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("dist-binary");
        std::fs::write(&bin, b"payload").unwrap();
        let archive = dir.path().join("opendev-macos-arm64.tar.gz");

        write_tarball(&bin, "opendev", &archive).unwrap();
        let summary = verify(&archive, "macos-arm64").unwrap();

        assert_eq!(summary.entries, vec!["opendev".to_string()]);
        assert_eq!(summary.total_size, 7);
    }

    #[test]
    fn garbage_is_staging_failure() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.tar.gz");
        std::fs::write(&archive, b"not gzip at all").unwrap();

        let err = verify(&archive, "linux-x86_64").unwrap_err();
        assert!(matches!(err, ReleaseError::StagingFailed { target, .. } if target == "linux-x86_64"));
    }

    #[test]
    fn empty_entry_is_staging_failure() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("empty");
        std::fs::write(&bin, b"").unwrap();
        let archive = dir.path().join("empty.tar.gz");

        write_tarball(&bin, "opendev", &archive).unwrap();
        assert!(verify(&archive, "linux-x86_64").is_err());
    }
}
