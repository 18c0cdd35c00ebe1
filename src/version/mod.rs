//! Version bumping and the `version = "X.Y.Z"` line of the project manifest.

use crate::error::{ErrorExt, ReleaseError, Result};
use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

/// Any line that assigns a top-level `version` key.
static VERSION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^[ \t]*version[ \t]*=.*$"#).expect("version line regex is valid")
});

/// The only accepted form of that line; group 1 is the quoted value.
static STRICT_VERSION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^[ \t]*version[ \t]*=[ \t]*"(\d+\.\d+\.\d+)"[ \t]*\r?$"#)
        .expect("strict version regex is valid")
});

/// Which component to increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BumpKind {
    /// Incompatible change
    Major,
    /// New functionality
    Minor,
    /// Fixes only
    Patch,
}

impl FromStr for BumpKind {
    type Err = ReleaseError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim_start_matches("--") {
            "major" => Ok(Self::Major),
            "minor" => Ok(Self::Minor),
            "patch" => Ok(Self::Patch),
            _ => Err(ReleaseError::InvalidBumpKind {
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for BumpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Major => "major",
            Self::Minor => "minor",
            Self::Patch => "patch",
        })
    }
}

/// A strict `major.minor.patch` release version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    /// Major version number
    pub major: u64,
    /// Minor version number
    pub minor: u64,
    /// Patch version number
    pub patch: u64,
}

impl Version {
    /// Create a new version.
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Apply a bump: major zeroes minor and patch, minor zeroes patch.
    ///
    /// Fails when the incremented component does not fit in a `u64`.
    pub fn bump(self, kind: BumpKind) -> Result<Self> {
        let next = match kind {
            BumpKind::Major => self.major.checked_add(1).map(|major| Self::new(major, 0, 0)),
            BumpKind::Minor => self
                .minor
                .checked_add(1)
                .map(|minor| Self::new(self.major, minor, 0)),
            BumpKind::Patch => self
                .patch
                .checked_add(1)
                .map(|patch| Self::new(self.major, self.minor, patch)),
        };
        next.ok_or_else(|| ReleaseError::Config {
            reason: format!("cannot apply a {kind} bump to {self}: the {kind} component is at its maximum"),
        })
    }

    /// Release tag for this version (`vX.Y.Z`).
    pub fn tag(&self) -> String {
        format!("v{self}")
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        let parsed = semver::Version::parse(s).map_err(|e| format!("'{s}': {e}"))?;
        if !parsed.pre.is_empty() || !parsed.build.is_empty() {
            return Err(format!(
                "'{s}': pre-release and build metadata are not supported"
            ));
        }
        Ok(Self::new(parsed.major, parsed.minor, parsed.patch))
    }
}

/// Reads and rewrites the version line of a manifest file.
#[derive(Debug, Clone)]
pub struct VersionStore {
    path: PathBuf,
}

impl VersionStore {
    /// Store backed by the manifest at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Manifest path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw manifest text, for rollback.
    pub async fn snapshot(&self) -> Result<String> {
        tokio::fs::read_to_string(&self.path)
            .await
            .fs_context("reading version manifest", &self.path)
    }

    /// Put back text captured by [`VersionStore::snapshot`].
    pub async fn restore(&self, contents: &str) -> Result<()> {
        tokio::fs::write(&self.path, contents)
            .await
            .fs_context("restoring version manifest", &self.path)
    }

    /// Reads the current version.
    pub async fn read_version(&self) -> Result<Version> {
        let contents = self.snapshot().await?;
        let (_, version) = self.locate(&contents)?;
        Ok(version)
    }

    /// Replaces the version line with `version`, leaving every other byte
    /// untouched. Fails rather than appending when no line is found.
    pub async fn write(&self, version: Version) -> Result<()> {
        let contents = self.snapshot().await?;
        let updated = self.replace(&contents, version)?;
        tokio::fs::write(&self.path, updated)
            .await
            .fs_context("writing version manifest", &self.path)?;
        log::info!("Wrote version {} to {}", version, self.path.display());
        Ok(())
    }

    /// Returns `contents` with the quoted version value replaced.
    pub fn replace(&self, contents: &str, version: Version) -> Result<String> {
        let (range, _) = self.locate(contents)?;
        let mut updated = String::with_capacity(contents.len() + 4);
        updated.push_str(&contents[..range.start]);
        updated.push_str(&version.to_string());
        updated.push_str(&contents[range.end..]);
        Ok(updated)
    }

    /// Finds the single version line and the byte range of its quoted value.
    fn locate(&self, contents: &str) -> Result<(std::ops::Range<usize>, Version)> {
        let lines: Vec<_> = VERSION_LINE.find_iter(contents).collect();
        let line = match lines.as_slice() {
            [line] => *line,
            [] => return Err(self.malformed("no `version = \"X.Y.Z\"` line found")),
            many => {
                return Err(self.malformed(format!(
                    "expected exactly one version line, found {}",
                    many.len()
                )));
            }
        };

        let value = STRICT_VERSION_LINE
            .captures(line.as_str())
            .and_then(|caps| caps.get(1))
            .ok_or_else(|| {
                self.malformed(format!(
                    "version line does not match `version = \"X.Y.Z\"`: {}",
                    line.as_str().trim()
                ))
            })?;

        let version = value.as_str().parse::<Version>().map_err(|e| self.malformed(e))?;
        let start = line.start() + value.start();
        Ok((start..start + value.len(), version))
    }

    fn malformed(&self, reason: impl Into<String>) -> ReleaseError {
        ReleaseError::ManifestMalformed {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }
}
