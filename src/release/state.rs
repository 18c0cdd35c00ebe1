//! Release pipeline states.

use std::fmt;

/// Progress of one release run.
///
/// States advance strictly in declaration order; `Aborted` is terminal and
/// replaces whatever state the failing step would have reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReleaseState {
    /// Nothing has happened yet
    Idle,
    /// Working tree clean, tools present, remote client authenticated
    PreconditionsChecked,
    /// New version written to the manifest
    VersionBumped,
    /// One verified executable per target
    Built,
    /// Archives, fingerprints and ledger written
    Packaged,
    /// Formula rendered and written to the repository
    ManifestRendered,
    /// Release commit created
    Committed,
    /// Annotated release tag created
    Tagged,
    /// Commit and tag pushed
    Pushed,
    /// Remote release created with all assets
    Published,
    /// Every step finished
    Done,
    /// The run failed
    Aborted,
}

impl ReleaseState {
    /// Name of the step that produces this state.
    pub const fn step(&self) -> &'static str {
        match self {
            Self::Idle => "start",
            Self::PreconditionsChecked => "preconditions",
            Self::VersionBumped => "version bump",
            Self::Built => "build",
            Self::Packaged => "packaging",
            Self::ManifestRendered => "formula rendering",
            Self::Committed => "commit",
            Self::Tagged => "tag",
            Self::Pushed => "push",
            Self::Published => "publish",
            Self::Done => "tap sync",
            Self::Aborted => "abort",
        }
    }

    /// Whether local changes of a run in this state are still undone on failure.
    pub fn can_roll_back(&self) -> bool {
        *self < Self::Committed
    }
}

impl fmt::Display for ReleaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::PreconditionsChecked => "preconditions checked",
            Self::VersionBumped => "version bumped",
            Self::Built => "built",
            Self::Packaged => "packaged",
            Self::ManifestRendered => "formula rendered",
            Self::Committed => "committed",
            Self::Tagged => "tagged",
            Self::Pushed => "pushed",
            Self::Published => "published",
            Self::Done => "done",
            Self::Aborted => "aborted",
        })
    }
}
