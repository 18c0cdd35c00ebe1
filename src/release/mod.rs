//! Release coordination: state machine, version control and publishing.
//!
//! - [`state`] - [`ReleaseState`] progression
//! - [`vcs`] - [`VersionControl`] capability and the `git` implementation
//! - [`publisher`] - [`ReleasePublisher`] capability and the `gh` implementation
//! - [`coordinator`] - [`ReleaseCoordinator`] driving a full run

pub mod coordinator;
pub mod publisher;
pub mod state;
pub mod vcs;

pub use coordinator::{PipelineError, ReleaseCoordinator, ReleaseReport};
pub use publisher::{GhCli, ReleasePublisher};
pub use state::ReleaseState;
pub use vcs::{GitCli, VersionControl};
