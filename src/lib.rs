//! Release orchestrator for the opendev command line tool.
//!
//! One run bumps the version in `pyproject.toml`, builds a single-file
//! executable per target of the host (both macOS architectures on a Mac,
//! one through Rosetta 2), packages and fingerprints the archives, renders
//! the Homebrew formula, then commits, tags, pushes and publishes.
//!
//! It can be used both as a CLI tool and as a library dependency; every
//! external system sits behind a trait so the pipeline runs against fakes.

pub mod bundler;
pub mod cli;
pub mod config;
pub mod error;
pub mod formula;
pub mod process;
pub mod release;
pub mod version;

// Re-export commonly used types
pub use error::{CliError, ReleaseError, Result};
