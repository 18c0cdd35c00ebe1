//! Command line argument parsing and validation.
//!
//! Exactly one bump flag is required; every environment override has a
//! matching long option so it can also be passed explicitly.

use crate::config::Overrides;
use crate::error::{CliError, ErrorExt, Result};
use crate::version::BumpKind;
use clap::builder::FalseyValueParser;
use clap::{ArgAction, ArgGroup, Parser};
use std::path::PathBuf;

/// Release orchestrator for the opendev command line tool
#[derive(Parser, Debug)]
#[command(
    name = "opendev_release",
    version,
    about = "Bump, build, package and publish an opendev release",
    long_about = "Bumps the project version, builds a single-file executable for every target of this host, \
packages and fingerprints the archives, renders the Homebrew formula, then commits, tags, pushes \
and publishes the release.

Usage:
  opendev_release --patch
  opendev_release --minor --local-only
  OPENDEV_X86_PYTHON=/usr/local/bin/python3.12 opendev_release --major

Exit code 0 = release completed; 1 = a release step failed; 2 = usage error."
)]
#[command(group(
    ArgGroup::new("bump")
        .required(true)
        .args(["major", "minor", "patch"])
))]
pub struct Args {
    /// Increment the major version (X.0.0)
    #[arg(long)]
    pub major: bool,

    /// Increment the minor version (x.Y.0)
    #[arg(long)]
    pub minor: bool,

    /// Increment the patch version (x.y.Z)
    #[arg(long)]
    pub patch: bool,

    /// Stop after creating the local tag; push and publish nothing
    #[arg(
        long,
        env = "OPENDEV_RELEASE_LOCAL_ONLY",
        action = ArgAction::SetTrue,
        value_parser = FalseyValueParser::new()
    )]
    pub local_only: bool,

    /// Project root containing pyproject.toml
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub project_root: PathBuf,

    /// Show debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Python version every build environment is pinned to
    #[arg(long, env = "OPENDEV_PYTHON_VERSION", value_name = "VERSION")]
    pub python_version: Option<String>,

    /// x86_64 interpreter used for the emulated build
    #[arg(long, env = "OPENDEV_X86_PYTHON", value_name = "PATH")]
    pub x86_python: Option<PathBuf>,

    /// Homebrew tap checkout
    #[arg(long, env = "OPENDEV_TAP_DIR", value_name = "DIR")]
    pub tap_dir: Option<PathBuf>,

    /// Clone URL of the Homebrew tap
    #[arg(long, env = "OPENDEV_TAP_URL", value_name = "URL")]
    pub tap_url: Option<String>,

    /// Directory for build environments, staging and archives
    #[arg(long, env = "OPENDEV_RELEASE_OUT_DIR", value_name = "DIR")]
    pub out_dir: Option<PathBuf>,
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Bump selected by the mutually exclusive flags.
    pub fn bump_kind(&self) -> BumpKind {
        if self.major {
            BumpKind::Major
        } else if self.minor {
            BumpKind::Minor
        } else {
            BumpKind::Patch
        }
    }

    /// Absolute project root.
    pub fn resolved_project_root(&self) -> Result<PathBuf> {
        let root = std::fs::canonicalize(&self.project_root)
            .fs_context("resolving project root", &self.project_root)?;
        if !root.is_dir() {
            return Err(CliError::InvalidArguments {
                reason: format!("--project-root {} is not a directory", root.display()),
            }
            .into());
        }
        Ok(root)
    }

    /// Configuration overrides from flags and environment.
    pub fn overrides(&self) -> Overrides {
        Overrides {
            python_version: self.python_version.clone(),
            foreign_python: self.x86_python.clone(),
            tap_dir: self.tap_dir.clone(),
            tap_url: self.tap_url.clone(),
            out_dir: self.out_dir.clone(),
            local_only: self.local_only,
        }
    }
}

/// Configuration derived from command line arguments
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    output: super::OutputManager,
}

impl From<&Args> for RuntimeConfig {
    fn from(args: &Args) -> Self {
        Self {
            output: super::OutputManager::new(args.verbose, false),
        }
    }
}

impl RuntimeConfig {
    /// Get a reference to the output manager
    pub fn output(&self) -> &super::OutputManager {
        &self.output
    }
}
