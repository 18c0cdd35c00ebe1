//! Per-target executable builds.
//!
//! This module provides the [`BuildMatrixExecutor`] that turns a list of
//! [`BuildTarget`]s into one verified executable each, and the [`Builder`]
//! capability it drives.
//!
//! # Overview
//!
//! The executor:
//! 1. Probes every emulated target's execution layer
//! 2. Checks the builder's prerequisites for every target
//! 3. Creates a fresh directory tree per target
//! 4. Delegates the build to the [`Builder`]
//! 5. Verifies the expected executable exists and is non-empty
//!
//! # Module Organization
//!
//! - [`orchestrator`] - [`BuildMatrixExecutor`] and cancellation handling
//! - [`pyinstaller`] - [`PyInstallerBuilder`], the real single-file builder

mod orchestrator;
mod pyinstaller;

pub use orchestrator::BuildMatrixExecutor;
pub use pyinstaller::{AMBIENT_OVERRIDES, PyInstallerBuilder};

use crate::bundler::{BuildTarget, ExecutionLayer, Os};
use crate::error::Result;
use std::future::Future;
use std::path::{Path, PathBuf};

/// Verified executable produced for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryOutput {
    /// Target the executable was built for
    pub target: BuildTarget,
    /// Path to the executable inside the target's `dist` directory
    pub binary_path: PathBuf,
}

/// Disposable directory tree of one target build.
///
/// Layout: `<build-root>/<os>-<arch>/{env,work,spec,dist}`. Trees of
/// different targets never overlap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPaths {
    /// Target root, erased before each build
    pub root: PathBuf,
    /// Virtual environment
    pub env: PathBuf,
    /// Packaging tool scratch space
    pub work: PathBuf,
    /// PyInstaller `.spec` output
    pub spec: PathBuf,
    /// Output directory
    pub dist: PathBuf,
    /// Executable the build must produce
    pub binary: PathBuf,
    os: Os,
}

impl TargetPaths {
    /// Paths for `target` under `build_root` producing `product`.
    pub fn new(build_root: &Path, target: &BuildTarget, product: &str) -> Self {
        let root = build_root.join(target.id());
        let dist = root.join("dist");
        Self {
            env: root.join("env"),
            work: root.join("work"),
            spec: root.join("spec"),
            binary: dist.join(target.os.executable_name(product)),
            dist,
            root,
            os: target.os,
        }
    }

    /// Interpreter inside the virtual environment.
    pub fn python(&self) -> PathBuf {
        match self.os {
            Os::Windows => self.env.join("Scripts").join("python.exe"),
            _ => self.env.join("bin").join("python"),
        }
    }

    /// Directories created before the build starts.
    pub fn directories(&self) -> [&Path; 5] {
        [&self.root, &self.env, &self.work, &self.spec, &self.dist]
    }
}

/// Produces a single-file executable for one target.
///
/// Implementations write the executable to [`TargetPaths::binary`]; the
/// executor verifies it afterwards.
pub trait Builder: Send + Sync {
    /// Checks prerequisites for `target` without touching the filesystem.
    fn check_available(&self, target: &BuildTarget) -> impl Future<Output = Result<()>> + Send;

    /// Builds `target` into `paths`, running every command through `layer`.
    fn build<L: ExecutionLayer>(
        &self,
        target: &BuildTarget,
        paths: &TargetPaths,
        layer: &L,
    ) -> impl Future<Output = Result<()>> + Send;
}
