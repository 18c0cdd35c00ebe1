//! Execution layers that commands of a target build run through.
//!
//! A layer decides how a build command reaches the CPU: directly on the
//! host ([`NativeLayer`]) or translated for a foreign architecture
//! ([`RosettaLayer`]). Layers are probed once up front so a missing
//! translator is reported before any target directory exists.

mod rosetta;

pub use rosetta::RosettaLayer;

use crate::bundler::BuildTarget;
use crate::error::Result;
use crate::process::ToolCommand;
use std::future::Future;

/// How commands for a target are executed.
pub trait ExecutionLayer: Send + Sync {
    /// Human-readable layer name used in errors (e.g. "Rosetta 2").
    fn name(&self) -> &str;

    /// Verifies the layer can run code for `target`.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Commands for `target` can run through this layer
    /// * `Err(ReleaseError::EmulationUnavailable)` - With remediation text
    fn probe(&self, target: &BuildTarget) -> impl Future<Output = Result<()>> + Send;

    /// Rewrites `command` so it runs through this layer.
    fn wrap(&self, command: ToolCommand) -> ToolCommand;
}

/// Runs commands directly on the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeLayer;

impl ExecutionLayer for NativeLayer {
    fn name(&self) -> &str {
        "native"
    }

    async fn probe(&self, _target: &BuildTarget) -> Result<()> {
        Ok(())
    }

    fn wrap(&self, command: ToolCommand) -> ToolCommand {
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::{Arch, EnvironmentStrategy, Os};

    #[tokio::test]
    async fn native_layer_is_transparent() {
        let target = BuildTarget::new(Os::Linux, Arch::X86_64, EnvironmentStrategy::Native);
        NativeLayer.probe(&target).await.unwrap();
        let cmd = NativeLayer.wrap(ToolCommand::new("uv").args(["venv", "env"]));
        assert_eq!(cmd.display_line(), "uv venv env");
    }
}
