//! Rosetta 2 translation for x86_64 builds on Apple Silicon.

use super::ExecutionLayer;
use crate::bundler::{Arch, BuildTarget, Os};
use crate::error::{ReleaseError, Result};
use crate::process::{PROBE_TIMEOUT, ToolCommand};
use std::path::PathBuf;

/// Install command shown when the probe fails.
const INSTALL_HINT: &str = "Install Rosetta 2: softwareupdate --install-rosetta --agree-to-license";

/// Runs commands under `arch -x86_64`.
#[derive(Debug, Clone)]
pub struct RosettaLayer {
    launcher: PathBuf,
    probe_program: PathBuf,
}

impl Default for RosettaLayer {
    fn default() -> Self {
        Self {
            launcher: PathBuf::from("arch"),
            probe_program: PathBuf::from("/usr/bin/true"),
        }
    }
}

impl RosettaLayer {
    /// Layer using a custom launcher and probe program.
    pub fn with_launcher(launcher: impl Into<PathBuf>, probe_program: impl Into<PathBuf>) -> Self {
        Self {
            launcher: launcher.into(),
            probe_program: probe_program.into(),
        }
    }

    fn unavailable(&self, target: &BuildTarget, remediation: impl Into<String>) -> ReleaseError {
        ReleaseError::EmulationUnavailable {
            target: target.id(),
            layer: self.name().to_string(),
            remediation: remediation.into(),
        }
    }
}

impl ExecutionLayer for RosettaLayer {
    fn name(&self) -> &str {
        "Rosetta 2"
    }

    async fn probe(&self, target: &BuildTarget) -> Result<()> {
        if target.os != Os::MacOs || target.arch != Arch::X86_64 {
            return Err(self.unavailable(
                target,
                format!("Rosetta only translates x86_64 code on macOS; build {target} on a matching host"),
            ));
        }

        let probe = self.wrap(
            ToolCommand::new(&self.probe_program)
                .timeout(PROBE_TIMEOUT)
                .context(format!("probing {} for {}", self.name(), target)),
        );

        match probe.run().await {
            Ok(output) if output.success() => {
                log::debug!("{} available for {}", self.name(), target);
                Ok(())
            }
            Ok(output) => {
                log::debug!(
                    "{} probe exited with {:?}: {}",
                    self.name(),
                    output.code,
                    output.stderr.trim()
                );
                Err(self.unavailable(target, INSTALL_HINT))
            }
            Err(e) => {
                log::debug!("{} probe failed: {}", self.name(), e);
                Err(self.unavailable(target, INSTALL_HINT))
            }
        }
    }

    fn wrap(&self, command: ToolCommand) -> ToolCommand {
        command.wrapped_by(self.launcher.as_os_str(), &["-x86_64"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::EnvironmentStrategy;

    fn intel_target() -> BuildTarget {
        BuildTarget::new(
            Os::MacOs,
            Arch::X86_64,
            EnvironmentStrategy::EmulatedForeignArchitecture,
        )
    }

    #[test]
    fn wraps_with_arch_launcher() {
        let cmd = RosettaLayer::default().wrap(
            ToolCommand::new("/usr/local/bin/python3").args(["-m", "venv", "/b/env"]),
        );
        assert_eq!(
            cmd.display_line(),
            "arch -x86_64 /usr/local/bin/python3 -m venv /b/env"
        );
    }

    #[tokio::test]
    async fn arm_target_cannot_be_translated() {
        let target = BuildTarget::new(
            Os::MacOs,
            Arch::AArch64,
            EnvironmentStrategy::EmulatedForeignArchitecture,
        );
        let err = RosettaLayer::default().probe(&target).await.unwrap_err();
        assert!(matches!(err, ReleaseError::EmulationUnavailable { target, .. } if target == "macos-arm64"));
    }

    #[tokio::test]
    async fn missing_launcher_reports_install_hint() {
        let layer = RosettaLayer::with_launcher("no-such-arch-launcher-4242", "/usr/bin/true");
        match layer.probe(&intel_target()).await.unwrap_err() {
            ReleaseError::EmulationUnavailable { layer, remediation, .. } => {
                assert_eq!(layer, "Rosetta 2");
                assert!(remediation.contains("softwareupdate --install-rosetta"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_probe_is_unavailable() {
        // `false -x86_64 /usr/bin/true` exits non-zero like a missing translator
        let layer = RosettaLayer::with_launcher("false", "/usr/bin/true");
        let err = layer.probe(&intel_target()).await.unwrap_err();
        assert!(matches!(err, ReleaseError::EmulationUnavailable { .. }));
    }
}
