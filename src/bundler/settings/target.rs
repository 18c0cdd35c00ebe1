//! Build targets and how their environments are prepared.

use super::{Arch, Os};
use crate::error::Result;
use std::fmt;

/// How a target's build environment is constructed.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum EnvironmentStrategy {
    /// Fresh environment on a host without a multi-arch matrix
    Native,
    /// Fresh virtual environment for the host's own architecture
    IsolatedVirtualEnvironment,
    /// Fresh environment run through a foreign-architecture execution layer
    EmulatedForeignArchitecture,
}

impl fmt::Display for EnvironmentStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Native => "native",
            Self::IsolatedVirtualEnvironment => "isolated virtual environment",
            Self::EmulatedForeignArchitecture => "emulated foreign architecture",
        })
    }
}

/// One (OS, architecture) build of the executable.
///
/// Targets order by OS, then architecture.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BuildTarget {
    /// Operating system
    pub os: Os,
    /// CPU architecture
    pub arch: Arch,
    /// Environment construction strategy
    pub strategy: EnvironmentStrategy,
}

impl BuildTarget {
    /// Creates a target.
    pub const fn new(os: Os, arch: Arch, strategy: EnvironmentStrategy) -> Self {
        Self { os, arch, strategy }
    }

    /// Short identifier, e.g. `macos-arm64`.
    pub fn id(&self) -> String {
        format!("{}-{}", self.os, self.arch)
    }

    /// Build matrix for a host.
    ///
    /// macOS always yields both architectures: the host's own one in an
    /// isolated virtual environment and the other through emulation. Every
    /// other host yields a single native target.
    pub fn plan(host_os: Os, host_arch: Arch) -> Vec<Self> {
        match host_os {
            Os::MacOs => [Arch::AArch64, Arch::X86_64]
                .into_iter()
                .map(|arch| {
                    let strategy = if arch == host_arch {
                        EnvironmentStrategy::IsolatedVirtualEnvironment
                    } else {
                        EnvironmentStrategy::EmulatedForeignArchitecture
                    };
                    Self::new(Os::MacOs, arch, strategy)
                })
                .collect(),
            os => vec![Self::new(os, host_arch, EnvironmentStrategy::Native)],
        }
    }

    /// Build matrix for the running host.
    pub fn plan_for_host() -> Result<Vec<Self>> {
        Ok(Self::plan(Os::host()?, Arch::host()?))
    }

    /// Whether the build runs through a foreign-architecture layer.
    pub fn is_emulated(&self) -> bool {
        self.strategy == EnvironmentStrategy::EmulatedForeignArchitecture
    }
}

impl fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apple_silicon_host_emulates_intel() {
        let plan = BuildTarget::plan(Os::MacOs, Arch::AArch64);
        assert_eq!(
            plan,
            vec![
                BuildTarget::new(Os::MacOs, Arch::AArch64, EnvironmentStrategy::IsolatedVirtualEnvironment),
                BuildTarget::new(Os::MacOs, Arch::X86_64, EnvironmentStrategy::EmulatedForeignArchitecture),
            ]
        );
    }

    #[test]
    fn intel_mac_still_plans_two_targets() {
        let plan = BuildTarget::plan(Os::MacOs, Arch::X86_64);
        assert_eq!(plan.len(), 2);
        assert!(plan[0].is_emulated());
        assert!(!plan[1].is_emulated());
    }

    #[test]
    fn linux_host_builds_one_native_target() {
        let plan = BuildTarget::plan(Os::Linux, Arch::X86_64);
        assert_eq!(
            plan,
            vec![BuildTarget::new(Os::Linux, Arch::X86_64, EnvironmentStrategy::Native)]
        );
        assert_eq!(plan[0].id(), "linux-x86_64");
    }
}
