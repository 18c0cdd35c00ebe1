//! Operating system and CPU architecture types.

use crate::error::{ReleaseError, Result};
use std::fmt;

/// CPU architecture for target binaries.
///
/// Only the two architectures Homebrew distinguishes (`on_arm` / `on_intel`)
/// are modelled.
///
/// # Examples
///
/// ```
/// use opendev_release::bundler::Arch;
///
/// assert_eq!(Arch::AArch64.as_str(), "arm64");
/// assert_eq!(Arch::X86_64.formula_selector(), "on_intel");
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    /// AArch64 / ARM64 (64-bit) - Apple Silicon, modern ARM devices
    AArch64,
    /// x86_64 / AMD64 (64-bit) - Intel Macs and most Linux servers
    X86_64,
}

impl Arch {
    /// Architecture of the running host.
    pub fn host() -> Result<Self> {
        Self::from_rust_arch(std::env::consts::ARCH)
    }

    /// Maps a `std::env::consts::ARCH` value.
    pub fn from_rust_arch(arch: &str) -> Result<Self> {
        match arch {
            "aarch64" => Ok(Self::AArch64),
            "x86_64" => Ok(Self::X86_64),
            other => Err(ReleaseError::Config {
                reason: format!("unsupported host architecture: {other}"),
            }),
        }
    }

    /// Name used in archive file names.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AArch64 => "arm64",
            Self::X86_64 => "x86_64",
        }
    }

    /// Homebrew hardware block for this architecture.
    pub const fn formula_selector(&self) -> &'static str {
        match self {
            Self::AArch64 => "on_arm",
            Self::X86_64 => "on_intel",
        }
    }

    /// Values Python's `platform.machine()` reports on this architecture.
    pub const fn machine_names(&self) -> &'static [&'static str] {
        match self {
            Self::AArch64 => &["arm64", "aarch64"],
            Self::X86_64 => &["x86_64", "amd64", "AMD64"],
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operating system family of a target.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Os {
    /// macOS, the platform Homebrew bottles and formulas target first
    MacOs,
    /// Linux (Homebrew on Linux)
    Linux,
    /// Windows, built natively only
    Windows,
}

impl Os {
    /// Operating system of the running host.
    pub fn host() -> Result<Self> {
        Self::from_rust_os(std::env::consts::OS)
    }

    /// Maps a `std::env::consts::OS` value.
    pub fn from_rust_os(os: &str) -> Result<Self> {
        match os {
            "macos" => Ok(Self::MacOs),
            "linux" => Ok(Self::Linux),
            "windows" => Ok(Self::Windows),
            other => Err(ReleaseError::Config {
                reason: format!("unsupported host operating system: {other}"),
            }),
        }
    }

    /// Name used in archive file names.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MacOs => "macos",
            Self::Linux => "linux",
            Self::Windows => "windows",
        }
    }

    /// Homebrew OS block, if Homebrew supports this OS.
    pub const fn formula_selector(&self) -> Option<&'static str> {
        match self {
            Self::MacOs => Some("on_macos"),
            Self::Linux => Some("on_linux"),
            Self::Windows => None,
        }
    }

    /// File name of an executable called `name`.
    pub fn executable_name(&self, name: &str) -> String {
        match self {
            Self::Windows => format!("{name}.exe"),
            _ => name.to_string(),
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_rust_constants() {
        assert_eq!(Arch::from_rust_arch("aarch64").unwrap(), Arch::AArch64);
        assert_eq!(Os::from_rust_os("macos").unwrap(), Os::MacOs);
        assert!(Arch::from_rust_arch("riscv64").is_err());
        assert!(Os::from_rust_os("freebsd").is_err());
    }

    #[test]
    fn windows_executables_get_suffix() {
        assert_eq!(Os::Windows.executable_name("opendev"), "opendev.exe");
        assert_eq!(Os::MacOs.executable_name("opendev"), "opendev");
    }
}
