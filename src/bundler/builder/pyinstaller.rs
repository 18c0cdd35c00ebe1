//! Single-file executables built with PyInstaller in a fresh environment.

use super::{Builder, TargetPaths};
use crate::bundler::{BuildTarget, ExecutionLayer};
use crate::config::{DataMapping, ReleaseConfig, ToolchainConfig};
use crate::error::{ReleaseError, Result};
use crate::process::{BUILD_TIMEOUT, PROBE_TIMEOUT, ToolCommand, resolve_tool};
use std::path::{Path, PathBuf};

/// Inherited variables that change which interpreter or packages a build
/// resolves. Removed from every build command; `PIP_*` variables are
/// removed as well.
pub const AMBIENT_OVERRIDES: &[&str] = &[
    "PYTHONPATH",
    "PYTHONHOME",
    "PYTHONSTARTUP",
    "PYTHONUSERBASE",
    "PYTHONNOUSERSITE",
    "VIRTUAL_ENV",
    "CONDA_PREFIX",
    "CONDA_DEFAULT_ENV",
    "UV_PYTHON",
    "UV_PROJECT_ENVIRONMENT",
    "UV_INDEX_URL",
    "UV_EXTRA_INDEX_URL",
    "__PYVENV_LAUNCHER__",
];

/// Prints interpreter version and machine, one per line.
const INTERPRETER_PROBE: &str =
    "import platform; print(platform.python_version()); print(platform.machine())";

/// Builds the product with PyInstaller.
///
/// Native and isolated targets get a `uv venv` pinned to the configured
/// Python version; emulated targets create their environment with the
/// foreign interpreter running through the execution layer.
#[derive(Debug, Clone)]
pub struct PyInstallerBuilder {
    product: String,
    project_root: PathBuf,
    entry_point: PathBuf,
    data: Vec<DataMapping>,
    toolchain: ToolchainConfig,
}

impl PyInstallerBuilder {
    /// Creates a builder from the release configuration.
    pub fn from_config(config: &ReleaseConfig) -> Self {
        Self {
            product: config.product.name.clone(),
            project_root: config.project_root.clone(),
            entry_point: config.entry_point.clone(),
            data: config.data.clone(),
            toolchain: config.toolchain.clone(),
        }
    }

    /// Base command with ambient overrides removed.
    fn command(&self, program: impl AsRef<Path>, target: &BuildTarget, step: &str) -> ToolCommand {
        ToolCommand::new(program.as_ref())
            .env_remove(ambient_overrides())
            .current_dir(&self.project_root)
            .timeout(BUILD_TIMEOUT)
            .context(format!("{step} for {target}"))
    }

    /// `uv venv` for native targets, `<foreign python> -m venv` for emulated ones.
    fn environment_command(&self, target: &BuildTarget, paths: &TargetPaths) -> ToolCommand {
        let step = "creating build environment";
        if target.is_emulated() {
            self.command(&self.toolchain.foreign_python, target, step)
                .args(["-m", "venv"])
                .arg(&paths.env)
        } else {
            self.command("uv", target, step)
                .args(["venv", "--seed", "--python", self.toolchain.python_version.as_str()])
                .arg(&paths.env)
        }
    }

    fn install_command(&self, target: &BuildTarget, paths: &TargetPaths) -> ToolCommand {
        self.command(paths.python(), target, "installing dependencies")
            .args([
                "-m",
                "pip",
                "install",
                "--disable-pip-version-check",
                "pyinstaller",
            ])
            .arg(&self.project_root)
    }

    fn pyinstaller_command(&self, target: &BuildTarget, paths: &TargetPaths) -> ToolCommand {
        let mut cmd = self
            .command(paths.python(), target, "running PyInstaller")
            .tool_name("pyinstaller")
            .args(["-m", "PyInstaller", "--noconfirm", "--clean", "--onefile"])
            .args(["--name", self.product.as_str()])
            .arg("--distpath")
            .arg(&paths.dist)
            .arg("--workpath")
            .arg(&paths.work)
            .arg("--specpath")
            .arg(&paths.spec);

        // --specpath moves the base for relative paths, so pass absolute ones
        for mapping in &self.data {
            let source = self.project_root.join(&mapping.source);
            cmd = cmd
                .arg("--add-data")
                .arg(format!("{}:{}", source.display(), mapping.dest));
        }
        cmd.arg(self.project_root.join(&self.entry_point))
    }

    /// Confirms the environment interpreter matches the pin and the
    /// target architecture.
    async fn verify_interpreter<L: ExecutionLayer>(
        &self,
        target: &BuildTarget,
        paths: &TargetPaths,
        layer: &L,
    ) -> Result<()> {
        let probe = layer.wrap(
            self.command(paths.python(), target, "checking build interpreter")
                .args(["-c", INTERPRETER_PROBE])
                .timeout(PROBE_TIMEOUT),
        );
        let output = probe.run_checked().await?;
        let mut lines = output.stdout.lines().map(str::trim);
        let version = lines.next().unwrap_or_default();
        let machine = lines.next().unwrap_or_default();

        let pin = self.toolchain.python_version.as_str();
        if version != pin && !version.starts_with(&format!("{pin}.")) {
            return Err(ReleaseError::BuildFailed {
                target: target.id(),
                reason: format!("environment has Python {version}, expected {pin}"),
            });
        }
        if !target.arch.machine_names().contains(&machine) {
            return Err(ReleaseError::BuildFailed {
                target: target.id(),
                reason: format!(
                    "environment reports machine '{machine}', expected {}",
                    target.arch
                ),
            });
        }
        log::debug!("{target}: Python {version} on {machine}");
        Ok(())
    }
}

impl Builder for PyInstallerBuilder {
    async fn check_available(&self, target: &BuildTarget) -> Result<()> {
        if target.is_emulated() {
            if !self.toolchain.foreign_python.is_file() {
                return Err(ReleaseError::ToolUnavailable {
                    tool: self.toolchain.foreign_python.display().to_string(),
                    reason: format!(
                        "foreign-architecture interpreter for {target} not found (set OPENDEV_X86_PYTHON)"
                    ),
                });
            }
        } else {
            resolve_tool("uv")?;
        }

        let entry = self.project_root.join(&self.entry_point);
        if !entry.is_file() {
            return Err(ReleaseError::Config {
                reason: format!("entry point {} does not exist", entry.display()),
            });
        }
        for mapping in &self.data {
            let source = self.project_root.join(&mapping.source);
            if !source.exists() {
                return Err(ReleaseError::Config {
                    reason: format!("data source {} does not exist", source.display()),
                });
            }
        }
        Ok(())
    }

    async fn build<L: ExecutionLayer>(
        &self,
        target: &BuildTarget,
        paths: &TargetPaths,
        layer: &L,
    ) -> Result<()> {
        log::info!("{target}: creating {} environment", target.strategy);
        layer.wrap(self.environment_command(target, paths)).run_checked().await?;
        self.verify_interpreter(target, paths, layer).await?;

        log::info!("{target}: installing pyinstaller and project");
        layer.wrap(self.install_command(target, paths)).run_checked().await?;

        log::info!("{target}: building {}", self.product);
        layer.wrap(self.pyinstaller_command(target, paths)).run_checked().await?;
        Ok(())
    }
}

/// [`AMBIENT_OVERRIDES`] plus every `PIP_*` variable currently set.
fn ambient_overrides() -> Vec<String> {
    let mut keys: Vec<String> = AMBIENT_OVERRIDES.iter().map(|k| (*k).to_string()).collect();
    keys.extend(
        std::env::vars_os()
            .filter_map(|(key, _)| key.into_string().ok())
            .filter(|key| key.starts_with("PIP_")),
    );
    keys
}
