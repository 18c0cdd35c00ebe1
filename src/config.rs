//! Release configuration assembled from `pyproject.toml`, environment
//! variables and command line flags.
//!
//! `[project]` supplies product metadata for the formula, and an optional
//! `[tool.opendev-release]` table tunes the build. Environment overrides are
//! applied by the CLI layer (clap `env`).

use crate::bundler::BuildTarget;
use crate::error::{ErrorExt, ReleaseError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default toolchain pin for every build environment.
pub const DEFAULT_PYTHON_VERSION: &str = "3.12";

/// Intel Homebrew interpreter used under Rosetta.
pub const DEFAULT_FOREIGN_PYTHON: &str = "/usr/local/bin/python3";

/// Default remote for the Homebrew tap.
pub const DEFAULT_TAP_URL: &str = "https://github.com/selcuksarikoz/homebrew-opendev.git";

/// Default base for release asset downloads.
pub const DEFAULT_DOWNLOAD_BASE_URL: &str =
    "https://github.com/selcuksarikoz/opendev/releases/download";

/// Product metadata rendered into the formula.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductInfo {
    /// Executable and formula name (e.g. "opendev")
    pub name: String,
    /// Ruby class name (e.g. "Opendev")
    pub class_name: String,
    /// One-line description
    pub description: String,
    /// Project homepage
    pub homepage: String,
    /// SPDX license identifier
    pub license: String,
    /// Substring the formula's test step expects in `--help` output
    pub help_marker: String,
}

impl ProductInfo {
    /// Product with defaults derived from `name`.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            class_name: class_name_for(&name),
            description: format!("{name} command line interface"),
            homepage: "https://github.com/selcuksarikoz/opendev".to_string(),
            license: "MIT".to_string(),
            help_marker: "usage".to_string(),
            name,
        }
    }
}

/// Homebrew class name: `open-dev_cli` becomes `OpenDevCli`.
pub fn class_name_for(formula: &str) -> String {
    formula
        .split(['-', '_', '.'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            chars
                .next()
                .map(|first| first.to_ascii_uppercase().to_string() + chars.as_str())
                .unwrap_or_default()
        })
        .collect()
}

/// Whether the run ends at the local tag or goes on to the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishMode {
    /// Push commit and tag, create the remote release, sync the tap
    Remote,
    /// Stop after the tag is created locally
    LocalOnly,
}

/// A place the rendered formula is written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorTarget {
    /// Formula committed alongside the version bump, path relative to the project root
    Repository {
        /// Formula path relative to the project root
        path: PathBuf,
    },
    /// Homebrew tap checkout synced after the release is published
    Tap {
        /// Local checkout directory
        dir: PathBuf,
        /// Clone URL used when `dir` does not exist yet
        url: String,
        /// Formula path relative to the tap root
        path: PathBuf,
    },
}

/// `src:dest` pair passed to the packaging tool as bundled data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataMapping {
    /// Path relative to the project root
    pub source: PathBuf,
    /// Destination directory inside the executable
    pub dest: String,
}

impl std::str::FromStr for DataMapping {
    type Err = ReleaseError;

    fn from_str(s: &str) -> Result<Self> {
        let (source, dest) = s.split_once(':').ok_or_else(|| ReleaseError::Config {
            reason: format!("data mapping '{s}' must look like 'src:dest'"),
        })?;
        if source.is_empty() || dest.is_empty() {
            return Err(ReleaseError::Config {
                reason: format!("data mapping '{s}' has an empty side"),
            });
        }
        Ok(Self {
            source: PathBuf::from(source),
            dest: dest.to_string(),
        })
    }
}

/// Interpreter pins for build environments.
#[derive(Debug, Clone)]
pub struct ToolchainConfig {
    /// Python version every environment is pinned to
    pub python_version: String,
    /// Foreign-architecture interpreter used under emulation
    pub foreign_python: PathBuf,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            python_version: DEFAULT_PYTHON_VERSION.to_string(),
            foreign_python: PathBuf::from(DEFAULT_FOREIGN_PYTHON),
        }
    }
}

/// Everything one release run needs.
#[derive(Debug, Clone)]
pub struct ReleaseConfig {
    /// Repository root (working tree checked for cleanliness)
    pub project_root: PathBuf,
    /// Manifest holding the version line
    pub version_manifest: PathBuf,
    /// Product metadata
    pub product: ProductInfo,
    /// Entry point script relative to the project root
    pub entry_point: PathBuf,
    /// Bundled data files
    pub data: Vec<DataMapping>,
    /// Build matrix for this host
    pub targets: Vec<BuildTarget>,
    /// Toolchain pins
    pub toolchain: ToolchainConfig,
    /// Remote vs local-only
    pub publish: PublishMode,
    /// Where the rendered formula goes
    pub descriptor_targets: Vec<DescriptorTarget>,
    /// Git remote to push to
    pub remote: String,
    /// Base URL release assets are downloaded from
    pub download_base_url: String,
    /// Root for build environments, staging and archives
    pub out_dir: PathBuf,
}

impl ReleaseConfig {
    /// Formula path inside the repository, if the repository is a target.
    pub fn repository_descriptor(&self) -> Option<PathBuf> {
        self.descriptor_targets.iter().find_map(|t| match t {
            DescriptorTarget::Repository { path } => Some(self.project_root.join(path)),
            DescriptorTarget::Tap { .. } => None,
        })
    }

    /// Directory holding per-target build trees.
    pub fn build_root(&self) -> PathBuf {
        self.out_dir.join("build")
    }

    /// Directory holding staged binaries.
    pub fn stage_root(&self) -> PathBuf {
        self.out_dir.join("stage")
    }

    /// Directory holding archives and the checksum ledger.
    pub fn artifact_dir(&self) -> PathBuf {
        self.out_dir.join("artifacts")
    }
}

/// Overrides supplied by the CLI/environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// `OPENDEV_PYTHON_VERSION`
    pub python_version: Option<String>,
    /// `OPENDEV_X86_PYTHON`
    pub foreign_python: Option<PathBuf>,
    /// `OPENDEV_TAP_DIR`
    pub tap_dir: Option<PathBuf>,
    /// `OPENDEV_TAP_URL`
    pub tap_url: Option<String>,
    /// `OPENDEV_RELEASE_OUT_DIR`
    pub out_dir: Option<PathBuf>,
    /// `--local-only`
    pub local_only: bool,
}

#[derive(Debug, Default, Deserialize)]
struct PyProject {
    #[serde(default)]
    project: Option<ProjectTable>,
    #[serde(default)]
    tool: Option<ToolTable>,
}

#[derive(Debug, Default, Deserialize)]
struct ProjectTable {
    name: Option<String>,
    description: Option<String>,
    #[serde(default)]
    license: Option<LicenseField>,
    #[serde(default)]
    urls: Option<std::collections::BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LicenseField {
    Spdx(String),
    Table { text: Option<String> },
}

#[derive(Debug, Default, Deserialize)]
struct ToolTable {
    #[serde(rename = "opendev-release", default)]
    release: Option<ReleaseTable>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ReleaseTable {
    entry_point: Option<PathBuf>,
    data: Option<Vec<String>>,
    formula_path: Option<PathBuf>,
    remote: Option<String>,
    download_base_url: Option<String>,
    descriptor_targets: Option<Vec<String>>,
    help_marker: Option<String>,
}

/// Loads the configuration for `project_root` on the current host.
pub fn load(project_root: &Path, overrides: &Overrides) -> Result<ReleaseConfig> {
    let manifest = project_root.join("pyproject.toml");
    let text = std::fs::read_to_string(&manifest).fs_context("reading", &manifest)?;
    from_manifest_text(project_root, &text, overrides, BuildTarget::plan_for_host()?)
}

/// Builds the configuration from manifest text and an explicit target list.
pub fn from_manifest_text(
    project_root: &Path,
    text: &str,
    overrides: &Overrides,
    targets: Vec<BuildTarget>,
) -> Result<ReleaseConfig> {
    let parsed: PyProject = toml::from_str(text).map_err(|e| ReleaseError::Config {
        reason: format!("failed to parse pyproject.toml: {e}"),
    })?;
    let project = parsed.project.unwrap_or_default();
    let table = parsed.tool.and_then(|t| t.release).unwrap_or_default();

    let mut product = ProductInfo::new(project.name.unwrap_or_else(|| "opendev".to_string()));
    if let Some(description) = project.description {
        product.description = description;
    }
    match project.license {
        Some(LicenseField::Spdx(spdx)) => product.license = spdx,
        Some(LicenseField::Table { text: Some(text) }) => product.license = text,
        _ => {}
    }
    if let Some(homepage) = project.urls.as_ref().and_then(|u| {
        u.get("Homepage")
            .or_else(|| u.get("homepage"))
            .or_else(|| u.get("Repository"))
    }) {
        product.homepage = homepage.clone();
    }
    if let Some(marker) = table.help_marker {
        product.help_marker = marker;
    }

    let data = table
        .data
        .unwrap_or_else(|| vec!["app/ui/style.tcss:app/ui".to_string()])
        .iter()
        .map(|s| s.parse())
        .collect::<Result<Vec<DataMapping>>>()?;

    let formula_path = table
        .formula_path
        .unwrap_or_else(|| PathBuf::from("Formula").join(format!("{}.rb", product.name)));

    let tap_dir = overrides.tap_dir.clone().unwrap_or_else(|| {
        project_root
            .parent()
            .unwrap_or(project_root)
            .join(format!("homebrew-{}", product.name))
    });
    let tap_url = overrides
        .tap_url
        .clone()
        .unwrap_or_else(|| DEFAULT_TAP_URL.to_string());

    let descriptor_names = table
        .descriptor_targets
        .unwrap_or_else(|| vec!["repository".to_string(), "tap".to_string()]);
    let mut descriptor_targets = Vec::with_capacity(descriptor_names.len());
    for name in &descriptor_names {
        let target = match name.as_str() {
            "repository" => DescriptorTarget::Repository {
                path: formula_path.clone(),
            },
            "tap" => DescriptorTarget::Tap {
                dir: tap_dir.clone(),
                url: tap_url.clone(),
                path: PathBuf::from("Formula").join(format!("{}.rb", product.name)),
            },
            other => {
                return Err(ReleaseError::Config {
                    reason: format!(
                        "unknown descriptor target '{other}' (expected 'repository' or 'tap')"
                    ),
                });
            }
        };
        if !descriptor_targets.contains(&target) {
            descriptor_targets.push(target);
        }
    }

    let toolchain = ToolchainConfig {
        python_version: overrides
            .python_version
            .clone()
            .unwrap_or_else(|| DEFAULT_PYTHON_VERSION.to_string()),
        foreign_python: overrides
            .foreign_python
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FOREIGN_PYTHON)),
    };

    let out_dir = overrides.out_dir.clone().unwrap_or_else(|| {
        std::env::temp_dir().join(format!("{}-release-{}", product.name, uuid::Uuid::new_v4()))
    });

    Ok(ReleaseConfig {
        project_root: project_root.to_path_buf(),
        version_manifest: project_root.join("pyproject.toml"),
        entry_point: table
            .entry_point
            .unwrap_or_else(|| PathBuf::from("app/ui/app.py")),
        data,
        targets,
        toolchain,
        publish: if overrides.local_only {
            PublishMode::LocalOnly
        } else {
            PublishMode::Remote
        },
        descriptor_targets,
        remote: table.remote.unwrap_or_else(|| "origin".to_string()),
        download_base_url: table
            .download_base_url
            .unwrap_or_else(|| DEFAULT_DOWNLOAD_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string(),
        out_dir,
        product,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PYPROJECT: &str = r#"
[project]
name = "opendev"
version = "0.1.2"
description = "Terminal AI coding assistant"
license = "Apache-2.0"

[project.urls]
Homepage = "https://opendev.example"

[tool.opendev-release]
entry-point = "app/main.py"
data = ["app/ui/style.tcss:app/ui", "app/prompts:app/prompts"]
descriptor-targets = ["repository"]
help-marker = "usage:"
"#;

    fn overrides() -> Overrides {
        Overrides {
            out_dir: Some(PathBuf::from("/tmp/out")),
            ..Overrides::default()
        }
    }

    #[test]
    fn class_names() {
        assert_eq!(class_name_for("opendev"), "Opendev");
        assert_eq!(class_name_for("open-dev_cli"), "OpenDevCli");
    }

    #[test]
    fn reads_project_and_tool_tables() {
        let root = Path::new("/work/opendev");
        let cfg = from_manifest_text(root, PYPROJECT, &overrides(), Vec::new()).unwrap();
        assert_eq!(cfg.product.name, "opendev");
        assert_eq!(cfg.product.class_name, "Opendev");
        assert_eq!(cfg.product.license, "Apache-2.0");
        assert_eq!(cfg.product.homepage, "https://opendev.example");
        assert_eq!(cfg.product.help_marker, "usage:");
        assert_eq!(cfg.entry_point, PathBuf::from("app/main.py"));
        assert_eq!(cfg.data.len(), 2);
        assert_eq!(cfg.data[1].dest, "app/prompts");
        assert_eq!(
            cfg.descriptor_targets,
            vec![DescriptorTarget::Repository {
                path: PathBuf::from("Formula/opendev.rb")
            }]
        );
        assert_eq!(
            cfg.repository_descriptor(),
            Some(PathBuf::from("/work/opendev/Formula/opendev.rb"))
        );
        assert_eq!(cfg.publish, PublishMode::Remote);
    }

    #[test]
    fn defaults_include_tap_next_to_project() {
        let root = Path::new("/work/opendev");
        let cfg = from_manifest_text(
            root,
            "[project]\nname = \"opendev\"\nversion = \"0.1.0\"\n",
            &overrides(),
            Vec::new(),
        )
        .unwrap();
        assert_eq!(cfg.toolchain.python_version, DEFAULT_PYTHON_VERSION);
        assert_eq!(cfg.entry_point, PathBuf::from("app/ui/app.py"));
        assert!(cfg.descriptor_targets.contains(&DescriptorTarget::Tap {
            dir: PathBuf::from("/work/homebrew-opendev"),
            url: DEFAULT_TAP_URL.to_string(),
            path: PathBuf::from("Formula/opendev.rb"),
        }));
    }

    #[test]
    fn overrides_win() {
        let root = Path::new("/work/opendev");
        let ov = Overrides {
            python_version: Some("3.11".to_string()),
            foreign_python: Some(PathBuf::from("/opt/x86/python3")),
            tap_dir: Some(PathBuf::from("/taps/opendev")),
            local_only: true,
            ..overrides()
        };
        let cfg = from_manifest_text(root, "[project]\nname = \"opendev\"\n", &ov, Vec::new())
            .unwrap();
        assert_eq!(cfg.toolchain.python_version, "3.11");
        assert_eq!(cfg.toolchain.foreign_python, PathBuf::from("/opt/x86/python3"));
        assert_eq!(cfg.publish, PublishMode::LocalOnly);
        assert!(matches!(
            &cfg.descriptor_targets[1],
            DescriptorTarget::Tap { dir, .. } if dir == Path::new("/taps/opendev")
        ));
    }

    #[test]
    fn rejects_unknown_descriptor_target() {
        let text = "[tool.opendev-release]\ndescriptor-targets = [\"gist\"]\n";
        let err = from_manifest_text(Path::new("/w"), text, &overrides(), Vec::new()).unwrap_err();
        assert!(err.to_string().contains("unknown descriptor target 'gist'"));
    }

    #[test]
    fn rejects_bad_data_mapping() {
        assert!("app/ui/style.tcss".parse::<DataMapping>().is_err());
        assert!(":dest".parse::<DataMapping>().is_err());
    }
}
