//! Homebrew formula generation.
//!
//! Renders the package-manager descriptor from the release version and its
//! fingerprinted artifacts. Rendering is pure: the same inputs always give
//! byte-identical text, so an unchanged descriptor can be detected by
//! comparison.

mod template;

use crate::bundler::{Arch, Artifact, Os};
use crate::config::ProductInfo;
use crate::error::Result;
use crate::version::Version;
use handlebars::Handlebars;
use serde::Serialize;
use template::FORMULA_TEMPLATE;

const TEMPLATE_NAME: &str = "formula.rb";

/// Operating systems with a block in the formula, in order.
const FORMULA_OSES: [Os; 2] = [Os::MacOs, Os::Linux];

/// Architectures with a block inside each OS block, in order.
const FORMULA_ARCHES: [Arch; 2] = [Arch::AArch64, Arch::X86_64];

#[derive(Serialize)]
struct FormulaData<'a> {
    class_name: String,
    description: String,
    homepage: String,
    license: String,
    version: String,
    product: &'a str,
    help_marker: String,
    platforms: Vec<PlatformBlock>,
}

#[derive(Serialize)]
struct PlatformBlock {
    os_selector: &'static str,
    arches: Vec<ArchBlock>,
}

#[derive(Serialize)]
struct ArchBlock {
    arch_selector: &'static str,
    supported: bool,
    url: String,
    sha256: String,
    unsupported: String,
}

/// Renders Homebrew formulas for one product.
pub struct FormulaGenerator {
    product: ProductInfo,
    download_base: String,
    registry: Handlebars<'static>,
}

impl std::fmt::Debug for FormulaGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormulaGenerator")
            .field("product", &self.product)
            .field("download_base", &self.download_base)
            .finish_non_exhaustive()
    }
}

impl FormulaGenerator {
    /// Creates a generator.
    ///
    /// # Arguments
    ///
    /// * `product` - Name, class name and metadata of the formula
    /// * `download_base` - Release download base; assets live at
    ///   `<download_base>/v<version>/<archive>`
    pub fn new(product: ProductInfo, download_base: impl Into<String>) -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        registry.set_strict_mode(true);
        registry.register_template_string(TEMPLATE_NAME, FORMULA_TEMPLATE)?;
        Ok(Self {
            product,
            download_base: download_base.into().trim_end_matches('/').to_string(),
            registry,
        })
    }

    /// Download URL of `archive_name` for `version`.
    pub fn asset_url(&self, version: Version, archive_name: &str) -> String {
        format!("{}/{}/{}", self.download_base, version.tag(), archive_name)
    }

    /// Renders the formula for `version`.
    ///
    /// Every OS/architecture branch without a matching artifact renders an
    /// `odie` naming the unsupported platform.
    pub fn render(&self, version: Version, artifacts: &[Artifact]) -> Result<String> {
        let version_text = version.to_string();
        let platforms = FORMULA_OSES
            .iter()
            .filter_map(|os| {
                let os_selector = os.formula_selector()?;
                let arches = FORMULA_ARCHES
                    .iter()
                    .map(|arch| self.arch_block(version, *os, *arch, artifacts))
                    .collect();
                Some(PlatformBlock {
                    os_selector,
                    arches,
                })
            })
            .collect();

        let data = FormulaData {
            class_name: self.product.class_name.clone(),
            description: ruby_escape(&self.product.description),
            homepage: ruby_escape(&self.product.homepage),
            license: ruby_escape(&self.product.license),
            version: version_text,
            product: &self.product.name,
            help_marker: ruby_escape(&self.product.help_marker),
            platforms,
        };

        Ok(self.registry.render(TEMPLATE_NAME, &data)?)
    }

    fn arch_block(&self, version: Version, os: Os, arch: Arch, artifacts: &[Artifact]) -> ArchBlock {
        let artifact = artifacts
            .iter()
            .find(|a| a.target.os == os && a.target.arch == arch);
        ArchBlock {
            arch_selector: arch.formula_selector(),
            supported: artifact.is_some(),
            url: artifact
                .map(|a| self.asset_url(version, &a.archive_name))
                .unwrap_or_default(),
            sha256: artifact.map(|a| a.fingerprint.clone()).unwrap_or_default(),
            unsupported: format!(
                "{} {}: unsupported platform ({}-{})",
                self.product.name, version, os, arch
            ),
        }
    }
}

/// Escapes text for a double-quoted Ruby string literal.
fn ruby_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '#' if matches!(chars.peek(), Some('{' | '$' | '@')) => escaped.push_str("\\#"),
            '\n' => escaped.push_str("\\n"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::{BuildTarget, EnvironmentStrategy};
    use std::path::PathBuf;

    const ARM_SHA: &str = "1111111111111111111111111111111111111111111111111111111111111111";
    const INTEL_SHA: &str = "2222222222222222222222222222222222222222222222222222222222222222";

    fn artifact(arch: Arch, fingerprint: &str) -> Artifact {
        let target = BuildTarget::new(Os::MacOs, arch, EnvironmentStrategy::Native);
        let archive_name = format!("opendev-macos-{arch}.tar.gz");
        Artifact {
            target,
            binary_path: PathBuf::from("/b/opendev"),
            archive_path: PathBuf::from("/a").join(&archive_name),
            archive_name,
            fingerprint: fingerprint.to_string(),
        }
    }

    fn generator() -> FormulaGenerator {
        FormulaGenerator::new(
            ProductInfo::new("opendev"),
            "https://github.com/selcuksarikoz/opendev/releases/download/",
        )
        .unwrap()
    }

    fn mac_artifacts() -> Vec<Artifact> {
        vec![artifact(Arch::AArch64, ARM_SHA), artifact(Arch::X86_64, INTEL_SHA)]
    }

    #[test]
    fn renders_macos_branches_with_versioned_urls() {
        let text = generator().render(Version::new(0, 1, 3), &mac_artifacts()).unwrap();

        assert!(text.starts_with("class Opendev < Formula\n"));
        assert!(text.contains("  version \"0.1.3\"\n"));
        assert!(text.contains(
            "url \"https://github.com/selcuksarikoz/opendev/releases/download/v0.1.3/opendev-macos-arm64.tar.gz\""
        ));
        assert!(text.contains(&format!("sha256 \"{ARM_SHA}\"")));
        assert!(text.contains(&format!("sha256 \"{INTEL_SHA}\"")));
        assert_eq!(text.matches("/v0.1.3/").count(), 2);
        assert!(text.contains("bin.install \"opendev\""));
        assert!(text.contains("assert_match \"usage\", shell_output(\"#{bin}/opendev --help\")"));
    }

    #[test]
    fn missing_branches_render_odie() {
        let text = generator().render(Version::new(0, 1, 3), &mac_artifacts()).unwrap();

        assert!(text.contains("odie \"opendev 0.1.3: unsupported platform (linux-arm64)\""));
        assert!(text.contains("odie \"opendev 0.1.3: unsupported platform (linux-x86_64)\""));
        assert!(!text.contains("unsupported platform (macos"));
        let linux = &text[text.find("on_linux do").unwrap()..];
        assert!(!linux.contains("url \""));
    }

    #[test]
    fn arm_block_precedes_intel_block() {
        let text = generator().render(Version::new(1, 0, 0), &mac_artifacts()).unwrap();
        let macos = &text[text.find("on_macos do").unwrap()..text.find("on_linux do").unwrap()];
        assert!(macos.find("on_arm do").unwrap() < macos.find("on_intel do").unwrap());
        assert!(macos.find(ARM_SHA).unwrap() < macos.find(INTEL_SHA).unwrap());
    }

    #[test]
    fn rendering_is_pure() {
        let generator = generator();
        let mut reversed = mac_artifacts();
        reversed.reverse();
        let a = generator.render(Version::new(0, 1, 3), &mac_artifacts()).unwrap();
        let b = generator.render(Version::new(0, 1, 3), &mac_artifacts()).unwrap();
        let c = generator.render(Version::new(0, 1, 3), &reversed).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn metadata_is_ruby_escaped() {
        let mut product = ProductInfo::new("opendev");
        product.description = "Say \"hi\" to #{ENV}".to_string();
        let text = FormulaGenerator::new(product, "https://x")
            .unwrap()
            .render(Version::new(0, 1, 0), &[])
            .unwrap();
        assert!(text.contains(r#"desc "Say \"hi\" to \#{ENV}""#));
    }
}
