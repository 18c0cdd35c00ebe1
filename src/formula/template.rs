//! Homebrew formula template.

/// Rendered with escaping disabled; values are Ruby-escaped beforehand.
/// `#{bin}` is Ruby interpolation, not a template expression.
pub const FORMULA_TEMPLATE: &str = r##"class {{class_name}} < Formula
  desc "{{description}}"
  homepage "{{homepage}}"
  version "{{version}}"
  license "{{license}}"
{{#each platforms}}

  {{os_selector}} do
{{#each arches}}
    {{arch_selector}} do
{{#if supported}}
      url "{{url}}"
      sha256 "{{sha256}}"
{{else}}
      odie "{{unsupported}}"
{{/if}}
    end
{{/each}}
  end
{{/each}}

  def install
    bin.install "{{product}}"
  end

  test do
    assert_match "{{help_marker}}", shell_output("#{bin}/{{product}} --help")
  end
end
"##;
