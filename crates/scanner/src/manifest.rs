//! SKILL.md parsing.

use {
    anyhow::{Context, bail},
    serde::{Deserialize, Serialize},
    std::collections::BTreeMap,
};

/// Manifest file name that marks a directory as a skill.
pub const MANIFEST_FILE: &str = "SKILL.md";

/// Frontmatter of a SKILL.md file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillManifest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Free-form namespaced metadata; passed through untouched.
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_yaml::Value>,
}

/// Manifest plus the markdown body that follows the frontmatter.
#[derive(Debug, Clone)]
pub struct SkillFile {
    pub manifest: SkillManifest,
    pub body: String,
}

/// Parse SKILL.md content into its frontmatter manifest.
pub fn parse_manifest(content: &str) -> anyhow::Result<SkillManifest> {
    let (frontmatter, _body) = split_frontmatter(content)?;
    let manifest: SkillManifest =
        serde_yaml::from_str(&frontmatter).context("invalid SKILL.md frontmatter")?;
    if manifest.name.trim().is_empty() {
        bail!("SKILL.md frontmatter has no name");
    }
    Ok(manifest)
}

/// Parse SKILL.md content into manifest and body.
pub fn parse_skill_file(content: &str) -> anyhow::Result<SkillFile> {
    let (frontmatter, body) = split_frontmatter(content)?;
    let manifest: SkillManifest =
        serde_yaml::from_str(&frontmatter).context("invalid SKILL.md frontmatter")?;
    if manifest.name.trim().is_empty() {
        bail!("SKILL.md frontmatter has no name");
    }
    Ok(SkillFile { manifest, body })
}

/// Split SKILL.md content at `---` delimiters into (frontmatter, body).
pub fn split_frontmatter(content: &str) -> anyhow::Result<(String, String)> {
    let trimmed = content.trim_start();
    if !trimmed.starts_with("---") {
        bail!("SKILL.md must start with YAML frontmatter delimited by ---");
    }

    // Skip the opening ---
    let after_open = &trimmed[3..];
    let close_pos = after_open
        .find("\n---")
        .context("SKILL.md missing closing --- for frontmatter")?;

    let frontmatter = after_open[..close_pos].trim().to_string();
    let body = after_open[close_pos + 4..].trim().to_string();
    Ok((frontmatter, body))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_frontmatter_fields() {
        let content = r#"---
name: code-review
description: Reviews pull requests
metadata:
  tool:
    emoji: "🔍"
---

# Code Review

Instructions here.
"#;
        let manifest = parse_manifest(content).unwrap();
        assert_eq!(manifest.name, "code-review");
        assert_eq!(manifest.description, "Reviews pull requests");
        assert!(manifest.metadata.contains_key("tool"));
    }

    #[test]
    fn parses_body_alongside_manifest() {
        let content = "---\nname: commit\ndescription: Writes commits\n---\n\nRun `git commit`.\n";
        let file = parse_skill_file(content).unwrap();
        assert_eq!(file.manifest.name, "commit");
        assert!(file.body.contains("git commit"));
    }

    #[test]
    fn description_defaults_to_empty() {
        let manifest = parse_manifest("---\nname: bare\n---\nbody\n").unwrap();
        assert_eq!(manifest.description, "");
        assert!(manifest.metadata.is_empty());
    }

    #[test]
    fn rejects_missing_frontmatter() {
        assert!(parse_manifest("# Just markdown\nNo frontmatter.").is_err());
    }

    #[test]
    fn rejects_unclosed_frontmatter() {
        assert!(parse_manifest("---\nname: test\nno closing\n").is_err());
    }

    #[test]
    fn rejects_empty_name() {
        assert!(parse_manifest("---\nname: \"\"\ndescription: x\n---\nbody\n").is_err());
        assert!(parse_manifest("---\ndescription: x\n---\nbody\n").is_err());
    }
}
