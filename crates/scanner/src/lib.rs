//! Filesystem discovery of installed skills.
//!
//! A skill is a directory whose `SKILL.md` carries YAML frontmatter. The
//! scanner walks the global and project skill roots, parses each manifest,
//! joins the result against the lock files and classifies every entry as
//! tracked, custom or untracked. Scans are stateless: each pass rebuilds the
//! whole picture from disk.

pub mod diagnose;
pub mod manifest;
pub mod paths;
pub mod scan;
pub mod types;

pub use {
    diagnose::{DirectoryReport, ScanDiagnostics, ScanIssue},
    manifest::{SkillFile, SkillManifest, parse_manifest, parse_skill_file, split_frontmatter},
    paths::SkillPaths,
    scan::SkillScanner,
    types::{InstalledSkill, ScanResult, SkillScope},
};
