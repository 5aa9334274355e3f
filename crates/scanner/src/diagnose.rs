//! Directory health reporting for troubleshooting empty scans.

use {
    serde::Serialize,
    std::path::{Path, PathBuf},
};

use crate::{
    manifest::{self, MANIFEST_FILE},
    scan::SkillScanner,
    types::SkillScope,
};

/// State of one skill root on disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryReport {
    pub path: PathBuf,
    pub scope: SkillScope,
    pub exists: bool,
    /// Subdirectories whose SKILL.md parses.
    pub skill_count: usize,
}

/// Aggregate problems worth surfacing to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ScanIssue {
    /// None of the configured skill roots exist.
    NoSkillDirectories,
    /// No project is open, so project-scoped skills cannot be found.
    NoProjectOpen,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanDiagnostics {
    pub directories: Vec<DirectoryReport>,
    pub issues: Vec<ScanIssue>,
}

impl SkillScanner {
    /// Report every skill root with its existence and valid-skill count.
    pub fn diagnose(&self) -> ScanDiagnostics {
        let mut directories = Vec::new();
        for dir in self.paths().scan_dirs(true) {
            directories.push(report_dir(dir, SkillScope::Global));
        }
        for dir in self.paths().scan_dirs(false) {
            directories.push(report_dir(dir, SkillScope::Project));
        }

        let mut issues = Vec::new();
        if directories.iter().all(|d| !d.exists) {
            issues.push(ScanIssue::NoSkillDirectories);
        }
        if !self.paths().has_project() {
            issues.push(ScanIssue::NoProjectOpen);
        }
        ScanDiagnostics { directories, issues }
    }
}

fn report_dir(path: PathBuf, scope: SkillScope) -> DirectoryReport {
    let exists = path.is_dir();
    let skill_count = if exists { count_skills(&path) } else { 0 };
    DirectoryReport {
        path,
        scope,
        exists,
        skill_count,
    }
}

fn count_skills(dir: &Path) -> usize {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return 0,
    };
    entries
        .flatten()
        .filter(|entry| {
            let manifest_path = entry.path().join(MANIFEST_FILE);
            std::fs::read_to_string(&manifest_path)
                .ok()
                .is_some_and(|content| manifest::parse_manifest(&content).is_ok())
        })
        .count()
}
