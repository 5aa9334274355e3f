//! The scan pass: walk skill roots, parse manifests, join lock state.

use {
    skillsync_lockfile::{LockFile, LockStore},
    std::{
        collections::HashSet,
        path::{Path, PathBuf},
    },
    tracing::{debug, warn},
};

use crate::{
    manifest::{self, MANIFEST_FILE},
    paths::SkillPaths,
    types::{InstalledSkill, ScanResult, SkillScope},
};

/// Stateless scanner over the configured skill roots. Each call to [`scan`]
/// rebuilds the complete installed-skill picture from disk.
///
/// [`scan`]: SkillScanner::scan
pub struct SkillScanner {
    paths: SkillPaths,
}

impl SkillScanner {
    pub fn new(paths: SkillPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &SkillPaths {
        &self.paths
    }

    /// Run one full pass. Missing directories and lock files read as empty,
    /// never as errors; a directory is a skill only if its SKILL.md parses.
    pub fn scan(&self) -> ScanResult {
        let global_store = self.paths.global_lock_store();
        let global_lock = global_store.load();

        let mut result = ScanResult::default();
        scan_scope(
            SkillScope::Global,
            &self.paths.scan_dirs(true),
            &global_store,
            &global_lock,
            &mut result.global_skills,
        );

        if let Some(project_store) = self.paths.project_lock_store() {
            let project_lock = project_store.load();
            scan_scope(
                SkillScope::Project,
                &self.paths.scan_dirs(false),
                &project_store,
                &project_lock,
                &mut result.project_skills,
            );
        }
        result
    }
}

/// Scan the directories of one scope in order. The first directory holding a
/// given folder name wins; later duplicates are dropped.
fn scan_scope(
    scope: SkillScope,
    dirs: &[PathBuf],
    store: &LockStore,
    lock: &LockFile,
    out: &mut Vec<InstalledSkill>,
) {
    let mut seen: HashSet<String> = HashSet::new();
    for dir in dirs {
        for (path, is_symlink) in skill_dir_entries(dir) {
            let folder_name = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n.to_string(),
                None => continue,
            };
            if seen.contains(&folder_name) {
                debug!(path = %path.display(), "duplicate skill folder, earlier root wins");
                continue;
            }
            if let Some(skill) = read_skill(scope, store, lock, &path, &folder_name, is_symlink) {
                seen.insert(folder_name);
                out.push(skill);
            }
        }
    }
}

/// Entries of a skill root that resolve to directories, sorted by name.
/// Symlinks are followed to decide directory-ness; a dangling link is not a
/// skill.
fn skill_dir_entries(dir: &Path) -> Vec<(PathBuf, bool)> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return Vec::new(),
    };

    let mut dirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let meta = match std::fs::symlink_metadata(&path) {
            Ok(m) => m,
            Err(_) => continue,
        };
        let is_symlink = meta.file_type().is_symlink();
        let is_dir = if is_symlink {
            std::fs::metadata(&path).map(|m| m.is_dir()).unwrap_or(false)
        } else {
            meta.is_dir()
        };
        if is_dir {
            dirs.push((path, is_symlink));
        }
    }
    dirs.sort();
    dirs
}

/// Read and classify one candidate skill directory. A tracked skill carries
/// its lock entry's source and hash; a real directory with no lock entry is
/// custom; a symlink with no lock entry is merely untracked.
fn read_skill(
    scope: SkillScope,
    store: &LockStore,
    lock: &LockFile,
    path: &Path,
    folder_name: &str,
    is_symlink: bool,
) -> Option<InstalledSkill> {
    let manifest_path = path.join(MANIFEST_FILE);
    if !manifest_path.is_file() {
        return None;
    }
    let content = match std::fs::read_to_string(&manifest_path) {
        Ok(c) => c,
        Err(e) => {
            warn!(path = %manifest_path.display(), %e, "failed to read SKILL.md");
            return None;
        },
    };
    let parsed = match manifest::parse_manifest(&content) {
        Ok(m) => m,
        Err(e) => {
            debug!(path = %manifest_path.display(), %e, "skipping non-conforming SKILL.md");
            return None;
        },
    };

    let entry = store.resolve(lock, folder_name).map(|(_, e)| e);
    Some(InstalledSkill {
        name: parsed.name,
        folder_name: folder_name.to_string(),
        description: parsed.description,
        path: path.to_path_buf(),
        scope,
        metadata: parsed.metadata,
        source: entry.map(|e| e.source.clone()),
        hash: entry.and_then(|e| e.hash()).map(str::to_string),
        skill_path: entry.and_then(|e| e.skill_path.clone()),
        is_custom: entry.is_none() && !is_symlink,
    })
}
