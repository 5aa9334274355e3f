//! Filesystem layout of skill roots, lock files and the project manifest.

use {
    anyhow::Context,
    skillsync_lockfile::{FallbackMatching, LockStore},
    std::path::{Path, PathBuf},
};

/// Shared skill root under home or project directories.
const CANONICAL_DIR: &str = ".agents";
/// Tool-specific skill root mirrored next to the canonical one.
const TOOL_DIR: &str = ".claude";
const SKILLS_SUBDIR: &str = "skills";
const LOCK_FILE: &str = "skills-lock.json";
const PROJECT_MANIFEST: &str = "skills.json";

/// Everything the engine observes on disk: two global skill directories, two
/// per-project skill directories, the lock files and the project's
/// desired-skill manifest. Project fields are `None` when no project is open.
#[derive(Debug, Clone)]
pub struct SkillPaths {
    /// `~/.agents/skills`, the canonical global root. Wins dedup against the
    /// tool root.
    pub global_canonical: PathBuf,
    /// `~/.claude/skills`.
    pub global_tool: PathBuf,
    /// `<project>/.agents/skills`.
    pub project_canonical: Option<PathBuf>,
    /// `<project>/.claude/skills`.
    pub project_tool: Option<PathBuf>,
    /// `~/.agents/skills-lock.json`.
    pub global_lock_file: PathBuf,
    /// `<project>/skills-lock.json`.
    pub project_lock_file: Option<PathBuf>,
    /// `<project>/skills.json`, the declarative list of desired skills.
    pub project_manifest: Option<PathBuf>,
}

impl SkillPaths {
    /// Layout rooted at an explicit home directory. Tests use this to point
    /// everything into a temp dir.
    pub fn rooted(home: &Path, project_root: Option<&Path>) -> Self {
        Self {
            global_canonical: home.join(CANONICAL_DIR).join(SKILLS_SUBDIR),
            global_tool: home.join(TOOL_DIR).join(SKILLS_SUBDIR),
            project_canonical: project_root.map(|p| p.join(CANONICAL_DIR).join(SKILLS_SUBDIR)),
            project_tool: project_root.map(|p| p.join(TOOL_DIR).join(SKILLS_SUBDIR)),
            global_lock_file: home.join(CANONICAL_DIR).join(LOCK_FILE),
            project_lock_file: project_root.map(|p| p.join(LOCK_FILE)),
            project_manifest: project_root.map(|p| p.join(PROJECT_MANIFEST)),
        }
    }

    /// Layout rooted at the user's home directory.
    pub fn discover(project_root: Option<&Path>) -> anyhow::Result<Self> {
        let base = directories::BaseDirs::new().context("could not determine home directory")?;
        Ok(Self::rooted(base.home_dir(), project_root))
    }

    pub fn has_project(&self) -> bool {
        self.project_canonical.is_some()
    }

    /// The global lock matches installs by exact folder name, then by the
    /// recorded skill path suffix.
    pub fn global_lock_store(&self) -> LockStore {
        LockStore::new(self.global_lock_file.clone(), FallbackMatching::Enabled)
    }

    /// The project lock matches by exact folder name only.
    pub fn project_lock_store(&self) -> Option<LockStore> {
        self.project_lock_file
            .clone()
            .map(|p| LockStore::new(p, FallbackMatching::Disabled))
    }

    /// Skill directories for one scope, canonical root first.
    pub fn scan_dirs(&self, global: bool) -> Vec<PathBuf> {
        if global {
            vec![self.global_canonical.clone(), self.global_tool.clone()]
        } else {
            [self.project_canonical.clone(), self.project_tool.clone()]
                .into_iter()
                .flatten()
                .collect()
        }
    }

    /// Directories the change watcher monitors for SKILL.md churn.
    pub fn watch_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = self.scan_dirs(true);
        dirs.extend(self.scan_dirs(false));
        dirs
    }

    /// Individual files the change watcher monitors: both lock files and the
    /// project manifest.
    pub fn watch_files(&self) -> Vec<PathBuf> {
        let mut files = vec![self.global_lock_file.clone()];
        files.extend(self.project_lock_file.clone());
        files.extend(self.project_manifest.clone());
        files
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn rooted_layout_without_project() {
        let paths = SkillPaths::rooted(Path::new("/home/dev"), None);
        assert_eq!(
            paths.global_canonical,
            PathBuf::from("/home/dev/.agents/skills")
        );
        assert_eq!(paths.global_tool, PathBuf::from("/home/dev/.claude/skills"));
        assert_eq!(
            paths.global_lock_file,
            PathBuf::from("/home/dev/.agents/skills-lock.json")
        );
        assert!(!paths.has_project());
        assert!(paths.scan_dirs(false).is_empty());
        assert_eq!(paths.watch_dirs().len(), 2);
        assert_eq!(paths.watch_files().len(), 1);
    }

    #[test]
    fn rooted_layout_with_project() {
        let paths = SkillPaths::rooted(Path::new("/home/dev"), Some(Path::new("/work/app")));
        assert_eq!(
            paths.project_canonical.as_deref(),
            Some(Path::new("/work/app/.agents/skills"))
        );
        assert_eq!(
            paths.project_lock_file.as_deref(),
            Some(Path::new("/work/app/skills-lock.json"))
        );
        assert_eq!(
            paths.project_manifest.as_deref(),
            Some(Path::new("/work/app/skills.json"))
        );
        assert_eq!(paths.watch_dirs().len(), 4);
        assert_eq!(paths.watch_files().len(), 3);
    }

    #[test]
    fn scan_dirs_put_canonical_first() {
        let paths = SkillPaths::rooted(Path::new("/home/dev"), Some(Path::new("/work/app")));
        let global = paths.scan_dirs(true);
        assert_eq!(global[0], paths.global_canonical);
        assert_eq!(global[1], paths.global_tool);

        let project = paths.scan_dirs(false);
        assert_eq!(project[0], paths.project_canonical.clone().unwrap());
        assert_eq!(project[1], paths.project_tool.clone().unwrap());
    }
}
