use std::path::{Path, PathBuf};

use tracing::warn;

use crate::file::{LockEntry, LockFile};

/// Whether a store participates in path-suffix fallback matching.
///
/// Global lock keys may predate the installed folder name, so the global
/// store resolves by path suffix when the exact key is absent. Project store
/// keys are always folder names by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackMatching {
    Enabled,
    Disabled,
}

/// File-backed lock store with atomic writes.
///
/// A missing or malformed file is "store absent", never an error: every call
/// site degrades to "no provenance" instead of aborting.
pub struct LockStore {
    path: PathBuf,
    fallback: FallbackMatching,
}

impl LockStore {
    pub fn new(path: PathBuf, fallback: FallbackMatching) -> Self {
        Self { path, fallback }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the lock file, returning an empty one when missing or malformed.
    pub fn load(&self) -> LockFile {
        if !self.path.exists() {
            return LockFile::default();
        }
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %self.path.display(), %e, "failed to read lock file, treating as absent");
                return LockFile::default();
            },
        };
        match serde_json::from_str(&raw) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %self.path.display(), %e, "malformed lock file, treating as absent");
                LockFile::default()
            },
        }
    }

    /// Save atomically via temp file + rename.
    pub fn save(&self, file: &LockFile) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let data = serde_json::to_string_pretty(file)?;
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Resolve an entry for a folder name: exact key first, then (when
    /// enabled for this store) the path-suffix fallback. Absence is not an
    /// error; it signals an untracked or custom skill.
    pub fn resolve<'a>(&self, file: &'a LockFile, folder: &str) -> Option<(&'a str, &'a LockEntry)> {
        if let Some((key, entry)) = file.skills.get_key_value(folder) {
            return Some((key.as_str(), entry));
        }
        match self.fallback {
            FallbackMatching::Enabled => file.resolve_by_path(folder),
            FallbackMatching::Disabled => None,
        }
    }

    /// Load and resolve in one step, cloning the entry out.
    pub fn find(&self, folder: &str) -> Option<LockEntry> {
        let file = self.load();
        self.resolve(&file, folder).map(|(_, entry)| entry.clone())
    }

    /// Remove the entry for a folder name, locating it with the same
    /// two-step resolution used for reads. Returns whether an entry was
    /// removed; a missing store or unmatched folder is `Ok(false)`.
    pub fn remove(&self, folder: &str) -> anyhow::Result<bool> {
        let mut file = self.load();
        let Some(key) = self
            .resolve(&file, folder)
            .map(|(key, _)| key.to_string())
        else {
            return Ok(false);
        };
        file.skills.remove(&key);
        self.save(&file)?;
        Ok(true)
    }
}

/// Scope-agnostic resolution ladder: global exact match, global path-suffix
/// fallback, then project exact match. First match wins.
pub fn find_lock_entry(
    global: &LockStore,
    project: &LockStore,
    folder: &str,
) -> Option<LockEntry> {
    global.find(folder).or_else(|| project.find(folder))
}
