//! Engine configuration.
//!
//! Settings live in `skillsync.toml`, looked up in the project root first and
//! the user config directory (`~/.config/skillsync/`) second. A missing or
//! malformed file never fails engine construction; it degrades to defaults.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use {
    serde::{Deserialize, Serialize},
    skillsync_scanner::{SkillPaths, SkillScope},
    tracing::{debug, warn},
};

const CONFIG_FILE: &str = "skillsync.toml";

const DEFAULT_DETAIL_TTL_SECS: u64 = 300;

/// Engine settings. Every field has a default so partial config files work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Project root to scan and watch; callers may override it per run.
    pub project_root: Option<PathBuf>,
    /// Home directory override, mainly for unusual setups.
    pub home: Option<PathBuf>,
    /// Scope applied to operations that do not specify one.
    pub default_scope: SkillScope,
    /// How long a fetched remote skill manifest stays cached, in seconds.
    pub detail_ttl_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            project_root: None,
            home: None,
            default_scope: SkillScope::Global,
            detail_ttl_secs: DEFAULT_DETAIL_TTL_SECS,
        }
    }
}

impl EngineConfig {
    /// Load config from the standard locations, falling back to defaults.
    pub fn discover(project_root: Option<&Path>) -> Self {
        let Some(path) = find_config_file(project_root) else {
            debug!("no config file found, using defaults");
            return Self::default();
        };
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                Self::default()
            },
        }
    }

    /// Resolve the physical skill roots this configuration describes. An
    /// explicit `project_root` argument wins over the configured one.
    pub fn paths(&self, project_root: Option<&Path>) -> anyhow::Result<SkillPaths> {
        let root = project_root.or(self.project_root.as_deref());
        match &self.home {
            Some(home) => Ok(SkillPaths::rooted(home, root)),
            None => SkillPaths::discover(root),
        }
    }

    pub fn detail_ttl(&self) -> Duration {
        Duration::from_secs(self.detail_ttl_secs)
    }
}

/// Parse the config file at `path`.
pub fn load_config(path: &Path) -> anyhow::Result<EngineConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    Ok(toml::from_str(&raw)?)
}

/// First config file found, project root before user config directory.
fn find_config_file(project_root: Option<&Path>) -> Option<PathBuf> {
    if let Some(root) = project_root {
        let p = root.join(CONFIG_FILE);
        if p.exists() {
            return Some(p);
        }
    }
    if let Some(dirs) = directories::ProjectDirs::from("", "", "skillsync") {
        let p = dirs.config_dir().join(CONFIG_FILE);
        if p.exists() {
            return Some(p);
        }
    }
    None
}
