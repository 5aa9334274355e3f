//! Batch hash-diff against remote trees, one fetch per source repository.

use {
    serde::Serialize,
    skillsync_common::{SingleCache, Ttl},
    skillsync_scanner::{InstalledSkill, manifest::MANIFEST_FILE},
    std::{collections::HashMap, sync::Arc},
    tracing::{debug, info, warn},
};

use crate::github::GithubClient;

/// Folder assumed to hold a skill when its lock entry recorded no path.
const DEFAULT_SKILL_PARENT: &str = "skills";

/// One skill whose remote folder hash no longer matches the installed hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRecord {
    pub name: String,
    pub source: String,
    pub new_hash: String,
}

/// Outcome of one update check, replaced wholesale on every run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCheckResponse {
    pub updates: Vec<UpdateRecord>,
    /// Kept for consumers that render a failure list. Sources that fail to
    /// fetch are logged and skipped rather than reported here.
    pub errors: Vec<String>,
}

/// Compares installed skill hashes against their source repositories and
/// owns the last known result.
pub struct UpdateChecker {
    github: Arc<GithubClient>,
    last: SingleCache<UpdateCheckResponse>,
}

impl UpdateChecker {
    pub fn new(github: Arc<GithubClient>) -> Self {
        Self {
            github,
            last: SingleCache::new(Ttl::never()),
        }
    }

    /// Check every skill that has both a source and a stored hash. Skills
    /// sharing a source trigger a single tree fetch. A source that cannot be
    /// fetched contributes nothing; the check only fails when no source could
    /// be reached at all. The result replaces the last known response.
    pub async fn check(&self, skills: &[InstalledSkill]) -> anyhow::Result<UpdateCheckResponse> {
        let mut folder_hashes: HashMap<String, Option<HashMap<String, String>>> = HashMap::new();
        let mut updates = Vec::new();
        let mut had_candidates = false;

        for skill in skills {
            let (source, hash) = match (skill.source.as_deref(), skill.hash.as_deref()) {
                (Some(s), Some(h)) => (s, h),
                _ => continue,
            };
            had_candidates = true;

            if !folder_hashes.contains_key(source) {
                let fetched = match self.github.fetch_tree(source).await {
                    Ok(tree) => Some(tree.manifest_folder_hashes()),
                    Err(e) => {
                        warn!(%source, %e, "tree fetch failed, source skipped");
                        None
                    },
                };
                folder_hashes.insert(source.to_string(), fetched);
            }
            let hashes = match folder_hashes.get(source).and_then(|h| h.as_ref()) {
                Some(h) => h,
                None => continue,
            };

            let folder = expected_folder(skill);
            match hashes.get(&folder) {
                Some(new_hash) if new_hash != hash => updates.push(UpdateRecord {
                    name: skill.name.clone(),
                    source: source.to_string(),
                    new_hash: new_hash.clone(),
                }),
                Some(_) => {},
                None => {
                    debug!(name = %skill.name, %source, %folder, "expected folder not in remote tree");
                },
            }
        }

        if had_candidates && folder_hashes.values().all(Option::is_none) {
            anyhow::bail!("update check failed: no source repository could be fetched");
        }

        info!(
            checked = skills.len(),
            sources = folder_hashes.len(),
            updates = updates.len(),
            "update check complete"
        );
        let response = UpdateCheckResponse {
            updates,
            errors: Vec::new(),
        };
        self.last.set(response.clone());
        Ok(response)
    }

    /// Last known response, if any check has completed.
    pub fn last_known(&self) -> Option<UpdateCheckResponse> {
        self.last.get()
    }

    /// Drop one skill from the last known response, preserving the order of
    /// the rest. Used right after that skill is reinstalled so a stale flag
    /// does not linger until the next full check.
    pub fn clear_update(&self, name: &str) {
        if let Some(mut response) = self.last.get() {
            response.updates.retain(|u| u.name != name);
            self.last.set(response);
        }
    }
}

/// Repository folder expected to hold the skill: the recorded skill path with
/// the manifest filename stripped, or `skills/<folderName>` when the lock
/// entry recorded no path.
fn expected_folder(skill: &InstalledSkill) -> String {
    let Some(path) = skill.skill_path.as_deref() else {
        return format!("{DEFAULT_SKILL_PARENT}/{}", skill.folder_name);
    };
    if path == MANIFEST_FILE {
        return String::new();
    }
    let nested_suffix = format!("/{MANIFEST_FILE}");
    match path.strip_suffix(&nested_suffix) {
        Some(folder) => folder.to_string(),
        None => path.trim_end_matches('/').to_string(),
    }
}
