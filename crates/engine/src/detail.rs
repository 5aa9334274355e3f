//! Remote skill detail.
//!
//! Fetches the current SKILL.md straight from the skill's source repository.
//! Requests race: a newer request takes ownership of the result slot, and an
//! older fetch that finishes late is discarded instead of applied.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use {
    anyhow::Context,
    serde::Serialize,
    skillsync_common::{Ttl, TtlCache},
    skillsync_scanner::{InstalledSkill, SkillManifest, parse_skill_file},
    skillsync_updates::GithubClient,
    tracing::debug,
};

/// Remote metadata for one installed skill.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillDetail {
    pub name: String,
    pub folder_name: String,
    pub source: String,
    pub manifest: SkillManifest,
    pub body: String,
}

/// Fetches and caches remote SKILL.md content with supersession: each call
/// takes a generation ticket, and only the holder of the newest ticket may
/// apply its result.
pub struct DetailFetcher {
    github: Arc<GithubClient>,
    cache: TtlCache<String, SkillDetail>,
    ticket: AtomicU64,
}

impl DetailFetcher {
    pub fn new(github: Arc<GithubClient>, ttl: Ttl) -> Self {
        Self {
            github,
            cache: TtlCache::new(ttl),
            ticket: AtomicU64::new(0),
        }
    }

    /// Fetch remote detail for `skill`. `Ok(None)` means there is nothing to
    /// show: the skill has no recorded source, or a newer request superseded
    /// this one while its fetch was in flight.
    pub async fn fetch(&self, skill: &InstalledSkill) -> anyhow::Result<Option<SkillDetail>> {
        let Some(source) = skill.source.as_deref() else {
            debug!(name = %skill.name, "no source recorded, nothing to fetch");
            return Ok(None);
        };

        let ticket = self.ticket.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(cached) = self.cache.get(&skill.folder_name) {
            return Ok(Some(cached));
        }

        let path = manifest_path(skill);
        let text = self
            .github
            .fetch_manifest(source, &path)
            .await
            .with_context(|| format!("fetching SKILL.md for {}", skill.name))?;
        let file = parse_skill_file(&text)?;
        let detail = SkillDetail {
            name: skill.name.clone(),
            folder_name: skill.folder_name.clone(),
            source: source.to_string(),
            manifest: file.manifest,
            body: file.body,
        };

        if self.ticket.load(Ordering::SeqCst) != ticket {
            debug!(name = %skill.name, "detail fetch superseded by a newer request");
            return Ok(None);
        }
        self.cache.set(skill.folder_name.clone(), detail.clone());
        Ok(Some(detail))
    }
}

/// Repository-relative path of the skill's manifest, falling back to the
/// conventional `skills/<folder>/SKILL.md` layout.
fn manifest_path(skill: &InstalledSkill) -> String {
    match &skill.skill_path {
        Some(p) => p.clone(),
        None => format!("skills/{}/SKILL.md", skill.folder_name),
    }
}
