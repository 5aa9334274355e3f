use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One record in a lock store, keyed by a skill identifier.
///
/// The global store records `skillFolderHash`; the project store records
/// `computedHash`. Both map to the same concept and [`LockEntry::hash`]
/// returns whichever is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockEntry {
    pub source: String,
    #[serde(default = "default_source_type")]
    pub source_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill_folder_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computed_hash: Option<String>,
    /// Repository-relative path to the skill's manifest file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill_path: Option<String>,
}

fn default_source_type() -> String {
    "github".into()
}

impl LockEntry {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            source_type: default_source_type(),
            skill_folder_hash: None,
            computed_hash: None,
            skill_path: None,
        }
    }

    /// Content hash regardless of which store the entry came from.
    pub fn hash(&self) -> Option<&str> {
        self.skill_folder_hash
            .as_deref()
            .or(self.computed_hash.as_deref())
    }

    /// The folder name implied by `skill_path`, i.e. the name of the
    /// directory directly containing the manifest file.
    pub fn skill_path_folder(&self) -> Option<&str> {
        let dir = self
            .skill_path
            .as_deref()?
            .trim_end_matches('/')
            .strip_suffix("SKILL.md")?
            .trim_end_matches('/');
        if dir.is_empty() {
            return None;
        }
        dir.rsplit('/').next()
    }
}

/// In-memory form of a `skills-lock.json` file.
///
/// Entries live in a `BTreeMap` so the path-suffix fallback scan visits them
/// in key order, making "first match wins" deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockFile {
    pub version: u32,
    #[serde(default)]
    pub skills: BTreeMap<String, LockEntry>,
}

impl Default for LockFile {
    fn default() -> Self {
        Self {
            version: 1,
            skills: BTreeMap::new(),
        }
    }
}

impl LockFile {
    /// Exact key lookup.
    pub fn get(&self, folder: &str) -> Option<&LockEntry> {
        self.skills.get(folder)
    }

    /// Path-suffix fallback: the first entry (in key order) whose
    /// `skill_path` parent directory name equals `folder`.
    pub fn resolve_by_path(&self, folder: &str) -> Option<(&str, &LockEntry)> {
        self.skills
            .iter()
            .find(|(_, entry)| entry.skill_path_folder() == Some(folder))
            .map(|(key, entry)| (key.as_str(), entry))
    }

    pub fn insert(&mut self, key: impl Into<String>, entry: LockEntry) {
        self.skills.insert(key.into(), entry);
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn entry_with_path(source: &str, skill_path: &str) -> LockEntry {
        LockEntry {
            skill_path: Some(skill_path.into()),
            ..LockEntry::new(source)
        }
    }

    #[test]
    fn hash_prefers_skill_folder_hash() {
        let entry = LockEntry {
            skill_folder_hash: Some("abc".into()),
            computed_hash: Some("def".into()),
            ..LockEntry::new("owner/repo")
        };
        assert_eq!(entry.hash(), Some("abc"));

        let project_entry = LockEntry {
            computed_hash: Some("def".into()),
            ..LockEntry::new("owner/repo")
        };
        assert_eq!(project_entry.hash(), Some("def"));
    }

    #[test]
    fn skill_path_folder_strips_manifest_name() {
        let entry = entry_with_path("o/r", "skills/react-skill/SKILL.md");
        assert_eq!(entry.skill_path_folder(), Some("react-skill"));

        let single = entry_with_path("o/r", "react-skill/SKILL.md");
        assert_eq!(single.skill_path_folder(), Some("react-skill"));

        // Root-level manifest has no parent folder to match against.
        let root = entry_with_path("o/r", "SKILL.md");
        assert_eq!(root.skill_path_folder(), None);

        let no_path = LockEntry::new("o/r");
        assert_eq!(no_path.skill_path_folder(), None);
    }

    #[test]
    fn resolve_by_path_is_first_match_in_key_order() {
        let mut file = LockFile::default();
        // Both entries point at a folder named "tool"; key order decides.
        file.insert("zeta", entry_with_path("o/zeta", "skills/tool/SKILL.md"));
        file.insert("alpha", entry_with_path("o/alpha", "other/tool/SKILL.md"));

        let (key, entry) = file.resolve_by_path("tool").unwrap();
        assert_eq!(key, "alpha");
        assert_eq!(entry.source, "o/alpha");
    }

    #[test]
    fn lock_file_round_trips_camel_case() {
        let raw = r#"{
            "version": 1,
            "skills": {
                "react-skill": {
                    "source": "owner/repo",
                    "sourceType": "github",
                    "skillFolderHash": "abc123",
                    "skillPath": "skills/react-skill/SKILL.md"
                }
            }
        }"#;
        let file: LockFile = serde_json::from_str(raw).unwrap();
        let entry = file.get("react-skill").unwrap();
        assert_eq!(entry.source, "owner/repo");
        assert_eq!(entry.hash(), Some("abc123"));

        let out = serde_json::to_string(&file).unwrap();
        assert!(out.contains("skillFolderHash"));
        assert!(out.contains("sourceType"));
        assert!(!out.contains("computedHash"), "absent fields stay absent");
    }
}
