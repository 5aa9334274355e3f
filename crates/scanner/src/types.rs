//! Scan output types.

use {
    serde::{Deserialize, Serialize},
    std::{
        collections::{BTreeMap, HashSet},
        path::PathBuf,
    },
};

/// Which skill root a skill was discovered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillScope {
    Global,
    Project,
}

impl SkillScope {
    pub fn is_global(self) -> bool {
        matches!(self, SkillScope::Global)
    }
}

impl std::fmt::Display for SkillScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkillScope::Global => write!(f, "global"),
            SkillScope::Project => write!(f, "project"),
        }
    }
}

/// One discovered skill, rebuilt from disk on every scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledSkill {
    /// Display name from the manifest frontmatter.
    pub name: String,
    /// Directory name; the identity key used against the lock files.
    pub folder_name: String,
    #[serde(default)]
    pub description: String,
    /// Absolute path of the skill directory.
    pub path: PathBuf,
    pub scope: SkillScope,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_yaml::Value>,
    /// Repository the skill was installed from, when tracked by a lock file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Last known content hash from the lock file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Path of the skill folder inside the source repository.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skill_path: Option<String>,
    /// True for a real directory with no lock entry: authored locally, never
    /// offered updates.
    #[serde(default)]
    pub is_custom: bool,
}

impl InstalledSkill {
    /// Tracked skills have a lock entry and participate in update checks.
    pub fn is_tracked(&self) -> bool {
        self.source.is_some()
    }
}

/// Complete result of one scan pass. Replaces any previous result wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub global_skills: Vec<InstalledSkill>,
    pub project_skills: Vec<InstalledSkill>,
}

impl ScanResult {
    pub fn is_empty(&self) -> bool {
        self.global_skills.is_empty() && self.project_skills.is_empty()
    }

    pub fn len(&self) -> usize {
        self.global_skills.len() + self.project_skills.len()
    }

    /// Global skills first, then project skills, each in scan order.
    pub fn iter(&self) -> impl Iterator<Item = &InstalledSkill> {
        self.global_skills.iter().chain(self.project_skills.iter())
    }

    /// Every name an installed skill answers to, both display and folder
    /// names. Completion detection matches requested skill names against
    /// this set, and callers use whichever key they have.
    pub fn installed_names(&self) -> HashSet<String> {
        let mut names = HashSet::with_capacity(self.len() * 2);
        for skill in self.iter() {
            names.insert(skill.name.clone());
            names.insert(skill.folder_name.clone());
        }
        names
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn skill(name: &str, folder: &str, scope: SkillScope) -> InstalledSkill {
        InstalledSkill {
            name: name.into(),
            folder_name: folder.into(),
            description: String::new(),
            path: PathBuf::from(format!("/tmp/{folder}")),
            scope,
            metadata: BTreeMap::new(),
            source: None,
            hash: None,
            skill_path: None,
            is_custom: false,
        }
    }

    #[test]
    fn installed_names_covers_display_and_folder_names() {
        let result = ScanResult {
            global_skills: vec![skill("Code Review", "code-review", SkillScope::Global)],
            project_skills: vec![skill("linter", "linter", SkillScope::Project)],
        };

        let names = result.installed_names();
        assert!(names.contains("Code Review"));
        assert!(names.contains("code-review"));
        assert!(names.contains("linter"));
        assert_eq!(names.len(), 3);
    }

    #[test]
    fn iter_yields_global_before_project() {
        let result = ScanResult {
            global_skills: vec![skill("a", "a", SkillScope::Global)],
            project_skills: vec![skill("b", "b", SkillScope::Project)],
        };

        let scopes: Vec<_> = result.iter().map(|s| s.scope).collect();
        assert_eq!(scopes, vec![SkillScope::Global, SkillScope::Project]);
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let mut entry = skill("fmt", "fmt", SkillScope::Global);
        entry.is_custom = true;

        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"folderName\":\"fmt\""));
        assert!(json.contains("\"isCustom\":true"));
        assert!(json.contains("\"scope\":\"global\""));
        assert!(!json.contains("source"));
    }
}
