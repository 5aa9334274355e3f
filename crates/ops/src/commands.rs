//! Command lines for the external skill package manager.

use std::collections::HashSet;

/// One skill in an update batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateTarget {
    pub name: String,
    pub source: String,
    pub global: bool,
}

/// One external mutation handed to a terminal. Every generated line carries
/// `-y` so nothing prompts once the user has already confirmed intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkillOperation {
    Install {
        name: String,
        source: String,
        global: bool,
    },
    /// Remove-then-add per skill, all lines sent to one terminal.
    Update { targets: Vec<UpdateTarget> },
    Uninstall { name: String, global: bool },
}

impl SkillOperation {
    /// The exact lines to send, in dispatch order.
    pub fn command_lines(&self) -> Vec<String> {
        match self {
            Self::Install {
                name,
                source,
                global,
            } => vec![install_line(source, name, *global)],
            Self::Update { targets } => targets
                .iter()
                .flat_map(|t| {
                    [
                        uninstall_line(&t.name, t.global),
                        install_line(&t.source, &t.name, t.global),
                    ]
                })
                .collect(),
            Self::Uninstall { name, global } => vec![uninstall_line(name, *global)],
        }
    }

    /// Shell exits that must be observed before the operation counts as done
    /// through the explicit signal.
    pub fn expected_exits(&self) -> usize {
        match self {
            Self::Install { .. } | Self::Uninstall { .. } => 1,
            Self::Update { targets } => targets.len() * 2,
        }
    }

    /// Whether a set of changed skill names satisfies the inferred completion
    /// signal. A single install requires its own name; a batch or an
    /// uninstall is satisfied by any observed change.
    pub fn matches_detection(&self, names: &HashSet<String>) -> bool {
        match self {
            Self::Install { name, .. } => names.contains(name),
            Self::Update { .. } | Self::Uninstall { .. } => !names.is_empty(),
        }
    }

    /// Skill names the operation touches; used to prune stale update flags
    /// once the operation completes.
    pub fn skill_names(&self) -> Vec<&str> {
        match self {
            Self::Install { name, .. } | Self::Uninstall { name, .. } => vec![name.as_str()],
            Self::Update { targets } => targets.iter().map(|t| t.name.as_str()).collect(),
        }
    }
}

impl std::fmt::Display for SkillOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Install { name, .. } => write!(f, "install {name}"),
            Self::Update { targets } if targets.len() == 1 => {
                write!(f, "update {}", targets[0].name)
            },
            Self::Update { targets } => write!(f, "update {} skills", targets.len()),
            Self::Uninstall { name, .. } => write!(f, "uninstall {name}"),
        }
    }
}

fn install_line(source: &str, name: &str, global: bool) -> String {
    format!(
        "npx skills add {source} --skill {name}{} -y",
        scope_flag(global)
    )
}

fn uninstall_line(name: &str, global: bool) -> String {
    format!("npx skills remove {name}{} -y", scope_flag(global))
}

fn scope_flag(global: bool) -> &'static str {
    if global { " -g" } else { "" }
}
