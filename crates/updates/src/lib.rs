//! Remote update detection for installed skills.
//!
//! Skills are grouped by source repository; each repository's file tree is
//! fetched once per check (branch fallback, short-lived cache), the current
//! hash of every folder directly containing a SKILL.md is derived from it,
//! and every skill whose stored hash drifted produces an update record.

pub mod checker;
pub mod github;

pub use {
    checker::{UpdateCheckResponse, UpdateChecker, UpdateRecord},
    github::{GithubClient, RepoTree, TreeNode, UpdateError, parse_source},
};
