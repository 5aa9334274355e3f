//! Ties the skillsync crates together: one owned [`SkillEngine`] holds the
//! scanner, update checker, change watcher, and operation tracker, keeps the
//! current [`ScanResult`](skillsync_scanner::ScanResult) snapshot, and runs
//! the background loops that funnel filesystem changes and operation
//! completions back into rescans.

pub mod config;
pub mod detail;
pub mod service;

pub use {
    config::EngineConfig,
    detail::SkillDetail,
    service::{SkillEngine, SkillsChanged},
};
