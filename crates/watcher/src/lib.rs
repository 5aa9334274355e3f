//! Debounced filesystem watching for skill state.
//!
//! Watches every skill directory for SKILL.md create/modify/delete events and
//! a handful of individual state files (lock files, the project manifest).
//! Bursts of notifications are coalesced by a debounce window into a single
//! change event, so one external command touching many files triggers one
//! rescan.

use std::{
    collections::HashSet,
    path::PathBuf,
    time::Duration,
};

use {
    anyhow::Result,
    notify_debouncer_full::{
        DebounceEventResult, Debouncer, RecommendedCache, new_debouncer,
        notify::{EventKind, RecommendedWatcher, RecursiveMode},
    },
    tokio::sync::mpsc,
    tracing::{debug, info, warn},
};

/// Manifest file name watched one level inside each skill directory.
const MANIFEST_FILE: &str = "SKILL.md";

/// Quiet period a burst of notifications must survive before one change
/// event is emitted.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(300);

/// Event emitted after the debounce window closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeEvent {
    /// Installed-skill state may have changed; a rescan is warranted.
    Changed,
}

/// What to watch: directories (recursively, filtered to SKILL.md) and
/// individual files (matched by exact path, observed via their parent
/// directory so creation and deletion are both seen).
#[derive(Debug, Clone, Default)]
pub struct WatchTargets {
    pub dirs: Vec<PathBuf>,
    pub files: Vec<PathBuf>,
}

/// Watches skill directories and state files with debouncing.
pub struct ChangeWatcher {
    debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

impl ChangeWatcher {
    /// Start watching. Returns the watcher and a receiver for change events.
    ///
    /// The watcher must be kept alive (not dropped) for events to continue.
    /// Targets that do not exist yet are skipped; call [`restart`] once they
    /// appear.
    ///
    /// [`restart`]: ChangeWatcher::restart
    pub fn start(targets: &WatchTargets) -> Result<(Self, mpsc::UnboundedReceiver<ChangeEvent>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let debouncer = spawn_debouncer(targets, tx.clone())?;
        Ok((Self { debouncer, tx }, rx))
    }

    /// Drop every underlying watch handle and re-establish watches against
    /// the given targets. The original receiver keeps working. Safe to call
    /// repeatedly.
    pub fn restart(&mut self, targets: &WatchTargets) -> Result<()> {
        self.debouncer = spawn_debouncer(targets, self.tx.clone())?;
        info!("change watcher restarted");
        Ok(())
    }
}

fn spawn_debouncer(
    targets: &WatchTargets,
    tx: mpsc::UnboundedSender<ChangeEvent>,
) -> Result<Debouncer<RecommendedWatcher, RecommendedCache>> {
    let files: HashSet<PathBuf> = targets.files.iter().cloned().collect();

    let mut debouncer = new_debouncer(
        DEBOUNCE_WINDOW,
        None,
        move |result: DebounceEventResult| match result {
            Ok(events) => {
                let mut changed = false;
                for event in events {
                    if !matches!(
                        event.kind,
                        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                    ) {
                        continue;
                    }
                    for path in &event.paths {
                        let is_manifest =
                            path.file_name().and_then(|n| n.to_str()) == Some(MANIFEST_FILE);
                        if is_manifest || files.contains(path) {
                            debug!(path = %path.display(), "change watcher event");
                            changed = true;
                        }
                    }
                }
                if changed {
                    let _ = tx.send(ChangeEvent::Changed);
                }
            },
            Err(errors) => {
                for e in errors {
                    warn!(error = %e, "change watcher error");
                }
            },
        },
    )?;

    for dir in &targets.dirs {
        if dir.is_dir() {
            debouncer.watch(dir, RecursiveMode::Recursive)?;
            info!(dir = %dir.display(), "watching skill directory");
        }
    }

    // State files are watched through their parent directory so a file that
    // does not exist yet still produces a creation event.
    let mut parents: HashSet<PathBuf> = HashSet::new();
    for file in &targets.files {
        let Some(parent) = file.parent() else {
            continue;
        };
        if parent.is_dir() && parents.insert(parent.to_path_buf()) {
            debouncer.watch(parent, RecursiveMode::NonRecursive)?;
            info!(file = %file.display(), "watching state file");
        }
    }

    Ok(debouncer)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const RECV_TIMEOUT: Duration = Duration::from_secs(5);

    async fn expect_change(rx: &mut mpsc::UnboundedReceiver<ChangeEvent>) {
        let event = tokio::time::timeout(RECV_TIMEOUT, rx.recv())
            .await
            .expect("timed out waiting for change event")
            .expect("watcher channel closed");
        assert_eq!(event, ChangeEvent::Changed);
    }

    #[tokio::test]
    async fn emits_on_manifest_write() {
        let tmp = tempfile::tempdir().unwrap();
        let skills = tmp.path().join("skills");
        std::fs::create_dir_all(skills.join("demo")).unwrap();

        let targets = WatchTargets {
            dirs: vec![skills.clone()],
            files: Vec::new(),
        };
        let (_watcher, mut rx) = ChangeWatcher::start(&targets).unwrap();

        std::fs::write(skills.join("demo/SKILL.md"), "---\nname: demo\n---\n").unwrap();
        expect_change(&mut rx).await;
    }

    #[tokio::test]
    async fn ignores_files_other_than_the_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let skills = tmp.path().join("skills");
        std::fs::create_dir_all(skills.join("demo")).unwrap();

        let targets = WatchTargets {
            dirs: vec![skills.clone()],
            files: Vec::new(),
        };
        let (_watcher, mut rx) = ChangeWatcher::start(&targets).unwrap();

        std::fs::write(skills.join("demo/notes.txt"), "scratch").unwrap();
        tokio::time::sleep(DEBOUNCE_WINDOW * 3).await;
        assert!(rx.try_recv().is_err());

        std::fs::write(skills.join("demo/SKILL.md"), "---\nname: demo\n---\n").unwrap();
        expect_change(&mut rx).await;
    }

    #[tokio::test]
    async fn emits_when_a_watched_state_file_appears() {
        let tmp = tempfile::tempdir().unwrap();
        let lock_path = tmp.path().join("skills-lock.json");

        let targets = WatchTargets {
            dirs: Vec::new(),
            files: vec![lock_path.clone()],
        };
        let (_watcher, mut rx) = ChangeWatcher::start(&targets).unwrap();

        std::fs::write(&lock_path, "{\"version\":1,\"skills\":{}}").unwrap();
        expect_change(&mut rx).await;
    }

    #[tokio::test]
    async fn missing_targets_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let targets = WatchTargets {
            dirs: vec![tmp.path().join("not-yet-created")],
            files: vec![tmp.path().join("nowhere/skills-lock.json")],
        };

        // Starting must succeed even though nothing can be watched yet.
        let (_watcher, mut rx) = ChangeWatcher::start(&targets).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn restart_keeps_the_original_receiver() {
        let tmp = tempfile::tempdir().unwrap();
        let first = tmp.path().join("first");
        let second = tmp.path().join("second");
        std::fs::create_dir_all(first.join("demo")).unwrap();
        std::fs::create_dir_all(second.join("demo")).unwrap();

        let (mut watcher, mut rx) = ChangeWatcher::start(&WatchTargets {
            dirs: vec![first],
            files: Vec::new(),
        })
        .unwrap();

        watcher
            .restart(&WatchTargets {
                dirs: vec![second.clone()],
                files: Vec::new(),
            })
            .unwrap();

        std::fs::write(second.join("demo/SKILL.md"), "---\nname: demo\n---\n").unwrap();
        expect_change(&mut rx).await;
    }
}
