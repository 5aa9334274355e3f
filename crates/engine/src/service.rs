//! The engine proper: one owned composition of scanner, update checker,
//! change watcher, and operation tracker around a shared scan snapshot.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    skillsync_common::{EventChannel, Ttl},
    skillsync_ops::{
        OperationCompleted, OperationTracker, SkillOperation, Terminal, TrackerTiming, UpdateTarget,
    },
    skillsync_scanner::{InstalledSkill, ScanDiagnostics, ScanResult, SkillPaths, SkillScanner},
    skillsync_updates::{GithubClient, UpdateChecker, UpdateCheckResponse},
    skillsync_watcher::{ChangeWatcher, WatchTargets},
    tokio::{
        sync::{Mutex, broadcast},
        task::JoinHandle,
    },
    tracing::{debug, info, warn},
};

use crate::{
    config::EngineConfig,
    detail::{DetailFetcher, SkillDetail},
};

/// Published whenever a rescan changes the installed skill set. `names`
/// carries both display and folder names of everything that appeared,
/// disappeared, or changed identity.
#[derive(Debug, Clone)]
pub struct SkillsChanged {
    pub names: HashSet<String>,
}

/// Owns every moving part of the skill system and the current snapshot.
///
/// All state mutation funnels through [`SkillEngine::rescan`]: watcher events,
/// operation completions, and direct calls all end up there, and the snapshot
/// is replaced wholesale each time.
pub struct SkillEngine {
    config: EngineConfig,
    scanner: SkillScanner,
    checker: UpdateChecker,
    tracker: OperationTracker,
    details: DetailFetcher,
    detail_ttl: Arc<AtomicU64>,
    snapshot: RwLock<ScanResult>,
    skills_changed: EventChannel<SkillsChanged>,
    watcher: Mutex<Option<ChangeWatcher>>,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

impl SkillEngine {
    pub fn new(paths: SkillPaths, config: EngineConfig) -> Arc<Self> {
        Self::with_parts(
            paths,
            config,
            Arc::new(GithubClient::new()),
            TrackerTiming::default(),
        )
    }

    /// Full constructor. Tests inject a mock GitHub client and short timings.
    pub fn with_parts(
        paths: SkillPaths,
        config: EngineConfig,
        github: Arc<GithubClient>,
        timing: TrackerTiming,
    ) -> Arc<Self> {
        let detail_ttl = Arc::new(AtomicU64::new(config.detail_ttl_secs));
        let ttl_source = Arc::clone(&detail_ttl);
        let ttl = Ttl::dynamic(move || Duration::from_secs(ttl_source.load(Ordering::Relaxed)));

        Arc::new(Self {
            config,
            scanner: SkillScanner::new(paths),
            checker: UpdateChecker::new(Arc::clone(&github)),
            tracker: OperationTracker::new(timing),
            details: DetailFetcher::new(github, ttl),
            detail_ttl,
            snapshot: RwLock::new(ScanResult::default()),
            skills_changed: EventChannel::default(),
            watcher: Mutex::new(None),
            loops: Mutex::new(Vec::new()),
        })
    }

    pub fn paths(&self) -> &SkillPaths {
        self.scanner.paths()
    }

    pub fn tracker(&self) -> &OperationTracker {
        &self.tracker
    }

    /// Clone of the current snapshot.
    pub fn snapshot(&self) -> ScanResult {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Display and folder names of everything currently installed.
    pub fn installed_names(&self) -> HashSet<String> {
        self.snapshot().installed_names()
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<SkillsChanged> {
        self.skills_changed.subscribe()
    }

    /// Change how long fetched skill details stay cached. Takes effect on the
    /// next lookup; nothing is recreated.
    pub fn set_detail_ttl(&self, secs: u64) {
        self.detail_ttl.store(secs, Ordering::Relaxed);
    }

    pub fn diagnose(&self) -> ScanDiagnostics {
        self.scanner.diagnose()
    }

    /// Scan all skill roots and replace the snapshot wholesale. Anything that
    /// changed feeds the completion tracker and the `skills_changed` event.
    pub fn rescan(&self) -> ScanResult {
        let fresh = self.scanner.scan();
        let previous = {
            let mut snapshot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *snapshot, fresh.clone())
        };

        let changed = diff_names(&previous, &fresh);
        if !changed.is_empty() {
            debug!(changed = changed.len(), "rescan detected changes");
            self.tracker.notify_skills_detected(changed.clone());
            self.skills_changed.publish(SkillsChanged { names: changed });
        }
        fresh
    }

    /// Check every tracked skill in the current snapshot for remote updates.
    pub async fn check_updates(&self) -> anyhow::Result<UpdateCheckResponse> {
        let snapshot = self.snapshot();
        let skills: Vec<InstalledSkill> = snapshot.iter().cloned().collect();
        self.checker.check(&skills).await
    }

    pub fn last_update_check(&self) -> Option<UpdateCheckResponse> {
        self.checker.last_known()
    }

    pub fn clear_update(&self, name: &str) {
        self.checker.clear_update(name);
    }

    /// Dispatch an install through `terminal`. Returns the operation id.
    pub async fn install(
        &self,
        terminal: &dyn Terminal,
        name: &str,
        source: &str,
        global: Option<bool>,
    ) -> anyhow::Result<u64> {
        let global = global.unwrap_or_else(|| self.config.default_scope.is_global());
        let operation = SkillOperation::Install {
            name: name.to_string(),
            source: source.to_string(),
            global,
        };
        self.tracker.dispatch(terminal, operation).await
    }

    /// Dispatch an uninstall. Without an explicit scope the installed skill's
    /// own scope is used.
    pub async fn uninstall(
        &self,
        terminal: &dyn Terminal,
        name: &str,
        global: Option<bool>,
    ) -> anyhow::Result<u64> {
        let global = global.unwrap_or_else(|| {
            self.find_skill(name)
                .map(|s| s.scope.is_global())
                .unwrap_or_else(|| self.config.default_scope.is_global())
        });
        let operation = SkillOperation::Uninstall {
            name: name.to_string(),
            global,
        };
        self.tracker.dispatch(terminal, operation).await
    }

    /// Update every skill the last check flagged, as one batched operation.
    /// Returns `None` when there is nothing to update.
    pub async fn update_all(&self, terminal: &dyn Terminal) -> anyhow::Result<Option<u64>> {
        let Some(check) = self.checker.last_known() else {
            return Ok(None);
        };
        if check.updates.is_empty() {
            return Ok(None);
        }

        let snapshot = self.snapshot();
        let targets = check
            .updates
            .iter()
            .map(|update| {
                let installed = snapshot
                    .iter()
                    .find(|s| s.name == update.name || s.folder_name == update.name);
                UpdateTarget {
                    // The external CLI addresses skills by folder name.
                    name: installed
                        .map(|s| s.folder_name.clone())
                        .unwrap_or_else(|| update.name.clone()),
                    source: update.source.clone(),
                    global: installed
                        .map(|s| s.scope.is_global())
                        .unwrap_or_else(|| self.config.default_scope.is_global()),
                }
            })
            .collect();

        let id = self
            .tracker
            .dispatch(terminal, SkillOperation::Update { targets })
            .await?;
        Ok(Some(id))
    }

    /// Remote metadata for one installed skill. `Ok(None)` when the skill is
    /// custom or the request was superseded by a newer one.
    pub async fn skill_detail(&self, name: &str) -> anyhow::Result<Option<SkillDetail>> {
        let Some(skill) = self.find_skill(name) else {
            anyhow::bail!("no installed skill named {name}");
        };
        self.details.fetch(&skill).await
    }

    /// Initial scan plus the two background loops: filesystem changes and
    /// operation completions, both funneling into [`SkillEngine::rescan`].
    pub async fn start(self: &Arc<Self>) -> anyhow::Result<()> {
        self.rescan();

        let targets = self.watch_targets();
        let (watcher, mut events) = ChangeWatcher::start(&targets)?;
        *self.watcher.lock().await = Some(watcher);

        let engine = Arc::clone(self);
        let watch_loop = tokio::spawn(async move {
            while events.recv().await.is_some() {
                // Collapse a burst of events into one rescan.
                while events.try_recv().is_ok() {}
                engine.rescan();
            }
            debug!("watch loop ended");
        });

        let engine = Arc::clone(self);
        let mut completions = self.tracker.completions();
        let completion_loop = tokio::spawn(async move {
            loop {
                match completions.recv().await {
                    Ok(done) => engine.operation_completed(&done).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "completion events lagged");
                    },
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        self.loops
            .lock()
            .await
            .extend([watch_loop, completion_loop]);
        info!("engine started");
        Ok(())
    }

    /// Stop the background loops and drop all filesystem watches.
    pub async fn stop(&self) {
        for handle in self.loops.lock().await.drain(..) {
            handle.abort();
        }
        *self.watcher.lock().await = None;
        info!("engine stopped");
    }

    /// Re-establish filesystem watches, e.g. after the project root changed.
    pub async fn rewatch(&self) -> anyhow::Result<()> {
        let targets = self.watch_targets();
        if let Some(watcher) = self.watcher.lock().await.as_mut() {
            watcher.restart(&targets)?;
        }
        Ok(())
    }

    async fn operation_completed(&self, done: &OperationCompleted) {
        info!(
            id = done.operation_id,
            operation = %done.operation,
            signal = ?done.signal,
            "operation finished"
        );
        self.rescan();
        // Prune stale flags first so a failed refresh cannot resurrect them.
        for name in done.operation.skill_names() {
            self.clear_update(name);
        }
        if let Err(e) = self.check_updates().await {
            warn!(error = %e, "update refresh after operation failed");
        }
    }

    fn find_skill(&self, name: &str) -> Option<InstalledSkill> {
        let snapshot = self.snapshot.read().unwrap_or_else(PoisonError::into_inner);
        snapshot
            .iter()
            .find(|s| s.name == name || s.folder_name == name)
            .cloned()
    }

    fn watch_targets(&self) -> WatchTargets {
        WatchTargets {
            dirs: self.paths().watch_dirs(),
            files: self.paths().watch_files(),
        }
    }
}

/// Names that differ between two scans: anything added, removed, or whose
/// identity (path, hash, source) changed. Both display and folder names are
/// included so install detection can match either.
fn diff_names(before: &ScanResult, after: &ScanResult) -> HashSet<String> {
    let mut changed = HashSet::new();
    let index: HashMap<_, _> = before
        .iter()
        .map(|s| ((s.scope, s.folder_name.as_str()), s))
        .collect();

    let mut seen = HashSet::new();
    for skill in after.iter() {
        let key = (skill.scope, skill.folder_name.as_str());
        seen.insert(key);
        match index.get(&key) {
            Some(old) if **old == *skill => {},
            _ => {
                changed.insert(skill.name.clone());
                changed.insert(skill.folder_name.clone());
            },
        }
    }
    for (key, skill) in index {
        if !seen.contains(&key) {
            changed.insert(skill.name.clone());
            changed.insert(skill.folder_name.clone());
        }
    }
    changed
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        async_trait::async_trait,
        skillsync_ops::{CompletionSignal, TerminalId},
        std::{path::Path, sync::Mutex as StdMutex},
    };

    const RECV_TIMEOUT: Duration = Duration::from_secs(10);

    struct RecordingTerminal {
        id: TerminalId,
        lines: StdMutex<Vec<String>>,
    }

    impl RecordingTerminal {
        fn new(id: TerminalId) -> Self {
            Self {
                id,
                lines: StdMutex::new(Vec::new()),
            }
        }

        fn lines(&self) -> Vec<String> {
            self.lines.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Terminal for RecordingTerminal {
        fn id(&self) -> TerminalId {
            self.id
        }

        async fn dispatch(&self, line: &str) -> anyhow::Result<()> {
            self.lines.lock().unwrap().push(line.to_string());
            Ok(())
        }
    }

    fn write_skill(skills_dir: &Path, folder: &str) {
        let dir = skills_dir.join(folder);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("SKILL.md"),
            format!("---\nname: {folder}\ndescription: test skill\n---\nBody\n"),
        )
        .unwrap();
    }

    fn write_global_lock(home: &Path, folder: &str, hash: &str) {
        std::fs::create_dir_all(home.join(".agents")).unwrap();
        std::fs::write(
            home.join(".agents/skills-lock.json"),
            format!(
                concat!(
                    "{{\"version\":1,\"skills\":{{\"{folder}\":{{",
                    "\"source\":\"owner/repo\",\"sourceType\":\"github\",",
                    "\"skillFolderHash\":\"{hash}\",",
                    "\"skillPath\":\"skills/{folder}/SKILL.md\"}}}}}}"
                ),
                folder = folder,
                hash = hash,
            ),
        )
        .unwrap();
    }

    fn offline_engine(home: &Path) -> Arc<SkillEngine> {
        let github = Arc::new(GithubClient::with_base_urls(
            "http://127.0.0.1:1",
            "http://127.0.0.1:1",
        ));
        SkillEngine::with_parts(
            SkillPaths::rooted(home, None),
            EngineConfig::default(),
            github,
            TrackerTiming {
                timeout: Duration::from_secs(10),
                min_progress: Duration::ZERO,
            },
        )
    }

    #[tokio::test]
    async fn rescan_publishes_only_real_changes() {
        let home = tempfile::tempdir().unwrap();
        write_skill(&home.path().join(".agents/skills"), "alpha");
        let engine = offline_engine(home.path());
        let mut changes = engine.subscribe_changes();

        engine.rescan();
        assert!(changes.try_recv().unwrap().names.contains("alpha"));

        // A rescan with nothing changed publishes nothing.
        engine.rescan();
        assert!(changes.try_recv().is_err());

        write_skill(&home.path().join(".agents/skills"), "beta");
        engine.rescan();
        let event = changes.try_recv().unwrap();
        assert!(event.names.contains("beta"));
        assert!(!event.names.contains("alpha"));

        assert_eq!(engine.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn rescan_reports_identity_changes() {
        let home = tempfile::tempdir().unwrap();
        write_skill(&home.path().join(".agents/skills"), "alpha");
        write_global_lock(home.path(), "alpha", "h1");
        let engine = offline_engine(home.path());
        let mut changes = engine.subscribe_changes();

        engine.rescan();
        assert!(changes.try_recv().unwrap().names.contains("alpha"));

        // Same skill, new recorded hash: still a change.
        write_global_lock(home.path(), "alpha", "h2");
        engine.rescan();
        assert!(changes.try_recv().unwrap().names.contains("alpha"));
    }

    #[tokio::test]
    async fn uninstall_uses_the_installed_scope() {
        let home = tempfile::tempdir().unwrap();
        write_skill(&home.path().join(".agents/skills"), "alpha");
        let engine = offline_engine(home.path());
        engine.rescan();

        let terminal = RecordingTerminal::new(1);
        engine
            .uninstall(&terminal, "alpha", None)
            .await
            .unwrap();
        assert_eq!(terminal.lines(), ["npx skills remove alpha -g -y"]);

        // An explicit scope wins over the installed one.
        let terminal = RecordingTerminal::new(2);
        engine
            .uninstall(&terminal, "alpha", Some(false))
            .await
            .unwrap();
        assert_eq!(terminal.lines(), ["npx skills remove alpha -y"]);
    }

    #[tokio::test]
    async fn install_defaults_to_the_configured_scope() {
        let home = tempfile::tempdir().unwrap();
        let engine = offline_engine(home.path());

        let terminal = RecordingTerminal::new(3);
        engine
            .install(&terminal, "fresh", "owner/repo", None)
            .await
            .unwrap();
        assert_eq!(
            terminal.lines(),
            ["npx skills add owner/repo --skill fresh -g -y"]
        );
    }

    #[tokio::test]
    async fn update_all_with_nothing_flagged_is_a_noop() {
        let home = tempfile::tempdir().unwrap();
        let engine = offline_engine(home.path());

        let terminal = RecordingTerminal::new(4);
        assert!(engine.update_all(&terminal).await.unwrap().is_none());
        assert!(terminal.lines().is_empty());
    }

    #[tokio::test]
    async fn update_all_batches_flagged_skills() {
        let home = tempfile::tempdir().unwrap();
        write_skill(&home.path().join(".agents/skills"), "alpha");
        write_global_lock(home.path(), "alpha", "old");

        let mut server = mockito::Server::new_async().await;
        let _tree = server
            .mock("GET", "/repos/owner/repo/git/trees/main?recursive=1")
            .with_status(200)
            .with_body(
                "{\"sha\":\"root\",\"tree\":[\
                 {\"path\":\"skills/alpha\",\"type\":\"tree\",\"sha\":\"new\"},\
                 {\"path\":\"skills/alpha/SKILL.md\",\"type\":\"blob\",\"sha\":\"b\"}]}",
            )
            .create_async()
            .await;

        let github = Arc::new(GithubClient::with_base_urls(server.url(), server.url()));
        let engine = SkillEngine::with_parts(
            SkillPaths::rooted(home.path(), None),
            EngineConfig::default(),
            github,
            TrackerTiming {
                timeout: Duration::from_secs(10),
                min_progress: Duration::ZERO,
            },
        );
        engine.rescan();

        let check = engine.check_updates().await.unwrap();
        assert_eq!(check.updates.len(), 1);
        assert_eq!(engine.last_update_check().unwrap(), check);

        let terminal = RecordingTerminal::new(5);
        let id = engine.update_all(&terminal).await.unwrap();
        assert!(id.is_some());
        assert_eq!(
            terminal.lines(),
            [
                "npx skills remove alpha -g -y",
                "npx skills add owner/repo --skill alpha -g -y",
            ]
        );
    }

    #[tokio::test]
    async fn skill_detail_for_unknown_name_is_an_error() {
        let home = tempfile::tempdir().unwrap();
        let engine = offline_engine(home.path());
        engine.rescan();

        let err = engine.skill_detail("ghost").await.unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    struct NoopTerminal(TerminalId);

    #[async_trait]
    impl Terminal for NoopTerminal {
        fn id(&self) -> TerminalId {
            self.0
        }

        async fn dispatch(&self, _line: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    /// Full cycle: dispatch an install, let the real watcher observe the new
    /// skill directory, and expect the detection signal to complete the
    /// operation and the snapshot to pick the skill up.
    #[tokio::test]
    async fn watcher_detection_completes_an_install() {
        let home = tempfile::tempdir().unwrap();
        let skills_dir = home.path().join(".agents/skills");
        std::fs::create_dir_all(&skills_dir).unwrap();

        let engine = offline_engine(home.path());
        engine.start().await.unwrap();

        let mut completions = engine.tracker().completions();
        let id = engine
            .install(&NoopTerminal(9), "beta", "owner/repo", Some(true))
            .await
            .unwrap();

        // The external tool "arrives": the skill directory appears on disk.
        write_skill(&skills_dir, "beta");

        let done = tokio::time::timeout(RECV_TIMEOUT, completions.recv())
            .await
            .expect("timed out waiting for completion")
            .unwrap();
        assert_eq!(done.operation_id, id);
        assert_eq!(done.signal, CompletionSignal::SkillsDetected);

        assert!(
            engine
                .snapshot()
                .iter()
                .any(|s| s.folder_name == "beta"),
            "snapshot should contain the new skill"
        );

        engine.stop().await;
    }
}
