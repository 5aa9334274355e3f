//! The completion race: one task per dispatched operation, first signal wins.

use std::{
    collections::HashSet,
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use {
    skillsync_common::EventChannel,
    tokio::sync::broadcast,
    tracing::{debug, info, warn},
};

use crate::{
    commands::SkillOperation,
    terminal::{ShellExit, Terminal, TerminalId},
};

/// Ceiling before an operation is declared probably-still-running.
pub const OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Minimum time an operation stays visibly in progress, so instant
/// completions do not flash.
pub const MIN_PROGRESS: Duration = Duration::from_secs(2);

/// Timing knobs for the completion race. Tests shorten these; production use
/// takes the defaults.
#[derive(Debug, Clone, Copy)]
pub struct TrackerTiming {
    pub timeout: Duration,
    pub min_progress: Duration,
}

impl Default for TrackerTiming {
    fn default() -> Self {
        Self {
            timeout: OPERATION_TIMEOUT,
            min_progress: MIN_PROGRESS,
        }
    }
}

/// Which of the three raced signals decided the completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionSignal {
    /// The terminal reported the expected number of finished commands.
    ShellExit,
    /// The watcher saw the expected on-disk change.
    SkillsDetected,
    /// Nothing arrived in time; the command may still be running.
    TimedOut,
}

/// Skill names the watcher observed appearing or disappearing.
#[derive(Debug, Clone)]
pub struct SkillsDetected {
    pub names: HashSet<String>,
}

/// Published exactly once per dispatched operation.
#[derive(Debug, Clone)]
pub struct OperationCompleted {
    pub operation_id: u64,
    pub operation: SkillOperation,
    pub signal: CompletionSignal,
    /// A non-zero exit observed along the way. Completion still stands;
    /// success detection is deliberately decoupled from completion detection.
    pub warning: Option<String>,
}

/// Tracks dispatched operations until one of three signals declares each of
/// them finished. Signals are published into shared channels; every
/// operation's race task subscribes before its commands are sent, so nothing
/// can slip between dispatch and the first poll.
pub struct OperationTracker {
    timing: TrackerTiming,
    exits: EventChannel<ShellExit>,
    detections: EventChannel<SkillsDetected>,
    completions: EventChannel<OperationCompleted>,
    next_id: AtomicU64,
}

impl Default for OperationTracker {
    fn default() -> Self {
        Self::new(TrackerTiming::default())
    }
}

impl OperationTracker {
    pub fn new(timing: TrackerTiming) -> Self {
        Self {
            timing,
            exits: EventChannel::default(),
            detections: EventChannel::default(),
            completions: EventChannel::default(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Channel terminals publish their shell exits into.
    pub fn exit_channel(&self) -> EventChannel<ShellExit> {
        self.exits.clone()
    }

    /// Completion events, one per dispatched operation.
    pub fn completions(&self) -> broadcast::Receiver<OperationCompleted> {
        self.completions.subscribe()
    }

    /// Feed the explicit signal: a shell command finished in some terminal.
    pub fn notify_shell_exit(&self, exit: ShellExit) {
        self.exits.publish(exit);
    }

    /// Feed the inferred signal: the given skill names changed on disk.
    pub fn notify_skills_detected(&self, names: HashSet<String>) {
        self.detections.publish(SkillsDetected { names });
    }

    /// Send the operation's command lines to the terminal and start its
    /// completion race. Returns the operation id.
    pub async fn dispatch(
        &self,
        terminal: &dyn Terminal,
        operation: SkillOperation,
    ) -> anyhow::Result<u64> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        // Subscribe before sending anything so a signal arriving mid-dispatch
        // is still seen by the race.
        let exit_rx = self.exits.subscribe();
        let detect_rx = self.detections.subscribe();

        let lines = operation.command_lines();
        for line in &lines {
            terminal.dispatch(line).await?;
        }
        info!(id, %operation, lines = lines.len(), "operation dispatched");

        let race = Race {
            id,
            operation,
            terminal: terminal.id(),
            timing: self.timing,
            completions: self.completions.clone(),
        };
        tokio::spawn(race.run(exit_rx, detect_rx));
        Ok(id)
    }
}

struct Race {
    id: u64,
    operation: SkillOperation,
    terminal: TerminalId,
    timing: TrackerTiming,
    completions: EventChannel<OperationCompleted>,
}

impl Race {
    async fn run(
        self,
        mut exit_rx: broadcast::Receiver<ShellExit>,
        mut detect_rx: broadcast::Receiver<SkillsDetected>,
    ) {
        let started = Instant::now();
        let expected_exits = self.operation.expected_exits();
        let mut exits_seen = 0usize;
        let mut warning: Option<String> = None;
        let mut exits_open = true;
        let mut detections_open = true;

        let timeout = tokio::time::sleep(self.timing.timeout);
        tokio::pin!(timeout);

        let signal = loop {
            tokio::select! {
                () = &mut timeout => {
                    break CompletionSignal::TimedOut;
                },
                exit = exit_rx.recv(), if exits_open => {
                    match exit {
                        Ok(e) if e.terminal == self.terminal => {
                            exits_seen += 1;
                            debug!(id = self.id, exits_seen, expected_exits, code = ?e.exit_code, "shell exit");
                            if let Some(code) = e.exit_code {
                                if code != 0 && warning.is_none() {
                                    warning = Some(format!(
                                        "a command exited with code {code}; check the terminal output"
                                    ));
                                }
                            }
                            if exits_seen >= expected_exits {
                                break CompletionSignal::ShellExit;
                            }
                        },
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(id = self.id, skipped, "shell exit signals lagged");
                        },
                        Err(broadcast::error::RecvError::Closed) => exits_open = false,
                    }
                },
                detection = detect_rx.recv(), if detections_open => {
                    match detection {
                        Ok(d) if self.operation.matches_detection(&d.names) => {
                            break CompletionSignal::SkillsDetected;
                        },
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(id = self.id, skipped, "detection signals lagged");
                        },
                        Err(broadcast::error::RecvError::Closed) => detections_open = false,
                    }
                },
            }
        };

        // Hold fast completions until the minimum progress window has passed.
        let elapsed = started.elapsed();
        if elapsed < self.timing.min_progress {
            tokio::time::sleep(self.timing.min_progress - elapsed).await;
        }

        match signal {
            CompletionSignal::TimedOut => warn!(
                id = self.id,
                operation = %self.operation,
                "no completion signal in time; the command may still be running, check the terminal"
            ),
            _ => info!(id = self.id, operation = %self.operation, ?signal, "operation completed"),
        }
        if let Some(w) = &warning {
            warn!(id = self.id, operation = %self.operation, warning = %w, "completed with warning");
        }

        self.completions.publish(OperationCompleted {
            operation_id: self.id,
            operation: self.operation,
            signal,
            warning,
        });
    }
}
