//! Terminal hosts that run dispatched command lines.

use std::{
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
};

use {
    anyhow::Context,
    async_trait::async_trait,
    skillsync_common::EventChannel,
    tokio::process::Command,
    tracing::{debug, warn},
};

/// Correlates shell-exit signals with the terminal an operation went to.
pub type TerminalId = u64;

static NEXT_TERMINAL_ID: AtomicU64 = AtomicU64::new(1);

/// One shell command finished in a terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShellExit {
    pub terminal: TerminalId,
    /// None when the shell was killed by a signal.
    pub exit_code: Option<i32>,
}

/// Where dispatched command lines run. Dispatch is fire-and-forget: the host
/// reports each finished command through a [`ShellExit`] signal instead of a
/// return value, mirroring how an embedded terminal reports shell executions.
#[async_trait]
pub trait Terminal: Send + Sync {
    fn id(&self) -> TerminalId;

    /// Hand one command line to the terminal.
    async fn dispatch(&self, line: &str) -> anyhow::Result<()>;
}

/// Headless terminal that runs each line through `sh -c` and publishes the
/// exit code when the child finishes. Output is inherited so the user sees
/// what the external tool prints.
pub struct ProcessTerminal {
    id: TerminalId,
    cwd: Option<PathBuf>,
    exits: EventChannel<ShellExit>,
}

impl ProcessTerminal {
    /// A terminal publishing exits into the given channel, usually the
    /// operation tracker's.
    pub fn new(exits: EventChannel<ShellExit>) -> Self {
        Self {
            id: NEXT_TERMINAL_ID.fetch_add(1, Ordering::Relaxed),
            cwd: None,
            exits,
        }
    }

    pub fn with_cwd(exits: EventChannel<ShellExit>, cwd: PathBuf) -> Self {
        let mut terminal = Self::new(exits);
        terminal.cwd = Some(cwd);
        terminal
    }
}

#[async_trait]
impl Terminal for ProcessTerminal {
    fn id(&self) -> TerminalId {
        self.id
    }

    async fn dispatch(&self, line: &str) -> anyhow::Result<()> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(line);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        let mut child = cmd.spawn().context("failed to spawn shell")?;
        debug!(terminal = self.id, %line, "spawned command");

        let exits = self.exits.clone();
        let terminal = self.id;
        tokio::spawn(async move {
            let exit_code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!(terminal, %e, "waiting on shell command failed");
                    None
                },
            };
            exits.publish(ShellExit {
                terminal,
                exit_code,
            });
        });
        Ok(())
    }
}
