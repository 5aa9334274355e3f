//! Dispatch of external skill mutations and detection of their completion.
//!
//! Install, update and uninstall are delegated to an external command-line
//! tool running in a terminal. The commands are fire-and-forget, so finishing
//! is inferred by racing three signals per operation: the terminal reporting
//! its shell commands done, the change watcher seeing the expected skills
//! appear or disappear, and a fixed timeout. First signal wins, the rest
//! become no-ops, and exactly one completion event is published.

pub mod commands;
pub mod terminal;
pub mod tracker;

pub use {
    commands::{SkillOperation, UpdateTarget},
    terminal::{ProcessTerminal, ShellExit, Terminal, TerminalId},
    tracker::{
        CompletionSignal, OperationCompleted, OperationTracker, SkillsDetected, TrackerTiming,
    },
};
