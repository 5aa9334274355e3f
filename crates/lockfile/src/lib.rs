//! Lock-file stores tying installed skill folders to their remote provenance.
//!
//! Two independent stores exist: a global one (single file, user-wide) and a
//! project-local one (one file per project root). Keys are skill identifiers
//! that are *not* guaranteed to equal installed folder names, so resolution
//! supports a deterministic path-suffix fallback.

pub mod file;
pub mod store;

pub use {
    file::{LockEntry, LockFile},
    store::{FallbackMatching, LockStore, find_lock_entry},
};
