//! Shared building blocks for the skillsync crates: TTL caching and typed
//! event channels.

pub mod cache;
pub mod events;

pub use {
    cache::{SingleCache, Ttl, TtlCache},
    events::EventChannel,
};
