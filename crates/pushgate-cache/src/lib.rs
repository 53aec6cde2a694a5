//! Entity cache and event synthesis.
//!
//! - `diff` - The generic three-step set diff over [`Entity`] records
//! - `store` - Per-scope tables with per-kind enable flags
//! - `synth` - Turns gateway dispatches into [`CacheEvent`]s

pub mod compare;
pub mod diff;
pub mod entity;
pub mod error;
pub mod events;
pub mod store;
pub mod synth;

pub use diff::{Change, Diff, Entity};
pub use error::CacheError;
pub use events::{
    CacheEvent, CacheEventKind, EntityEvent, GuildEvent, Notify, PresenceEvent, VoiceStateEvent,
};
pub use store::{CacheConfig, CacheFlags, CacheStore, Cached, ScopedTable};
pub use synth::Synthesizer;
