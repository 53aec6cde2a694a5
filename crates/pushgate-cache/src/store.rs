//! Keyed entity tables guarded per scope.

use std::{
    collections::HashMap,
    ops::{BitOr, BitOrAssign},
    sync::Arc,
};

use dashmap::DashMap;
use parking_lot::Mutex;
use pushgate_core::Id;
use serde::{Deserialize, Serialize};

use crate::{
    diff::Entity,
    entity::{Emoji, Guild, Presence, Role, Sticker, VoiceState},
};

/// One scope's records.
pub type Scope<K, T> = Arc<Mutex<HashMap<K, T>>>;

/// Entity kinds the store may keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheFlags(pub u32);

impl CacheFlags {
    pub const NONE: Self = Self(0);
    pub const GUILDS: Self = Self(1 << 0);
    pub const EMOJIS: Self = Self(1 << 1);
    pub const STICKERS: Self = Self(1 << 2);
    pub const ROLES: Self = Self(1 << 3);
    pub const PRESENCES: Self = Self(1 << 4);
    pub const VOICE_STATES: Self = Self(1 << 5);
    pub const ALL: Self = Self((1 << 6) - 1);

    /// Whether every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// These flags with every bit of `other` cleared.
    #[must_use]
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl Default for CacheFlags {
    fn default() -> Self {
        Self::ALL
    }
}

impl BitOr for CacheFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for CacheFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub flags: CacheFlags,
}

impl CacheConfig {
    #[must_use]
    pub const fn with_flags(mut self, flags: CacheFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// Records of one kind, partitioned by scope (a guild ID).
///
/// Each scope has its own lock. Readers get value copies, never
/// references into the live table.
pub struct ScopedTable<T: Entity> {
    scopes: DashMap<Id, Scope<T::Key, T>>,
}

impl<T: Entity> Default for ScopedTable<T> {
    fn default() -> Self {
        Self {
            scopes: DashMap::new(),
        }
    }
}

impl<T: Entity> ScopedTable<T> {
    /// The lock for `scope`, created empty on first use.
    #[must_use]
    pub fn scope(&self, scope: Id) -> Scope<T::Key, T> {
        Arc::clone(self.scopes.entry(scope).or_default().value())
    }

    fn existing(&self, scope: Id) -> Option<Scope<T::Key, T>> {
        self.scopes.get(&scope).map(|slot| Arc::clone(slot.value()))
    }

    #[must_use]
    pub fn get(&self, scope: Id, key: &T::Key) -> Option<T> {
        self.existing(scope)?.lock().get(key).cloned()
    }

    /// Value copy of every record in `scope`. Unknown scopes are empty.
    #[must_use]
    pub fn snapshot(&self, scope: Id) -> HashMap<T::Key, T> {
        self.existing(scope)
            .map(|slot| slot.lock().clone())
            .unwrap_or_default()
    }

    /// Insert or replace, returning the previous record.
    pub fn put(&self, scope: Id, record: T) -> Option<T> {
        self.scope(scope).lock().insert(record.key(), record)
    }

    pub fn delete(&self, scope: Id, key: &T::Key) -> Option<T> {
        self.existing(scope)?.lock().remove(key)
    }

    /// Empty a whole scope.
    ///
    /// The slot stays registered so a pass still holding it and any later
    /// pass serialize on the same lock.
    pub fn remove_scope(&self, scope: Id) {
        if let Some(slot) = self.existing(scope) {
            slot.lock().clear();
        }
    }

    /// Records in `scope`.
    #[must_use]
    pub fn len(&self, scope: Id) -> usize {
        self.existing(scope).map_or(0, |slot| slot.lock().len())
    }

    /// Number of scope slots, emptied ones included.
    #[must_use]
    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }
}

/// All cached tables plus the per-kind enable flags.
#[derive(Default)]
pub struct CacheStore {
    flags: CacheFlags,
    guilds: DashMap<Id, Guild>,
    emojis: ScopedTable<Emoji>,
    stickers: ScopedTable<Sticker>,
    roles: ScopedTable<Role>,
    presences: ScopedTable<Presence>,
    voice_states: ScopedTable<VoiceState>,
}

impl CacheStore {
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            flags: config.flags,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn flags(&self) -> CacheFlags {
        self.flags
    }

    /// Whether records of `kind` are kept.
    #[must_use]
    pub const fn caches(&self, kind: CacheFlags) -> bool {
        self.flags.contains(kind)
    }

    #[must_use]
    pub fn guild(&self, id: Id) -> Option<Guild> {
        self.guilds.get(&id).map(|g| g.value().clone())
    }

    #[must_use]
    pub fn guilds(&self) -> Vec<Guild> {
        self.guilds.iter().map(|g| g.value().clone()).collect()
    }

    pub(crate) fn put_guild(&self, guild: Guild) -> Option<Guild> {
        self.guilds.insert(guild.id, guild)
    }

    pub(crate) fn mark_unavailable(&self, id: Id) {
        self.guilds
            .entry(id)
            .and_modify(|g| g.unavailable = true)
            .or_insert_with(|| Guild::unavailable(id));
    }

    /// Forget a guild and everything scoped to it.
    pub(crate) fn remove_guild(&self, id: Id) -> Option<Guild> {
        self.emojis.remove_scope(id);
        self.stickers.remove_scope(id);
        self.roles.remove_scope(id);
        self.presences.remove_scope(id);
        self.voice_states.remove_scope(id);
        self.guilds.remove(&id).map(|(_, guild)| guild)
    }

    #[must_use]
    pub const fn emojis(&self) -> &ScopedTable<Emoji> {
        &self.emojis
    }

    #[must_use]
    pub const fn stickers(&self) -> &ScopedTable<Sticker> {
        &self.stickers
    }

    #[must_use]
    pub const fn roles(&self) -> &ScopedTable<Role> {
        &self.roles
    }

    #[must_use]
    pub const fn presences(&self) -> &ScopedTable<Presence> {
        &self.presences
    }

    #[must_use]
    pub const fn voice_states(&self) -> &ScopedTable<VoiceState> {
        &self.voice_states
    }
}

/// A kind with its own scoped table in [`CacheStore`].
pub trait Cached: Entity {
    const FLAG: CacheFlags;
    /// Kind name for logs.
    const NAME: &'static str;

    fn table(store: &CacheStore) -> &ScopedTable<Self>;
}

impl Cached for Emoji {
    const FLAG: CacheFlags = CacheFlags::EMOJIS;
    const NAME: &'static str = "emoji";

    fn table(store: &CacheStore) -> &ScopedTable<Self> {
        store.emojis()
    }
}

impl Cached for Sticker {
    const FLAG: CacheFlags = CacheFlags::STICKERS;
    const NAME: &'static str = "sticker";

    fn table(store: &CacheStore) -> &ScopedTable<Self> {
        store.stickers()
    }
}

impl Cached for Role {
    const FLAG: CacheFlags = CacheFlags::ROLES;
    const NAME: &'static str = "role";

    fn table(store: &CacheStore) -> &ScopedTable<Self> {
        store.roles()
    }
}

impl Cached for Presence {
    const FLAG: CacheFlags = CacheFlags::PRESENCES;
    const NAME: &'static str = "presence";

    fn table(store: &CacheStore) -> &ScopedTable<Self> {
        store.presences()
    }
}

impl Cached for VoiceState {
    const FLAG: CacheFlags = CacheFlags::VOICE_STATES;
    const NAME: &'static str = "voice_state";

    fn table(store: &CacheStore) -> &ScopedTable<Self> {
        store.voice_states()
    }
}
