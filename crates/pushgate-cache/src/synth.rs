//! Dispatch to cache event synthesis.

use std::{collections::HashMap, sync::Arc};

use pushgate_core::{Dispatch, EventSink, Id};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    diff::{self, Change, Diff, Entity},
    entity::{Emoji, Guild, Presence, Role, Sticker, VoiceState},
    error::CacheError,
    events::{CacheEvent, CacheEventKind, EntityEvent, GuildEvent, Notify, PresenceEvent, VoiceStateEvent},
    store::{CacheFlags, CacheStore, Cached},
};

#[derive(Deserialize)]
struct ReadyPayload {
    #[serde(default)]
    guilds: Vec<Value>,
}

#[derive(Deserialize)]
struct GuildCreatePayload {
    id: Id,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    unavailable: bool,
    #[serde(default)]
    roles: Vec<Value>,
    #[serde(default)]
    emojis: Vec<Value>,
    #[serde(default)]
    stickers: Vec<Value>,
    #[serde(default)]
    presences: Vec<Value>,
    #[serde(default)]
    voice_states: Vec<Value>,
}

#[derive(Deserialize)]
struct GuildDeletePayload {
    id: Id,
    #[serde(default)]
    unavailable: bool,
}

#[derive(Deserialize)]
struct EmojisUpdate {
    guild_id: Id,
    #[serde(default)]
    emojis: Vec<Value>,
}

#[derive(Deserialize)]
struct StickersUpdate {
    guild_id: Id,
    #[serde(default)]
    stickers: Vec<Value>,
}

#[derive(Deserialize)]
struct RoleUpsert {
    guild_id: Id,
    role: Role,
}

#[derive(Deserialize)]
struct RoleDelete {
    guild_id: Id,
    role_id: Id,
}

#[derive(Deserialize)]
struct WebhooksUpdate {
    guild_id: Id,
    channel_id: Id,
}

/// Reconciles dispatches against the [`CacheStore`] and emits
/// [`CacheEvent`]s.
///
/// Passes for the same scope are serialized on that scope's lock, and a
/// pass emits its events before releasing it, so events of one scope
/// never interleave.
pub struct Synthesizer {
    store: Arc<CacheStore>,
    sink: Arc<dyn EventSink<CacheEvent>>,
}

impl Synthesizer {
    #[must_use]
    pub fn new(store: Arc<CacheStore>, sink: Arc<dyn EventSink<CacheEvent>>) -> Self {
        Self { store, sink }
    }

    #[must_use]
    pub const fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Process one dispatch.
    ///
    /// # Errors
    /// Returns error if the payload cannot be read at all. Malformed
    /// collection members are skipped instead.
    pub fn handle(&self, dispatch: &Dispatch) -> Result<(), CacheError> {
        let seq = dispatch.sequence;
        match dispatch.event.as_str() {
            "READY" => self.on_ready(parse(dispatch)?),
            "GUILD_CREATE" => self.on_guild_create(seq, parse(dispatch)?),
            "GUILD_DELETE" => self.on_guild_delete(seq, &parse(dispatch)?),
            "GUILD_EMOJIS_UPDATE" => {
                let update: EmojisUpdate = parse(dispatch)?;
                let members = parse_members(&dispatch.event, update.emojis);
                self.sync_collection::<Emoji>(seq, update.guild_id, members);
            }
            "GUILD_STICKERS_UPDATE" => {
                let update: StickersUpdate = parse(dispatch)?;
                let members = parse_members(&dispatch.event, update.stickers);
                self.sync_collection::<Sticker>(seq, update.guild_id, members);
            }
            "GUILD_ROLE_CREATE" | "GUILD_ROLE_UPDATE" => {
                let update: RoleUpsert = parse(dispatch)?;
                self.upsert(seq, update.guild_id, update.role);
            }
            "GUILD_ROLE_DELETE" => {
                let delete: RoleDelete = parse(dispatch)?;
                self.remove::<Role>(seq, delete.guild_id, &delete.role_id);
            }
            "PRESENCE_UPDATE" => {
                let presence: Presence = parse(dispatch)?;
                let scope = presence.guild_id.ok_or_else(|| missing_scope(dispatch))?;
                self.on_presence(seq, scope, presence);
            }
            "VOICE_STATE_UPDATE" => {
                let state: VoiceState = parse(dispatch)?;
                let scope = state.guild_id.ok_or_else(|| missing_scope(dispatch))?;
                self.on_voice_state(seq, scope, state);
            }
            "GUILD_WEBHOOKS_UPDATE" => {
                let update: WebhooksUpdate = parse(dispatch)?;
                self.emit(
                    seq,
                    CacheEventKind::WebhooksUpdate {
                        guild_id: update.guild_id,
                        channel_id: update.channel_id,
                    },
                );
            }
            other => tracing::debug!(event = other, "No synthesis for event"),
        }
        Ok(())
    }

    /// Reconcile `scope`'s table of `T` against an authoritative collection.
    ///
    /// Emits every Create, then every Update, then every Delete. With `T`
    /// not cached the table is left alone and every member reports as a
    /// Create.
    pub fn sync_collection<T: Cached + Notify>(&self, sequence: Option<u64>, scope: Id, members: Vec<T>) {
        if !self.store.caches(T::FLAG) {
            let result = diff::diff(&HashMap::new(), members);
            self.emit_diff(sequence, scope, result);
            return;
        }

        let slot = T::table(&self.store).scope(scope);
        let mut table = slot.lock();
        let result = diff::diff(&*table, members);
        diff::apply(&mut *table, &result);
        tracing::debug!(
            %scope,
            kind = T::NAME,
            added = result.added.len(),
            updated = result.updated.len(),
            removed = result.removed.len(),
            "Collection synced"
        );
        self.emit_diff(sequence, scope, result);
    }

    /// Insert or replace one record: Create when absent, Update when it
    /// differs, nothing when equal.
    pub fn upsert<T: Cached + Notify>(&self, sequence: Option<u64>, scope: Id, member: T) {
        if !self.store.caches(T::FLAG) {
            self.emit(sequence, T::notify(EntityEvent::Create { scope, new: member }));
            return;
        }

        let slot = T::table(&self.store).scope(scope);
        let mut table = slot.lock();
        let event = match table.get(&member.key()) {
            None => Some(EntityEvent::Create {
                scope,
                new: member.clone(),
            }),
            Some(old) if old.same_as(&member) => None,
            Some(old) => Some(EntityEvent::Update {
                scope,
                old: old.clone(),
                new: member.clone(),
            }),
        };
        table.insert(member.key(), member);
        if let Some(event) = event {
            self.emit(sequence, T::notify(event));
        }
    }

    /// Remove one record, emitting Delete with its last image. Nothing is
    /// emitted for unknown records or uncached kinds.
    pub fn remove<T: Cached + Notify>(&self, sequence: Option<u64>, scope: Id, key: &T::Key) {
        if !self.store.caches(T::FLAG) {
            tracing::debug!(%scope, kind = T::NAME, ?key, "Delete of uncached kind, no image to report");
            return;
        }

        let slot = T::table(&self.store).scope(scope);
        let mut table = slot.lock();
        match table.remove(key) {
            Some(old) => self.emit(sequence, T::notify(EntityEvent::Delete { scope, old })),
            None => tracing::debug!(%scope, kind = T::NAME, ?key, "Delete of unknown record"),
        }
    }

    /// Replace `scope`'s table without emitting anything.
    fn seed<T: Cached>(&self, scope: Id, members: Vec<T>) {
        if self.store.caches(T::FLAG) {
            *T::table(&self.store).scope(scope).lock() = diff::index(members);
        }
    }

    fn on_ready(&self, ready: ReadyPayload) {
        if !self.store.caches(CacheFlags::GUILDS) {
            return;
        }
        let guilds: Vec<Guild> = parse_members("READY", ready.guilds);
        for guild in guilds {
            self.store.mark_unavailable(guild.id);
        }
    }

    fn on_guild_create(&self, sequence: Option<u64>, payload: GuildCreatePayload) {
        let scope = payload.id;
        if payload.unavailable {
            if self.store.caches(CacheFlags::GUILDS) {
                self.store.mark_unavailable(scope);
            }
            self.emit(sequence, CacheEventKind::Guild(GuildEvent::Unavailable { guild_id: scope }));
            return;
        }

        let event = "GUILD_CREATE";
        self.seed::<Role>(scope, parse_members(event, payload.roles));
        self.seed::<Emoji>(scope, parse_members(event, payload.emojis));
        self.seed::<Sticker>(scope, parse_members(event, payload.stickers));

        let mut presences: Vec<Presence> = parse_members(event, payload.presences);
        for presence in &mut presences {
            presence.guild_id = Some(scope);
        }
        self.seed(scope, presences);

        let mut voice_states: Vec<VoiceState> = parse_members(event, payload.voice_states);
        for state in &mut voice_states {
            state.guild_id = Some(scope);
        }
        self.seed(scope, voice_states);

        let guild = Guild {
            id: scope,
            name: payload.name,
            unavailable: false,
        };
        let known = !self.store.caches(CacheFlags::GUILDS) || self.store.put_guild(guild.clone()).is_some();
        let kind = if known {
            GuildEvent::Available(guild)
        } else {
            GuildEvent::Join(guild)
        };
        self.emit(sequence, CacheEventKind::Guild(kind));
    }

    fn on_guild_delete(&self, sequence: Option<u64>, payload: &GuildDeletePayload) {
        let guild_id = payload.id;
        let kind = if payload.unavailable {
            if self.store.caches(CacheFlags::GUILDS) {
                self.store.mark_unavailable(guild_id);
            }
            GuildEvent::Unavailable { guild_id }
        } else {
            GuildEvent::Leave {
                guild_id,
                guild: self.store.remove_guild(guild_id),
            }
        };
        self.emit(sequence, CacheEventKind::Guild(kind));
    }

    fn on_presence(&self, sequence: Option<u64>, scope: Id, presence: Presence) {
        if !self.store.caches(CacheFlags::PRESENCES) {
            self.emit_all(sequence, presence_events(scope, None, &presence));
            return;
        }

        let slot = Presence::table(&self.store).scope(scope);
        let mut table = slot.lock();
        let events = presence_events(scope, table.get(&presence.key()), &presence);
        table.insert(presence.key(), presence);
        self.emit_all(sequence, events);
    }

    fn on_voice_state(&self, sequence: Option<u64>, scope: Id, state: VoiceState) {
        if !self.store.caches(CacheFlags::VOICE_STATES) {
            let event = if state.channel_id.is_some() {
                VoiceStateEvent::Join { state }
            } else {
                VoiceStateEvent::Leave { old: None, state }
            };
            self.emit(sequence, CacheEventKind::VoiceState(event));
            return;
        }

        let slot = VoiceState::table(&self.store).scope(scope);
        let mut table = slot.lock();
        let key = state.key();
        let event = match (table.get(&key).cloned(), state.channel_id) {
            (old, None) => {
                table.remove(&key);
                Some(VoiceStateEvent::Leave { old, state })
            }
            (None, Some(_)) => {
                table.insert(key, state.clone());
                Some(VoiceStateEvent::Join { state })
            }
            (Some(old), Some(_)) => {
                table.insert(key, state.clone());
                if old.channel_id != state.channel_id {
                    Some(VoiceStateEvent::Move { old, new: state })
                } else if old.same_as(&state) {
                    None
                } else {
                    Some(VoiceStateEvent::Update { old, new: state })
                }
            }
        };
        if let Some(event) = event {
            self.emit(sequence, CacheEventKind::VoiceState(event));
        }
    }

    fn emit_diff<T: Notify>(&self, sequence: Option<u64>, scope: Id, result: Diff<T>) {
        for new in result.added {
            self.emit(sequence, T::notify(EntityEvent::Create { scope, new }));
        }
        for Change { old, new } in result.updated {
            self.emit(sequence, T::notify(EntityEvent::Update { scope, old, new }));
        }
        for old in result.removed {
            self.emit(sequence, T::notify(EntityEvent::Delete { scope, old }));
        }
    }

    fn emit_all(&self, sequence: Option<u64>, kinds: Vec<CacheEventKind>) {
        for kind in kinds {
            self.emit(sequence, kind);
        }
    }

    fn emit(&self, sequence: Option<u64>, kind: CacheEventKind) {
        tracing::trace!(event = kind.name(), ?sequence, "Cache event");
        self.sink.emit(CacheEvent { sequence, kind });
    }

    /// Feed dispatches from `rx` into the engine on a dedicated task, in
    /// arrival order. The task ends when the sender side is dropped.
    pub fn spawn_dispatcher(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<Dispatch>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(dispatch) = rx.recv().await {
                if let Err(e) = self.handle(&dispatch) {
                    tracing::warn!(event = %dispatch.event, sequence = ?dispatch.sequence, error = %e, "Dropping dispatch");
                }
            }
            tracing::debug!("Dispatch stream ended");
        })
    }
}

/// Events for one presence change, in emission order: status, client
/// status, activity start/update/stop, then the presence itself.
fn presence_events(scope: Id, old: Option<&Presence>, new: &Presence) -> Vec<CacheEventKind> {
    let user_id = new.user.id;
    let mut events = Vec::new();
    let mut push = |event| events.push(CacheEventKind::Presence(event));

    if old.map(|o| o.status) != Some(new.status) {
        push(PresenceEvent::StatusUpdate {
            guild_id: scope,
            user_id,
            old: old.map(|o| o.status),
            new: new.status,
        });
    }
    if old.map(|o| &o.client_status) != Some(&new.client_status) {
        push(PresenceEvent::ClientStatusUpdate {
            guild_id: scope,
            user_id,
            old: old.map(|o| o.client_status.clone()),
            new: new.client_status.clone(),
        });
    }

    let previous = diff::index(old.map(|o| o.activities.clone()).unwrap_or_default());
    let activities = diff::diff(&previous, new.activities.clone());
    for activity in activities.added {
        push(PresenceEvent::ActivityStart {
            guild_id: scope,
            user_id,
            activity,
        });
    }
    for Change { old, new } in activities.updated {
        push(PresenceEvent::ActivityUpdate {
            guild_id: scope,
            user_id,
            old,
            new,
        });
    }
    for activity in activities.removed {
        push(PresenceEvent::ActivityStop {
            guild_id: scope,
            user_id,
            activity,
        });
    }

    match old {
        None => push(PresenceEvent::Update(EntityEvent::Create {
            scope,
            new: new.clone(),
        })),
        Some(old) if !old.same_as(new) => push(PresenceEvent::Update(EntityEvent::Update {
            scope,
            old: old.clone(),
            new: new.clone(),
        })),
        Some(_) => {}
    }
    events
}

fn parse<T: DeserializeOwned>(dispatch: &Dispatch) -> Result<T, CacheError> {
    dispatch.parse().map_err(|source| CacheError::Payload {
        event: dispatch.event.clone(),
        source,
    })
}

fn missing_scope(dispatch: &Dispatch) -> CacheError {
    CacheError::MissingScope {
        event: dispatch.event.clone(),
    }
}

/// Decode collection members one by one, skipping the malformed ones.
pub(crate) fn parse_members<T: DeserializeOwned>(event: &str, raw: Vec<Value>) -> Vec<T> {
    raw.into_iter()
        .filter_map(|member| match serde_json::from_value(member) {
            Ok(member) => Some(member),
            Err(e) => {
                tracing::warn!(event, error = %e, "Skipping malformed member");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::OnlineStatus;
    use serde_json::json;

    fn presence(status: &str, activities: Value) -> Presence {
        serde_json::from_value(json!({
            "user": {"id": "7"},
            "guild_id": "1",
            "status": status,
            "activities": activities,
        }))
        .unwrap()
    }

    fn names(events: &[CacheEventKind]) -> Vec<&'static str> {
        events.iter().map(CacheEventKind::name).collect()
    }

    #[test]
    fn test_first_presence_reports_everything() {
        let new = presence("online", json!([{"id": "a1", "name": "Game", "type": 0}]));
        let events = presence_events(Id::new(1), None, &new);
        assert_eq!(
            names(&events),
            vec!["status_update", "client_status_update", "activity_start", "presence"]
        );
        assert!(matches!(
            &events[0],
            CacheEventKind::Presence(PresenceEvent::StatusUpdate { old: None, new: OnlineStatus::Online, .. })
        ));
    }

    #[test]
    fn test_unchanged_presence_reports_nothing() {
        let old = presence("idle", json!([]));
        assert!(presence_events(Id::new(1), Some(&old), &old.clone()).is_empty());
    }

    #[test]
    fn test_activity_changes_in_order() {
        let old = presence(
            "online",
            json!([
                {"id": "a1", "name": "Game", "type": 0},
                {"id": "a2", "name": "Music", "type": 2},
            ]),
        );
        let new = presence(
            "online",
            json!([
                {"id": "a2", "name": "Music", "type": 2, "details": "track"},
                {"id": "a3", "name": "Stream", "type": 1},
            ]),
        );
        let events = presence_events(Id::new(1), Some(&old), &new);
        assert_eq!(
            names(&events),
            vec!["activity_start", "activity_update", "activity_stop", "presence"]
        );
    }

    #[test]
    fn test_status_only_change() {
        let old = presence("online", json!([]));
        let new = presence("dnd", json!([]));
        let events = presence_events(Id::new(1), Some(&old), &new);
        assert_eq!(names(&events), vec!["status_update", "presence"]);
    }

    #[test]
    fn test_parse_members_skips_malformed() {
        let members: Vec<Emoji> = parse_members(
            "GUILD_EMOJIS_UPDATE",
            vec![json!({"id": "1", "name": "a"}), json!({"name": "no id"}), json!(5)],
        );
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id, Id::new(1));
    }
}
