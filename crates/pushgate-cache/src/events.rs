//! Events synthesized from dispatches.

use pushgate_core::Id;

use crate::{
    diff::Entity,
    entity::{Activity, ClientStatus, Emoji, Guild, OnlineStatus, Presence, Role, Sticker, VoiceState},
};

/// A synthesized event and the sequence number of the dispatch it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEvent {
    pub sequence: Option<u64>,
    pub kind: CacheEventKind,
}

/// Create, update or delete of one record within a scope.
///
/// Updates carry both images; creates and deletes carry one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityEvent<T> {
    Create { scope: Id, new: T },
    Update { scope: Id, old: T, new: T },
    Delete { scope: Id, old: T },
}

impl<T> EntityEvent<T> {
    #[must_use]
    pub const fn scope(&self) -> Id {
        match self {
            Self::Create { scope, .. } | Self::Update { scope, .. } | Self::Delete { scope, .. } => {
                *scope
            }
        }
    }

    /// Short label for logs.
    #[must_use]
    pub const fn action(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheEventKind {
    Emoji(EntityEvent<Emoji>),
    Sticker(EntityEvent<Sticker>),
    Role(EntityEvent<Role>),
    Presence(PresenceEvent),
    VoiceState(VoiceStateEvent),
    Guild(GuildEvent),
    /// A guild channel's webhooks changed. Nothing is cached.
    WebhooksUpdate { guild_id: Id, channel_id: Id },
}

impl CacheEventKind {
    /// Event name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Emoji(_) => "emoji",
            Self::Sticker(_) => "sticker",
            Self::Role(_) => "role",
            Self::Presence(PresenceEvent::StatusUpdate { .. }) => "status_update",
            Self::Presence(PresenceEvent::ClientStatusUpdate { .. }) => "client_status_update",
            Self::Presence(PresenceEvent::ActivityStart { .. }) => "activity_start",
            Self::Presence(PresenceEvent::ActivityUpdate { .. }) => "activity_update",
            Self::Presence(PresenceEvent::ActivityStop { .. }) => "activity_stop",
            Self::Presence(PresenceEvent::Update(_)) => "presence",
            Self::VoiceState(VoiceStateEvent::Join { .. }) => "voice_join",
            Self::VoiceState(VoiceStateEvent::Move { .. }) => "voice_move",
            Self::VoiceState(VoiceStateEvent::Update { .. }) => "voice_update",
            Self::VoiceState(VoiceStateEvent::Leave { .. }) => "voice_leave",
            Self::Guild(GuildEvent::Available(_)) => "guild_available",
            Self::Guild(GuildEvent::Join(_)) => "guild_join",
            Self::Guild(GuildEvent::Unavailable { .. }) => "guild_unavailable",
            Self::Guild(GuildEvent::Leave { .. }) => "guild_leave",
            Self::WebhooksUpdate { .. } => "webhooks_update",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PresenceEvent {
    /// `old` is `None` the first time the user is seen.
    StatusUpdate {
        guild_id: Id,
        user_id: Id,
        old: Option<OnlineStatus>,
        new: OnlineStatus,
    },
    ClientStatusUpdate {
        guild_id: Id,
        user_id: Id,
        old: Option<ClientStatus>,
        new: ClientStatus,
    },
    ActivityStart {
        guild_id: Id,
        user_id: Id,
        activity: Activity,
    },
    ActivityUpdate {
        guild_id: Id,
        user_id: Id,
        old: Activity,
        new: Activity,
    },
    ActivityStop {
        guild_id: Id,
        user_id: Id,
        activity: Activity,
    },
    Update(EntityEvent<Presence>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceStateEvent {
    Join { state: VoiceState },
    /// Same user, different channel.
    Move { old: VoiceState, new: VoiceState },
    /// Same channel, changed flags.
    Update { old: VoiceState, new: VoiceState },
    /// `old` is absent when the user was never seen in voice.
    Leave {
        old: Option<VoiceState>,
        state: VoiceState,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuildEvent {
    /// A known guild became available.
    Available(Guild),
    /// The client was added to a guild.
    Join(Guild),
    Unavailable { guild_id: Id },
    /// `guild` is the cached summary, if any.
    Leave { guild_id: Id, guild: Option<Guild> },
}

/// Kinds whose create/update/delete events have a [`CacheEventKind`] variant.
pub trait Notify: Entity {
    fn notify(event: EntityEvent<Self>) -> CacheEventKind;
}

impl Notify for Emoji {
    fn notify(event: EntityEvent<Self>) -> CacheEventKind {
        CacheEventKind::Emoji(event)
    }
}

impl Notify for Sticker {
    fn notify(event: EntityEvent<Self>) -> CacheEventKind {
        CacheEventKind::Sticker(event)
    }
}

impl Notify for Role {
    fn notify(event: EntityEvent<Self>) -> CacheEventKind {
        CacheEventKind::Role(event)
    }
}

impl Notify for Presence {
    fn notify(event: EntityEvent<Self>) -> CacheEventKind {
        CacheEventKind::Presence(PresenceEvent::Update(event))
    }
}
