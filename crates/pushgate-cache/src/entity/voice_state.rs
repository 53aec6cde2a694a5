use pushgate_core::Id;
use serde::{Deserialize, Serialize};

use crate::diff::Entity;

/// A user's voice connection state within a guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceState {
    #[serde(default)]
    pub guild_id: Option<Id>,
    /// `None` once the user left voice.
    pub channel_id: Option<Id>,
    pub user_id: Id,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub deaf: bool,
    #[serde(default)]
    pub mute: bool,
    #[serde(default)]
    pub self_deaf: bool,
    #[serde(default)]
    pub self_mute: bool,
    #[serde(default)]
    pub self_stream: Option<bool>,
    #[serde(default)]
    pub self_video: bool,
    #[serde(default)]
    pub suppress: bool,
    #[serde(default)]
    pub request_to_speak_timestamp: Option<String>,
}

impl Entity for VoiceState {
    type Key = Id;

    fn key(&self) -> Id {
        self.user_id
    }

    fn same_as(&self, other: &Self) -> bool {
        self == other
    }
}
