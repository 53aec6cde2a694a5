//! Cached entity kinds.

mod emoji;
mod guild;
mod presence;
mod role;
mod sticker;
mod voice_state;

use pushgate_core::Id;
use serde::{Deserialize, Serialize};

pub use emoji::Emoji;
pub use guild::Guild;
pub use presence::{
    Activity, ActivityAssets, ActivityEmoji, ActivityParty, ActivitySecrets, ActivityTimestamps,
    ClientStatus, OnlineStatus, Presence,
};
pub use role::{Role, RoleTags};
pub use sticker::Sticker;
pub use voice_state::VoiceState;

/// A user reference embedded in another record. Compared by ID only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Id,
    #[serde(default)]
    pub username: Option<String>,
}

impl User {
    /// Whether both refer to the same user.
    #[must_use]
    pub fn same_user(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
