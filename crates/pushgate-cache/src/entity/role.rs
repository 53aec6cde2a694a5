use pushgate_core::Id;
use serde::{Deserialize, Serialize};

use crate::diff::Entity;

/// Guild role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub color: u32,
    #[serde(default)]
    pub hoist: bool,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub unicode_emoji: Option<String>,
    #[serde(default)]
    pub position: i64,
    /// Permission bit set, as a decimal string.
    #[serde(default)]
    pub permissions: String,
    #[serde(default)]
    pub managed: bool,
    #[serde(default)]
    pub mentionable: bool,
    #[serde(default)]
    pub tags: Option<RoleTags>,
}

/// Integration metadata of a managed role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleTags {
    #[serde(default)]
    pub bot_id: Option<Id>,
    #[serde(default)]
    pub integration_id: Option<Id>,
}

impl Entity for Role {
    type Key = Id;

    fn key(&self) -> Id {
        self.id
    }

    fn same_as(&self, other: &Self) -> bool {
        self == other
    }
}
