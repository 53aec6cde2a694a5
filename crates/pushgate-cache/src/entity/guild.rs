use pushgate_core::Id;
use serde::{Deserialize, Serialize};

use crate::diff::Entity;

/// Guild summary. The full guild object is not cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guild {
    pub id: Id,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub unavailable: bool,
}

impl Guild {
    /// Placeholder for a guild announced as unavailable.
    #[must_use]
    pub const fn unavailable(id: Id) -> Self {
        Self {
            id,
            name: None,
            unavailable: true,
        }
    }
}

impl Entity for Guild {
    type Key = Id;

    fn key(&self) -> Id {
        self.id
    }

    fn same_as(&self, other: &Self) -> bool {
        self == other
    }
}
