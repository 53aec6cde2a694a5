use pushgate_core::Id;
use serde::{Deserialize, Serialize};

use super::User;
use crate::{compare::opt_eq_by, diff::Entity};

/// Guild sticker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sticker {
    pub id: Id,
    #[serde(default)]
    pub pack_id: Option<Id>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: String,
    #[serde(rename = "type", default)]
    pub kind: u8,
    #[serde(default)]
    pub format_type: u8,
    #[serde(default)]
    pub available: Option<bool>,
    #[serde(default)]
    pub guild_id: Option<Id>,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub sort_value: Option<i64>,
}

impl Entity for Sticker {
    type Key = Id;

    fn key(&self) -> Id {
        self.id
    }

    fn same_as(&self, other: &Self) -> bool {
        self.id == other.id
            && self.pack_id == other.pack_id
            && self.name == other.name
            && self.description == other.description
            && self.tags == other.tags
            && self.kind == other.kind
            && self.format_type == other.format_type
            && self.available == other.available
            && self.guild_id == other.guild_id
            && opt_eq_by(self.user.as_ref(), other.user.as_ref(), User::same_user)
            && self.sort_value == other.sort_value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_name_is_required() {
        let result = serde_json::from_value::<Sticker>(json!({"id": "1"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_sort_value_null_safety() {
        let a: Sticker = serde_json::from_value(json!({"id": "1", "name": "wave"})).unwrap();
        let b: Sticker =
            serde_json::from_value(json!({"id": "1", "name": "wave", "sort_value": 0})).unwrap();
        assert!(!a.same_as(&b));
        assert!(a.same_as(&a.clone()));
    }
}
