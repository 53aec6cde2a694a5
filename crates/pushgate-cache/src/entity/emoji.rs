use pushgate_core::Id;
use serde::{Deserialize, Serialize};

use super::User;
use crate::{
    compare::{opt_eq_by, seq_eq_by},
    diff::Entity,
};

/// Custom guild emoji.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emoji {
    pub id: Id,
    #[serde(default)]
    pub name: Option<String>,
    /// Roles allowed to use the emoji.
    #[serde(default)]
    pub roles: Vec<Id>,
    /// Uploader.
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub require_colons: Option<bool>,
    #[serde(default)]
    pub managed: Option<bool>,
    #[serde(default)]
    pub animated: Option<bool>,
    #[serde(default)]
    pub available: Option<bool>,
}

impl Entity for Emoji {
    type Key = Id;

    fn key(&self) -> Id {
        self.id
    }

    fn same_as(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && seq_eq_by(&self.roles, &other.roles, |a, b| a == b)
            && opt_eq_by(self.user.as_ref(), other.user.as_ref(), User::same_user)
            && self.require_colons == other.require_colons
            && self.managed == other.managed
            && self.animated == other.animated
            && self.available == other.available
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn emoji() -> Emoji {
        serde_json::from_value(json!({
            "id": "41771983429993937",
            "name": "LUL",
            "roles": ["41771983429993000"],
            "user": {"id": "96008815106887111", "username": "Luigi"},
            "require_colons": true,
            "managed": false,
            "animated": false,
        }))
        .unwrap()
    }

    #[test]
    fn test_uploader_compared_by_id() {
        let a = emoji();
        let mut b = emoji();
        b.user.as_mut().unwrap().username = Some("renamed".into());
        assert!(a.same_as(&b));

        b.user = None;
        assert!(!a.same_as(&b));
    }

    #[test]
    fn test_absent_flag_differs_from_false() {
        let a = emoji();
        let mut b = emoji();
        assert_eq!(a.available, None);
        b.available = Some(false);
        assert!(!a.same_as(&b));
    }

    #[test]
    fn test_role_order_matters() {
        let mut a = emoji();
        let mut b = emoji();
        a.roles = vec![Id::new(1), Id::new(2)];
        b.roles = vec![Id::new(2), Id::new(1)];
        assert!(!a.same_as(&b));
    }
}
