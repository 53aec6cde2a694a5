use pushgate_core::Id;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::User;
use crate::{
    compare::{opt_seq_eq_by, seq_eq_by},
    diff::Entity,
    synth::parse_members,
};

/// Online status of a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnlineStatus {
    Online,
    Dnd,
    Idle,
    Invisible,
    #[default]
    Offline,
}

/// Per-platform status. A platform is absent when the user is not active on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientStatus {
    #[serde(default)]
    pub desktop: Option<OnlineStatus>,
    #[serde(default)]
    pub mobile: Option<OnlineStatus>,
    #[serde(default)]
    pub web: Option<OnlineStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityTimestamps {
    #[serde(default)]
    pub start: Option<u64>,
    #[serde(default)]
    pub end: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEmoji {
    pub name: String,
    #[serde(default)]
    pub id: Option<Id>,
    #[serde(default)]
    pub animated: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityParty {
    #[serde(default)]
    pub id: Option<String>,
    /// Current and maximum size.
    #[serde(default)]
    pub size: Option<[u32; 2]>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityAssets {
    #[serde(default)]
    pub large_image: Option<String>,
    #[serde(default)]
    pub large_text: Option<String>,
    #[serde(default)]
    pub small_image: Option<String>,
    #[serde(default)]
    pub small_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivitySecrets {
    #[serde(default)]
    pub join: Option<String>,
    #[serde(default)]
    pub spectate: Option<String>,
    #[serde(default, rename = "match")]
    pub match_secret: Option<String>,
}

/// One entry in a presence's activity list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub created_at: Option<u64>,
    #[serde(default)]
    pub timestamps: Option<ActivityTimestamps>,
    #[serde(default)]
    pub application_id: Option<Id>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub emoji: Option<ActivityEmoji>,
    #[serde(default)]
    pub party: Option<ActivityParty>,
    #[serde(default)]
    pub assets: Option<ActivityAssets>,
    #[serde(default)]
    pub secrets: Option<ActivitySecrets>,
    #[serde(default)]
    pub instance: Option<bool>,
    #[serde(default)]
    pub flags: Option<u32>,
    /// Button labels.
    #[serde(default)]
    pub buttons: Option<Vec<String>>,
}

impl Entity for Activity {
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
    }

    // created_at changes on every restart of the same activity
    fn same_as(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.kind == other.kind
            && self.url == other.url
            && self.timestamps == other.timestamps
            && self.application_id == other.application_id
            && self.details == other.details
            && self.state == other.state
            && self.emoji == other.emoji
            && self.party == other.party
            && self.assets == other.assets
            && self.secrets == other.secrets
            && self.instance == other.instance
            && self.flags == other.flags
            && opt_seq_eq_by(self.buttons.as_deref(), other.buttons.as_deref(), |a, b| a == b)
    }
}

/// A user's presence within a guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    pub user: User,
    #[serde(default)]
    pub guild_id: Option<Id>,
    #[serde(default)]
    pub status: OnlineStatus,
    /// Malformed activities are dropped, the rest are kept.
    #[serde(default, deserialize_with = "lenient_activities")]
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub client_status: ClientStatus,
}

impl Entity for Presence {
    type Key = Id;

    fn key(&self) -> Id {
        self.user.id
    }

    /// Changed when the status, the client status, or any activity changed,
    /// started or stopped.
    fn same_as(&self, other: &Self) -> bool {
        self.user.same_user(&other.user)
            && self.status == other.status
            && self.client_status == other.client_status
            && seq_eq_by(&self.activities, &other.activities, Activity::same_as)
    }
}

fn lenient_activities<'de, D>(deserializer: D) -> Result<Vec<Activity>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(parse_members("activity", raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn activity(id: &str, name: &str) -> Activity {
        serde_json::from_value(json!({"id": id, "name": name, "type": 0})).unwrap()
    }

    fn presence(activities: Vec<Activity>) -> Presence {
        Presence {
            user: User {
                id: Id::new(7),
                username: None,
            },
            guild_id: Some(Id::new(1)),
            status: OnlineStatus::Online,
            activities,
            client_status: ClientStatus::default(),
        }
    }

    #[test]
    fn test_status_wire_names() {
        let status: OnlineStatus = serde_json::from_value(json!("dnd")).unwrap();
        assert_eq!(status, OnlineStatus::Dnd);
        let client: ClientStatus = serde_json::from_value(json!({"web": "idle"})).unwrap();
        assert_eq!(client.web, Some(OnlineStatus::Idle));
        assert_eq!(client.desktop, None);
    }

    #[test]
    fn test_activity_created_at_is_ignored() {
        let a = activity("a1", "Game");
        let mut b = a.clone();
        b.created_at = Some(1_700_000_000_000);
        assert!(a.same_as(&b));

        b.timestamps = Some(ActivityTimestamps {
            start: Some(1),
            end: None,
        });
        assert!(!a.same_as(&b));
    }

    #[test]
    fn test_started_activity_changes_presence() {
        let old = presence(vec![activity("a1", "Game")]);
        let new = presence(vec![activity("a1", "Game"), activity("a2", "Music")]);
        assert!(!old.same_as(&new));
        assert!(old.same_as(&old.clone()));
    }

    #[test]
    fn test_activity_requires_id() {
        assert!(serde_json::from_value::<Activity>(json!({"name": "x", "type": 0})).is_err());
    }

    #[test]
    fn test_malformed_activity_is_dropped() {
        let presence: Presence = serde_json::from_value(json!({
            "user": {"id": "7"},
            "status": "online",
            "activities": [
                {"name": "no id", "type": 0},
                {"id": "a1", "name": "Game", "type": 0},
            ],
        }))
        .unwrap();
        assert_eq!(presence.activities.len(), 1);
        assert_eq!(presence.activities[0].id, "a1");

        let presence: Presence =
            serde_json::from_value(json!({"user": {"id": "7"}, "activities": null})).unwrap();
        assert!(presence.activities.is_empty());
    }
}
