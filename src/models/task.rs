use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use uuid::Uuid;
use super::user::User;

// Sentinel stored in assignedUserName while a task has no assignee
pub const UNASSIGNED: &str = "unassigned";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub name: String,
    pub deadline: DateTime<Utc>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, with = "assigned_user")]
    pub assigned_user: Option<Uuid>,
    pub assigned_user_name: String,
    pub date_created: DateTime<Utc>,
}

impl Task {
    pub fn new(name: String, deadline: DateTime<Utc>, completed: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            deadline,
            completed,
            assigned_user: None,
            assigned_user_name: UNASSIGNED.to_string(),
            date_created: Utc::now(),
        }
    }

    pub fn assign(&mut self, user: &User) {
        self.assigned_user = Some(user.id);
        self.assigned_user_name = user.name.clone();
    }

    pub fn unassign(&mut self) {
        self.assigned_user = None;
        self.assigned_user_name = UNASSIGNED.to_string();
    }

    pub fn is_assigned_to(&self, user_id: &Uuid) -> bool {
        self.assigned_user.as_ref() == Some(user_id)
    }
}

// On the wire an unassigned task carries `assignedUser: ""`; null and a
// missing field are accepted on the way in.
mod assigned_user {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use uuid::Uuid;

    pub fn serialize<S: Serializer>(value: &Option<Uuid>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(id) => serializer.collect_str(id),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Uuid>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => Uuid::parse_str(s).map(Some).map_err(D::Error::custom),
        }
    }
}
