use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub pending_tasks: Vec<Uuid>,  // set semantics, order not significant
    pub date_created: DateTime<Utc>,
}

impl User {
    pub fn new(name: String, email: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            email,
            pending_tasks: Vec::new(),
            date_created: Utc::now(),
        }
    }

    pub fn has_pending(&self, task_id: &Uuid) -> bool {
        self.pending_tasks.contains(task_id)
    }

    // Set-add; returns false when the id was already present
    pub fn add_pending(&mut self, task_id: Uuid) -> bool {
        if self.has_pending(&task_id) {
            return false;
        }
        self.pending_tasks.push(task_id);
        true
    }

    pub fn remove_pending(&mut self, task_id: &Uuid) -> bool {
        let before = self.pending_tasks.len();
        self.pending_tasks.retain(|t| t != task_id);
        before != self.pending_tasks.len()
    }
}
