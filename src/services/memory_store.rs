use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;
use crate::errors::{StoreError, StoreResult};
use crate::models::{Task, User};
use super::store::{DocumentStore, WriteBatch, WriteOp};

#[derive(Default)]
struct Collections {
    tasks: HashMap<Uuid, Task>,
    users: HashMap<Uuid, User>,
}

// In-process DocumentStore. A batch is checked and applied under one write
// lock, so readers never observe half of it.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Collections {
    fn email_owner(&self, email: &str) -> Option<Uuid> {
        self.users.values().find(|u| u.email == email).map(|u| u.id)
    }

    // Walks the batch in order against the current state plus the batch's own
    // earlier ops. Nothing is written here.
    fn check(&self, ops: &[WriteOp]) -> StoreResult<()> {
        let mut present: HashMap<Uuid, bool> = HashMap::new();
        let mut removed: HashMap<Uuid, HashSet<Uuid>> = HashMap::new();
        let mut owners: HashMap<&str, Option<Uuid>> = HashMap::new();

        for op in ops {
            match op {
                WriteOp::ExpectUser(id) | WriteOp::AddPending { user_id: id, .. } => {
                    let exists = present
                        .get(id)
                        .copied()
                        .unwrap_or_else(|| self.users.contains_key(id));
                    if !exists {
                        return Err(StoreError::MissingUser(*id));
                    }
                }
                WriteOp::RemovePending { user_id, task_id } => {
                    removed.entry(*user_id).or_default().insert(*task_id);
                }
                WriteOp::PutUser(user) => {
                    let owner = match owners.get(user.email.as_str()) {
                        Some(owner) => *owner,
                        None => self.email_owner(&user.email),
                    };
                    if owner.map_or(false, |owner| owner != user.id) {
                        return Err(StoreError::EmailTaken(user.email.clone()));
                    }
                    owners.insert(&user.email, Some(user.id));
                    present.insert(user.id, true);
                }
                WriteOp::DeleteUser { id, email } => {
                    if let Some(user) = self.users.get(id) {
                        let gone = removed.get(id);
                        let left = user
                            .pending_tasks
                            .iter()
                            .any(|t| !gone.map_or(false, |gone| gone.contains(t)));
                        if left {
                            return Err(StoreError::PendingChanged(*id));
                        }
                    }
                    present.insert(*id, false);
                    owners.insert(email, None);
                }
                WriteOp::ReleaseEmail(email) => {
                    owners.insert(email, None);
                }
                WriteOp::PutTask(_) | WriteOp::DeleteTask(_) => {}
            }
        }
        Ok(())
    }

    fn apply(&mut self, op: WriteOp) {
        match op {
            WriteOp::PutTask(task) => {
                self.tasks.insert(task.id, task);
            }
            WriteOp::DeleteTask(id) => {
                self.tasks.remove(&id);
            }
            WriteOp::PutUser(user) => match self.users.get_mut(&user.id) {
                Some(existing) => {
                    existing.name = user.name;
                    existing.email = user.email;
                    existing.date_created = user.date_created;
                }
                None => {
                    self.users.insert(user.id, User { pending_tasks: Vec::new(), ..user });
                }
            },
            WriteOp::DeleteUser { id, .. } => {
                self.users.remove(&id);
            }
            WriteOp::AddPending { user_id, task_id } => {
                if let Some(user) = self.users.get_mut(&user_id) {
                    user.add_pending(task_id);
                }
            }
            WriteOp::RemovePending { user_id, task_id } => {
                if let Some(user) = self.users.get_mut(&user_id) {
                    user.remove_pending(&task_id);
                }
            }
            // Emails are looked up by scanning users, there is no index to clean
            WriteOp::ReleaseEmail(_) | WriteOp::ExpectUser(_) => {}
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_task(&self, id: &Uuid) -> StoreResult<Option<Task>> {
        Ok(self.inner.read().await.tasks.get(id).cloned())
    }

    async fn find_user(&self, id: &Uuid) -> StoreResult<Option<User>> {
        Ok(self.inner.read().await.users.get(id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner.users.values().find(|u| u.email == email).cloned())
    }

    async fn list_tasks(&self) -> StoreResult<Vec<Task>> {
        Ok(self.inner.read().await.tasks.values().cloned().collect())
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        Ok(self.inner.read().await.users.values().cloned().collect())
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        tracing::debug!("Committing batch of {} ops", batch.len());
        if let Err(e) = inner.check(batch.ops()) {
            tracing::warn!("Batch rejected: {}", e);
            return Err(e);
        }
        for op in batch.into_ops() {
            inner.apply(op);
        }
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
