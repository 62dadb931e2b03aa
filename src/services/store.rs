//! Document store seam.
//!
//! The consistency managers never write record-by-record. They read what they
//! need, validate, and then hand the store a [`WriteBatch`] that must be
//! applied atomically: either every Task/User side effect of a request lands,
//! or none does.
//!
//! Reads happen before the batch is built, so some ops also carry a
//! precondition that the store re-checks inside the commit. If any fails the
//! whole batch is rejected:
//!
//! - `ExpectUser` and `AddPending` need the user to exist.
//! - `PutUser` needs its email to be free or already owned by the same user.
//! - `DeleteUser` needs every pending task of the user to be removed earlier
//!   in the same batch.

use async_trait::async_trait;
use uuid::Uuid;
use crate::errors::StoreResult;
use crate::models::{Task, User};

/// A single mutation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Insert or fully replace a task document.
    PutTask(Task),
    DeleteTask(Uuid),
    /// Insert or replace a user's profile (name, email, dateCreated) and index
    /// its email. Never touches pending-task membership: a new user starts
    /// with none, and it only changes through `AddPending`/`RemovePending`.
    PutUser(User),
    /// Remove a user, its membership set, and its email index entry.
    DeleteUser { id: Uuid, email: String },
    /// Writes nothing; fails the batch if the user is gone.
    ExpectUser(Uuid),
    AddPending { user_id: Uuid, task_id: Uuid },
    RemovePending { user_id: Uuid, task_id: Uuid },
    /// Drop an email index entry that a user no longer owns.
    ReleaseEmail(String),
}

/// Ordered list of writes committed as one unit.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_task(&mut self, task: Task) -> &mut Self {
        self.ops.push(WriteOp::PutTask(task));
        self
    }

    pub fn delete_task(&mut self, id: Uuid) -> &mut Self {
        self.ops.push(WriteOp::DeleteTask(id));
        self
    }

    pub fn put_user(&mut self, user: User) -> &mut Self {
        self.ops.push(WriteOp::PutUser(user));
        self
    }

    pub fn delete_user(&mut self, id: Uuid, email: String) -> &mut Self {
        self.ops.push(WriteOp::DeleteUser { id, email });
        self
    }

    pub fn expect_user(&mut self, id: Uuid) -> &mut Self {
        self.ops.push(WriteOp::ExpectUser(id));
        self
    }

    pub fn add_pending(&mut self, user_id: Uuid, task_id: Uuid) -> &mut Self {
        self.ops.push(WriteOp::AddPending { user_id, task_id });
        self
    }

    pub fn remove_pending(&mut self, user_id: Uuid, task_id: Uuid) -> &mut Self {
        self.ops.push(WriteOp::RemovePending { user_id, task_id });
        self
    }

    pub fn release_email(&mut self, email: String) -> &mut Self {
        self.ops.push(WriteOp::ReleaseEmail(email));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// Persistence collaborator for the two collections.
///
/// Implementations must be thread-safe. `commit` must be atomic and must
/// enforce the batch preconditions inside the same critical section.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_task(&self, id: &Uuid) -> StoreResult<Option<Task>>;

    async fn find_user(&self, id: &Uuid) -> StoreResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Every task, in no particular order.
    async fn list_tasks(&self) -> StoreResult<Vec<Task>>;

    /// Every user, in no particular order.
    async fn list_users(&self) -> StoreResult<Vec<User>>;

    async fn tasks_assigned_to(&self, user_id: &Uuid) -> StoreResult<Vec<Task>> {
        let tasks = self.list_tasks().await?;
        Ok(tasks.into_iter().filter(|t| t.is_assigned_to(user_id)).collect())
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()>;

    /// Short backend name, reported by the index endpoint.
    fn backend(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_keeps_insertion_order() {
        let user_id = Uuid::new_v4();
        let task_id = Uuid::new_v4();

        let mut batch = WriteBatch::new();
        assert!(batch.is_empty());
        batch
            .remove_pending(user_id, task_id)
            .delete_task(task_id)
            .release_email("old@example.com".into());

        assert_eq!(batch.len(), 3);
        assert_eq!(
            batch.into_ops(),
            vec![
                WriteOp::RemovePending { user_id, task_id },
                WriteOp::DeleteTask(task_id),
                WriteOp::ReleaseEmail("old@example.com".into()),
            ]
        );
    }
}
