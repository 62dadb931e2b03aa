// In-memory fixture shared by the service tests.
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use crate::errors::StoreResult;
use crate::models::task::UNASSIGNED;
use crate::models::{Task, User, UserInput};
use super::memory_store::MemoryStore;
use super::store::{DocumentStore, WriteBatch};
use super::{TaskService, UserService};

pub struct Fixture {
    pub store: Arc<dyn DocumentStore>,
    pub tasks: TaskService,
    pub users: UserService,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    pub fn with_store(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            tasks: TaskService::new(store.clone()),
            users: UserService::new(store.clone()),
            store,
        }
    }

    pub async fn user(&self, id: &Uuid) -> User {
        self.store.find_user(id).await.unwrap().expect("user exists")
    }

    pub async fn task(&self, id: &Uuid) -> Task {
        self.store.find_task(id).await.unwrap().expect("task exists")
    }

    // Both sides of the assignment relation describe the same pairs
    pub async fn assert_consistent(&self) {
        let tasks = self.store.list_tasks().await.unwrap();
        let users = self.store.list_users().await.unwrap();

        for task in &tasks {
            match task.assigned_user {
                Some(user_id) => {
                    let user = users
                        .iter()
                        .find(|u| u.id == user_id)
                        .unwrap_or_else(|| panic!("task {} points at missing user {}", task.id, user_id));
                    assert!(user.has_pending(&task.id), "user {} misses task {}", user.id, task.id);
                    assert_eq!(task.assigned_user_name, user.name);
                }
                None => assert_eq!(task.assigned_user_name, UNASSIGNED),
            }
        }

        for user in &users {
            for task_id in &user.pending_tasks {
                let task = tasks
                    .iter()
                    .find(|t| t.id == *task_id)
                    .unwrap_or_else(|| panic!("user {} lists missing task {}", user.id, task_id));
                assert!(task.is_assigned_to(&user.id), "task {} not assigned to {}", task.id, user.id);
            }
        }
    }
}

pub async fn seed_user(fx: &Fixture, name: &str, email: &str) -> User {
    let created = fx
        .users
        .create(UserInput {
            name: Some(name.to_string()),
            email: Some(email.to_string()),
            ..UserInput::default()
        })
        .await
        .unwrap();
    fx.user(&created.id).await
}

type Action = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Read after which the racing write runs.
pub enum After {
    FindUser(Uuid),
    FindUserByEmail(String),
    TasksAssignedTo(Uuid),
}

/// Store wrapper that runs one competing write right after a chosen read,
/// between a service's validation and its commit.
pub struct RacingStore {
    inner: Arc<dyn DocumentStore>,
    after: After,
    action: Mutex<Option<Action>>,
}

impl RacingStore {
    pub fn new(
        inner: Arc<dyn DocumentStore>,
        after: After,
        action: impl Future<Output = ()> + Send + 'static,
    ) -> Self {
        Self {
            inner,
            after,
            action: Mutex::new(Some(Box::pin(action))),
        }
    }

    async fn fire(&self) {
        let action = self.action.lock().unwrap().take();
        if let Some(action) = action {
            action.await;
        }
    }
}

#[async_trait]
impl DocumentStore for RacingStore {
    async fn find_task(&self, id: &Uuid) -> StoreResult<Option<Task>> {
        self.inner.find_task(id).await
    }

    async fn find_user(&self, id: &Uuid) -> StoreResult<Option<User>> {
        let found = self.inner.find_user(id).await?;
        if matches!(&self.after, After::FindUser(target) if target == id) {
            self.fire().await;
        }
        Ok(found)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let found = self.inner.find_user_by_email(email).await?;
        if matches!(&self.after, After::FindUserByEmail(target) if target == email) {
            self.fire().await;
        }
        Ok(found)
    }

    async fn list_tasks(&self) -> StoreResult<Vec<Task>> {
        self.inner.list_tasks().await
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        self.inner.list_users().await
    }

    async fn tasks_assigned_to(&self, user_id: &Uuid) -> StoreResult<Vec<Task>> {
        let found = self.inner.tasks_assigned_to(user_id).await?;
        if matches!(&self.after, After::TasksAssignedTo(target) if target == user_id) {
            self.fire().await;
        }
        Ok(found)
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        self.inner.commit(batch).await
    }

    fn backend(&self) -> &'static str {
        self.inner.backend()
    }
}
