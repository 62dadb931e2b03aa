use std::collections::HashSet;
use std::sync::Arc;
use serde_json::Value;
use uuid::Uuid;
use crate::errors::{AppError, AppResult};
use crate::models::{parse_id, required, GetParams, ListParams, Task, User, UserInput};
use super::query::{ListQuery, Projection, QueryOutput};
use super::store::{DocumentStore, WriteBatch};

// Owns User writes, email uniqueness, and the Task side of pendingTasks edits.
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn DocumentStore>,
}

impl UserService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self, params: &ListParams) -> AppResult<QueryOutput> {
        let query = ListQuery::from_params(params)?;
        let users = self.store.list_users().await?;
        tracing::debug!("Querying {} users", users.len());

        let docs = users
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(query.run(docs))
    }

    pub async fn get(&self, id: &str, params: &GetParams) -> AppResult<Value> {
        let id = parse_id(id, "user")?;
        let projection = Projection::from_param(params.select.as_deref())?;

        let user = self.find(&id).await?;
        let doc = serde_json::to_value(&user)?;
        Ok(match projection {
            Some(projection) => projection.apply(doc),
            None => doc,
        })
    }

    pub async fn create(&self, input: UserInput) -> AppResult<User> {
        let (name, email) = required_fields(&input)?;
        if input.pending_tasks.as_ref().map_or(false, |p| !p.is_empty()) {
            tracing::debug!("Ignoring pendingTasks on user creation");
        }

        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(AppError::Duplicate(format!("Email {} already exists", email)));
        }

        let user = User::new(name, email);
        let mut batch = WriteBatch::new();
        batch.put_user(user.clone());

        self.store.commit(batch).await?;
        tracing::info!("Created user {} <{}>", user.id, user.email);
        Ok(user)
    }

    pub async fn update(&self, id: &str, input: UserInput) -> AppResult<User> {
        let id = parse_id(id, "user")?;
        let (name, email) = required_fields(&input)?;
        if input.date_created.is_some() {
            tracing::debug!("Ignoring dateCreated in update of user {}", id);
        }

        let existing = self.find(&id).await?;
        if let Some(other) = self.store.find_user_by_email(&email).await? {
            if other.id != id {
                return Err(AppError::Duplicate(format!("Email {} already exists", email)));
            }
        }

        // The tasks this user should hold once the update lands
        let desired = match input.pending_tasks {
            Some(raw) => self.validate_pending(&id, raw).await?,
            None => self.current_tasks(&existing).await?,
        };

        let mut user = existing.clone();
        user.name = name;
        user.email = email;

        let mut batch = WriteBatch::new();
        batch.expect_user(id);
        let desired_ids: HashSet<Uuid> = desired.iter().map(|t| t.id).collect();

        // Dropped from the list: unassign
        for task_id in existing.pending_tasks.iter().filter(|t| !desired_ids.contains(*t)) {
            batch.remove_pending(id, *task_id);
            if let Some(mut task) = self.store.find_task(task_id).await? {
                if task.is_assigned_to(&id) {
                    task.unassign();
                    batch.put_task(task);
                }
            }
        }

        // Added, or kept under a possibly new name
        for mut task in desired {
            if !existing.has_pending(&task.id) {
                batch.add_pending(id, task.id);
            }
            if !task.is_assigned_to(&id) || task.assigned_user_name != user.name {
                task.assign(&user);
                batch.put_task(task);
            }
        }

        if user.email != existing.email {
            batch.release_email(existing.email.clone());
        }
        batch.put_user(user);

        self.store.commit(batch).await?;
        tracing::info!("Updated user {}", id);
        self.find(&id).await
    }

    pub async fn delete(&self, id: &str) -> AppResult<()> {
        let id = parse_id(id, "user")?;
        let user = self.find(&id).await?;

        // DeleteUser only commits when every pending id is removed in this batch
        let mut batch = WriteBatch::new();
        for task_id in &user.pending_tasks {
            batch.remove_pending(id, *task_id);
        }
        let mut cleared = 0;
        for mut task in self.store.tasks_assigned_to(&id).await? {
            if !user.has_pending(&task.id) {
                batch.remove_pending(id, task.id);
            }
            task.unassign();
            batch.put_task(task);
            cleared += 1;
        }
        batch.delete_user(id, user.email);

        self.store.commit(batch).await?;
        tracing::info!("Deleted user {} and unassigned {} tasks", id, cleared);
        Ok(())
    }

    async fn find(&self, id: &Uuid) -> AppResult<User> {
        self.store
            .find_user(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))
    }

    // Tasks behind the stored pendingTasks, skipping ids whose task is gone
    async fn current_tasks(&self, user: &User) -> AppResult<Vec<Task>> {
        let mut tasks = Vec::with_capacity(user.pending_tasks.len());
        for task_id in &user.pending_tasks {
            match self.store.find_task(task_id).await? {
                Some(task) => tasks.push(task),
                None => tracing::warn!("User {} lists missing task {}", user.id, task_id),
            }
        }
        Ok(tasks)
    }

    // Deduplicates and checks every requested task before anything is written
    async fn validate_pending(&self, user_id: &Uuid, raw: Vec<String>) -> AppResult<Vec<Task>> {
        let mut seen = HashSet::new();
        let mut tasks = Vec::with_capacity(raw.len());

        for raw_id in raw {
            let task_id = parse_id(&raw_id, "task")?;
            if !seen.insert(task_id) {
                continue;
            }

            let task = self
                .store
                .find_task(&task_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Task {} not found", task_id)))?;

            if task.completed {
                return Err(AppError::Conflict(format!(
                    "Task {} is already completed and cannot be assigned", task_id
                )));
            }
            if let Some(owner) = task.assigned_user {
                if owner != *user_id {
                    return Err(AppError::Conflict(format!(
                        "Task {} is already assigned to another user", task_id
                    )));
                }
            }
            tasks.push(task);
        }
        Ok(tasks)
    }
}

fn required_fields(input: &UserInput) -> AppResult<(String, String)> {
    let name = required(input.name.clone(), "name or email")?;
    let email = required(input.email.clone(), "name or email")?;
    Ok((name, email))
}
