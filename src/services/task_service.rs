use std::sync::Arc;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;
use crate::errors::{AppError, AppResult};
use crate::models::{parse_id, required, GetParams, ListParams, Task, TaskInput, User};
use super::query::{ListQuery, Projection, QueryOutput};
use super::store::{DocumentStore, WriteBatch};

// Owns Task writes and mirrors every assignment change into User.pendingTasks.
#[derive(Clone)]
pub struct TaskService {
    store: Arc<dyn DocumentStore>,
}

impl TaskService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self, params: &ListParams) -> AppResult<QueryOutput> {
        let query = ListQuery::from_params(params)?;
        let tasks = self.store.list_tasks().await?;
        tracing::debug!("Querying {} tasks", tasks.len());

        let docs = tasks
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(query.run(docs))
    }

    pub async fn get(&self, id: &str, params: &GetParams) -> AppResult<Value> {
        let id = parse_id(id, "task")?;
        let projection = Projection::from_param(params.select.as_deref())?;

        let task = self.find(&id).await?;
        let doc = serde_json::to_value(&task)?;
        Ok(match projection {
            Some(projection) => projection.apply(doc),
            None => doc,
        })
    }

    pub async fn create(&self, input: TaskInput) -> AppResult<Task> {
        let (name, deadline) = required_fields(&input)?;
        let assignee = self.resolve_assignee(input.assigned_user.as_deref()).await?;

        let mut task = Task::new(name, deadline, input.completed.unwrap_or(false));
        let mut batch = WriteBatch::new();
        if let Some(user) = &assignee {
            task.assign(user);
            batch.add_pending(user.id, task.id);
        }
        batch.put_task(task.clone());

        self.store.commit(batch).await?;
        tracing::info!("Created task {} (assigned to {})", task.id, task.assigned_user_name);
        Ok(task)
    }

    pub async fn update(&self, id: &str, input: TaskInput) -> AppResult<Task> {
        let id = parse_id(id, "task")?;
        let (name, deadline) = required_fields(&input)?;
        if input.date_created.is_some() {
            tracing::debug!("Ignoring dateCreated in update of task {}", id);
        }

        let existing = self.find(&id).await?;
        let assignee = self.resolve_assignee(input.assigned_user.as_deref()).await?;

        let mut task = existing.clone();
        task.name = name;
        task.deadline = deadline;
        task.completed = input.completed.unwrap_or(existing.completed);
        match &assignee {
            Some(user) => task.assign(user),
            None => task.unassign(),
        }

        let mut batch = WriteBatch::new();
        if let Some(previous) = existing.assigned_user {
            if task.assigned_user != Some(previous) {
                batch.remove_pending(previous, id);
            }
        }
        if let Some(user) = &assignee {
            batch.add_pending(user.id, id);
        }
        batch.put_task(task);

        self.store.commit(batch).await?;
        tracing::info!("Updated task {}", id);
        self.find(&id).await
    }

    pub async fn delete(&self, id: &str) -> AppResult<()> {
        let id = parse_id(id, "task")?;
        let task = self.find(&id).await?;

        let mut batch = WriteBatch::new();
        if let Some(user_id) = task.assigned_user {
            batch.remove_pending(user_id, id);
        }
        batch.delete_task(id);

        self.store.commit(batch).await?;
        tracing::info!("Deleted task {}", id);
        Ok(())
    }

    async fn find(&self, id: &Uuid) -> AppResult<Task> {
        self.store
            .find_task(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Task {} not found", id)))
    }

    // Empty or absent means unassigned; otherwise the user has to exist
    async fn resolve_assignee(&self, raw: Option<&str>) -> AppResult<Option<User>> {
        let raw = match raw.map(str::trim) {
            None | Some("") => return Ok(None),
            Some(raw) => raw,
        };
        let user_id = parse_id(raw, "assignedUser")?;
        let user = self
            .store
            .find_user(&user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Assigned user {} not found", user_id)))?;
        Ok(Some(user))
    }
}

fn required_fields(input: &TaskInput) -> AppResult<(String, DateTime<Utc>)> {
    let name = required(input.name.clone(), "name or deadline")?;
    let deadline = input
        .deadline
        .ok_or_else(|| AppError::validation("Missing name or deadline"))?;
    Ok((name, deadline))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::task::UNASSIGNED;
    use crate::services::testing::{seed_user, After, Fixture, RacingStore};

    fn input(name: &str, assigned_user: Option<&User>) -> TaskInput {
        TaskInput {
            name: Some(name.to_string()),
            deadline: Some(Utc::now()),
            assigned_user: assigned_user.map(|u| u.id.to_string()),
            ..TaskInput::default()
        }
    }

    #[tokio::test]
    async fn create_assigned_task_adds_it_to_pending_once() {
        let fx = Fixture::new();
        let user = seed_user(&fx, "Ada", "ada@example.com").await;

        let task = fx.tasks.create(input("A", Some(&user))).await.unwrap();
        assert_eq!(task.assigned_user, Some(user.id));
        assert_eq!(task.assigned_user_name, "Ada");

        let user = fx.user(&user.id).await;
        assert_eq!(user.pending_tasks, vec![task.id]);
        fx.assert_consistent().await;
    }

    #[tokio::test]
    async fn create_validates_input() {
        let fx = Fixture::new();

        let err = fx.tasks.create(TaskInput { name: Some("x".into()), ..TaskInput::default() }).await;
        assert!(matches!(err, Err(AppError::Validation(_))));

        let err = fx.tasks.create(input("   ", None)).await;
        assert!(matches!(err, Err(AppError::Validation(_))));

        let mut bad = input("x", None);
        bad.assigned_user = Some("not-an-id".into());
        assert!(matches!(fx.tasks.create(bad).await, Err(AppError::Validation(_))));

        let mut missing = input("x", None);
        missing.assigned_user = Some(Uuid::new_v4().to_string());
        assert!(matches!(fx.tasks.create(missing).await, Err(AppError::NotFound(_))));

        assert!(fx.store.list_tasks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_assignee_means_unassigned() {
        let fx = Fixture::new();
        let mut data = input("x", None);
        data.assigned_user = Some("".into());

        let task = fx.tasks.create(data).await.unwrap();
        assert_eq!(task.assigned_user, None);
        assert_eq!(task.assigned_user_name, UNASSIGNED);
    }

    #[tokio::test]
    async fn reassignment_moves_membership() {
        let fx = Fixture::new();
        let a = seed_user(&fx, "A", "a@example.com").await;
        let b = seed_user(&fx, "B", "b@example.com").await;
        let task = fx.tasks.create(input("T", Some(&a))).await.unwrap();

        let updated = fx.tasks.update(&task.id.to_string(), input("T", Some(&b))).await.unwrap();
        assert_eq!(updated.assigned_user, Some(b.id));
        assert_eq!(updated.assigned_user_name, "B");
        assert!(fx.user(&a.id).await.pending_tasks.is_empty());
        assert_eq!(fx.user(&b.id).await.pending_tasks, vec![task.id]);
        fx.assert_consistent().await;

        let updated = fx.tasks.update(&task.id.to_string(), input("T", None)).await.unwrap();
        assert_eq!(updated.assigned_user, None);
        assert_eq!(updated.assigned_user_name, "unassigned");
        assert!(fx.user(&b.id).await.pending_tasks.is_empty());
        fx.assert_consistent().await;
    }

    #[tokio::test]
    async fn update_same_assignee_does_not_duplicate() {
        let fx = Fixture::new();
        let a = seed_user(&fx, "A", "a@example.com").await;
        let task = fx.tasks.create(input("T", Some(&a))).await.unwrap();

        let mut data = input("T2", Some(&a));
        data.completed = Some(true);
        let updated = fx.tasks.update(&task.id.to_string(), data).await.unwrap();
        assert!(updated.completed);
        assert_eq!(updated.name, "T2");
        assert_eq!(fx.user(&a.id).await.pending_tasks, vec![task.id]);
    }

    #[tokio::test]
    async fn update_keeps_date_created_and_completed() {
        let fx = Fixture::new();
        let mut data = input("T", None);
        data.completed = Some(true);
        let task = fx.tasks.create(data).await.unwrap();

        let mut data = input("T", None);
        data.date_created = Some(serde_json::json!("1999-01-01T00:00:00Z"));
        let updated = fx.tasks.update(&task.id.to_string(), data).await.unwrap();
        assert_eq!(updated.date_created, task.date_created);
        assert!(updated.completed);
    }

    #[tokio::test]
    async fn update_errors() {
        let fx = Fixture::new();
        let task = fx.tasks.create(input("T", None)).await.unwrap();

        let err = fx.tasks.update("bogus", input("T", None)).await;
        assert!(matches!(err, Err(AppError::Validation(_))));

        let err = fx.tasks.update(&task.id.to_string(), TaskInput::default()).await;
        assert!(matches!(err, Err(AppError::Validation(_))));

        let err = fx.tasks.update(&Uuid::new_v4().to_string(), input("T", None)).await;
        assert!(matches!(err, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn delete_removes_membership() {
        let fx = Fixture::new();
        let a = seed_user(&fx, "A", "a@example.com").await;
        let kept = fx.tasks.create(input("keep", Some(&a))).await.unwrap();
        let gone = fx.tasks.create(input("gone", Some(&a))).await.unwrap();

        fx.tasks.delete(&gone.id.to_string()).await.unwrap();
        assert_eq!(fx.user(&a.id).await.pending_tasks, vec![kept.id]);
        assert!(fx.store.find_task(&gone.id).await.unwrap().is_none());
        fx.assert_consistent().await;

        let err = fx.tasks.delete(&gone.id.to_string()).await;
        assert!(matches!(err, Err(AppError::NotFound(_))));
        assert!(matches!(fx.tasks.delete("nope").await, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn delete_unassigned_task_leaves_users_alone() {
        let fx = Fixture::new();
        let a = seed_user(&fx, "A", "a@example.com").await;
        let task = fx.tasks.create(input("T", None)).await.unwrap();

        fx.tasks.delete(&task.id.to_string()).await.unwrap();
        assert_eq!(fx.user(&a.id).await, a);
    }

    #[tokio::test]
    async fn get_and_list() {
        let fx = Fixture::new();
        let task = fx.tasks.create(input("T", None)).await.unwrap();
        fx.tasks.create(input("U", None)).await.unwrap();

        let doc = fx
            .tasks
            .get(&task.id.to_string(), &GetParams { select: Some(r#"{"name": 1}"#.into()) })
            .await
            .unwrap();
        assert_eq!(doc, serde_json::json!({"_id": task.id.to_string(), "name": "T"}));

        let err = fx.tasks.get(&Uuid::new_v4().to_string(), &GetParams::default()).await;
        assert!(matches!(err, Err(AppError::NotFound(_))));

        let params = ListParams { count: Some("true".into()), ..ListParams::default() };
        assert_eq!(fx.tasks.list(&params).await.unwrap(), QueryOutput::Count(2));
    }

    #[tokio::test]
    async fn assignee_deleted_before_commit_is_not_found() {
        let fx = Fixture::new();
        let ada = seed_user(&fx, "Ada", "ada@example.com").await;
        let users = fx.users.clone();
        let id = ada.id.to_string();
        let store = RacingStore::new(fx.store.clone(), After::FindUser(ada.id), async move {
            users.delete(&id).await.unwrap();
        });
        let tasks = TaskService::new(Arc::new(store));

        let err = tasks.create(input("T", Some(&ada))).await;
        assert!(matches!(err, Err(AppError::NotFound(_))));
        assert!(fx.store.list_tasks().await.unwrap().is_empty());
        assert!(fx.store.find_user(&ada.id).await.unwrap().is_none());
        fx.assert_consistent().await;
    }

    #[tokio::test]
    async fn reassignment_to_deleted_user_keeps_old_owner() {
        let fx = Fixture::new();
        let a = seed_user(&fx, "A", "a@example.com").await;
        let b = seed_user(&fx, "B", "b@example.com").await;
        let task = fx.tasks.create(input("T", Some(&a))).await.unwrap();

        let users = fx.users.clone();
        let id = b.id.to_string();
        let store = RacingStore::new(fx.store.clone(), After::FindUser(b.id), async move {
            users.delete(&id).await.unwrap();
        });
        let tasks = TaskService::new(Arc::new(store));

        let err = tasks.update(&task.id.to_string(), input("T", Some(&b))).await;
        assert!(matches!(err, Err(AppError::NotFound(_))));
        assert_eq!(fx.task(&task.id).await.assigned_user, Some(a.id));
        assert_eq!(fx.user(&a.id).await.pending_tasks, vec![task.id]);
        fx.assert_consistent().await;
    }
}
