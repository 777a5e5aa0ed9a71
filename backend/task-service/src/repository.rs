use async_trait::async_trait;
use chrono::Utc;
use error_types::ServiceError;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::models::{Comment, Task, TaskChanges};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("task {0} not found")]
    TaskNotFound(String),
    #[error("comment {0} not found")]
    CommentNotFound(String),
}

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::TaskNotFound(id) => ServiceError::NotFound(format!("Task {id}")),
            RepositoryError::CommentNotFound(id) => ServiceError::NotFound(format!("Comment {id}")),
        }
    }
}

/// Task and comment storage. Comments belong to exactly one task and go
/// away with it.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn list_tasks(&self) -> Vec<Task>;
    async fn find_task(&self, id: &str) -> Option<Task>;
    async fn insert_task(&self, task: Task) -> Task;
    async fn update_task(&self, id: &str, changes: TaskChanges) -> Result<Task, RepositoryError>;
    /// Removes the task and returns it along with its removed comments
    async fn delete_task(&self, id: &str) -> Result<(Task, Vec<Comment>), RepositoryError>;

    async fn list_comments(&self, task_id: &str) -> Result<Vec<Comment>, RepositoryError>;
    async fn insert_comment(&self, comment: Comment) -> Result<Comment, RepositoryError>;
    async fn delete_comment(&self, id: &str) -> Result<Comment, RepositoryError>;
}

#[derive(Default)]
struct Store {
    tasks: Vec<Task>,
    comments: Vec<Comment>,
}

/// In-process store. One lock covers both collections so a cascading
/// delete is atomic.
#[derive(Default)]
pub struct InMemoryTaskRepository {
    store: RwLock<Store>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn list_tasks(&self) -> Vec<Task> {
        self.store.read().await.tasks.clone()
    }

    async fn find_task(&self, id: &str) -> Option<Task> {
        self.store.read().await.tasks.iter().find(|t| t.id == id).cloned()
    }

    async fn insert_task(&self, task: Task) -> Task {
        self.store.write().await.tasks.push(task.clone());
        task
    }

    async fn update_task(&self, id: &str, changes: TaskChanges) -> Result<Task, RepositoryError> {
        let mut store = self.store.write().await;
        let task = store
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| RepositoryError::TaskNotFound(id.to_string()))?;

        if let Some(title) = changes.title {
            task.title = title;
        }
        if let Some(content) = changes.content {
            task.content = content;
        }
        task.updated_at = Utc::now();

        Ok(task.clone())
    }

    async fn delete_task(&self, id: &str) -> Result<(Task, Vec<Comment>), RepositoryError> {
        let mut store = self.store.write().await;
        let index = store
            .tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| RepositoryError::TaskNotFound(id.to_string()))?;
        let task = store.tasks.remove(index);

        let (removed, kept) = std::mem::take(&mut store.comments)
            .into_iter()
            .partition(|c| c.task_id == id);
        store.comments = kept;

        Ok((task, removed))
    }

    async fn list_comments(&self, task_id: &str) -> Result<Vec<Comment>, RepositoryError> {
        let store = self.store.read().await;
        if !store.tasks.iter().any(|t| t.id == task_id) {
            return Err(RepositoryError::TaskNotFound(task_id.to_string()));
        }
        Ok(store
            .comments
            .iter()
            .filter(|c| c.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn insert_comment(&self, comment: Comment) -> Result<Comment, RepositoryError> {
        let mut store = self.store.write().await;
        if !store.tasks.iter().any(|t| t.id == comment.task_id) {
            return Err(RepositoryError::TaskNotFound(comment.task_id));
        }
        store.comments.push(comment.clone());
        Ok(comment)
    }

    async fn delete_comment(&self, id: &str) -> Result<Comment, RepositoryError> {
        let mut store = self.store.write().await;
        let index = store
            .comments
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| RepositoryError::CommentNotFound(id.to_string()))?;
        Ok(store.comments.remove(index))
    }
}
