use actix_middleware::Authenticated;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use crypto_core::Action;
use error_types::ServiceError;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::events;
use crate::models::{CreateTaskRequest, Task, TaskChanges, TaskWithComments, UpdateTaskRequest};
use crate::state::AppState;

/// GET /api/tasks
pub async fn list_tasks(
    state: web::Data<AppState>,
    Authenticated(principal): Authenticated,
) -> Result<HttpResponse, ServiceError> {
    state.policy.authorize(&principal, &Action::Authenticated)?;
    Ok(HttpResponse::Ok().json(state.tasks.list_tasks().await))
}

/// GET /api/tasks/{id}, comments included
pub async fn get_task(
    state: web::Data<AppState>,
    Authenticated(principal): Authenticated,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    state.policy.authorize(&principal, &Action::Authenticated)?;

    let id = path.into_inner();
    let task = state
        .tasks
        .find_task(&id)
        .await
        .ok_or_else(|| ServiceError::NotFound(format!("Task {id}")))?;
    let comments = state.tasks.list_comments(&id).await?;

    Ok(HttpResponse::Ok().json(TaskWithComments { task, comments }))
}

/// POST /api/tasks
pub async fn create_task(
    state: web::Data<AppState>,
    Authenticated(principal): Authenticated,
    body: web::Json<CreateTaskRequest>,
) -> Result<HttpResponse, ServiceError> {
    state.policy.authorize(&principal, &Action::Authenticated)?;

    let body = body.into_inner();
    body.validate()?;

    let now = Utc::now();
    let task = state
        .tasks
        .insert_task(Task {
            id: Uuid::new_v4().to_string(),
            title: body.title,
            content: body.content,
            author_id: principal.subject_id().to_string(),
            author: principal.email().to_string(),
            created_at: now,
            updated_at: now,
        })
        .await;

    events::task_added(&state.broker, &task)?;
    tracing::info!(task_id = %task.id, author_id = %task.author_id, "Task created");

    Ok(HttpResponse::Created().json(task))
}

/// PUT /api/tasks/{id}
pub async fn update_task(
    state: web::Data<AppState>,
    Authenticated(principal): Authenticated,
    path: web::Path<String>,
    body: web::Json<UpdateTaskRequest>,
) -> Result<HttpResponse, ServiceError> {
    state.policy.authorize(&principal, &Action::Authenticated)?;

    let body = body.into_inner();
    body.validate()?;

    let task = state
        .tasks
        .update_task(
            &path.into_inner(),
            TaskChanges {
                title: body.title,
                content: body.content,
            },
        )
        .await?;

    events::task_updated(&state.broker, &task)?;
    tracing::info!(task_id = %task.id, updated_by = %principal.subject_id(), "Task updated");

    Ok(HttpResponse::Ok().json(task))
}

/// DELETE /api/tasks/{id}
pub async fn delete_task(
    state: web::Data<AppState>,
    Authenticated(principal): Authenticated,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    state.policy.authorize(&principal, &Action::Authenticated)?;

    let (task, comments) = state.tasks.delete_task(&path.into_inner()).await?;

    events::task_deleted(&state.broker, &task.id)?;
    tracing::info!(
        task_id = %task.id,
        deleted_by = %principal.subject_id(),
        comments_removed = comments.len(),
        "Task deleted"
    );

    Ok(HttpResponse::Ok().json(json!({
        "message": "Task deleted successfully",
        "id": task.id,
    })))
}
