use actix_middleware::Authenticated;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use crypto_core::Action;
use error_types::ServiceError;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::events;
use crate::models::{Comment, CreateCommentRequest};
use crate::state::AppState;

/// GET /api/tasks/{id}/comments
pub async fn list_comments(
    state: web::Data<AppState>,
    Authenticated(principal): Authenticated,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    state.policy.authorize(&principal, &Action::Authenticated)?;
    let comments = state.tasks.list_comments(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(comments))
}

/// POST /api/tasks/{id}/comments
pub async fn create_comment(
    state: web::Data<AppState>,
    Authenticated(principal): Authenticated,
    path: web::Path<String>,
    body: web::Json<CreateCommentRequest>,
) -> Result<HttpResponse, ServiceError> {
    state.policy.authorize(&principal, &Action::Authenticated)?;

    let body = body.into_inner();
    body.validate()?;

    let comment = state
        .tasks
        .insert_comment(Comment {
            id: Uuid::new_v4().to_string(),
            task_id: path.into_inner(),
            content: body.content,
            author_id: principal.subject_id().to_string(),
            author: principal.email().to_string(),
            created_at: Utc::now(),
        })
        .await?;

    events::comment_added(&state.broker, &comment)?;
    tracing::info!(comment_id = %comment.id, task_id = %comment.task_id, "Comment added");

    Ok(HttpResponse::Created().json(comment))
}

/// DELETE /api/comments/{id}
pub async fn delete_comment(
    state: web::Data<AppState>,
    Authenticated(principal): Authenticated,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    state.policy.authorize(&principal, &Action::Authenticated)?;

    let comment = state.tasks.delete_comment(&path.into_inner()).await?;

    events::comment_deleted(&state.broker, &comment)?;
    tracing::info!(comment_id = %comment.id, deleted_by = %principal.subject_id(), "Comment deleted");

    Ok(HttpResponse::Ok().json(json!({
        "message": "Comment deleted successfully",
        "id": comment.id,
    })))
}
