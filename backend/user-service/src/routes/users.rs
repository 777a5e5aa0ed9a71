use actix_middleware::Authenticated;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use crypto_core::{Action, Role};
use error_types::ServiceError;
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    CreateUserRequest, ListUsersQuery, UpdateUserRequest, User, UserChanges, UserFilter, UserList,
    UserMessage,
};
use crate::security::password;
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: usize = 10;

/// GET /api/users
///
/// Returns a bare array unless `page` or `limit` is given.
pub async fn list_users(
    state: web::Data<AppState>,
    Authenticated(principal): Authenticated,
    query: web::Query<ListUsersQuery>,
) -> Result<HttpResponse, ServiceError> {
    state.policy.authorize(&principal, &Action::Authenticated)?;

    let query = query.into_inner();
    let users = state
        .users
        .list(&UserFilter {
            role: query.role,
            search: query.search.filter(|s| !s.trim().is_empty()),
        })
        .await;

    let body = match (query.page, query.limit) {
        (None, None) => UserList::All(users),
        (page, limit) => {
            UserList::paginate(users, page.unwrap_or(1), limit.unwrap_or(DEFAULT_PAGE_SIZE))
        }
    };

    Ok(HttpResponse::Ok().json(body))
}

/// GET /api/users/{id}
pub async fn get_user(
    state: web::Data<AppState>,
    Authenticated(principal): Authenticated,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    state.policy.authorize(&principal, &Action::Authenticated)?;

    let id = path.into_inner();
    let user = state
        .users
        .find_by_id(&id)
        .await
        .ok_or_else(|| ServiceError::NotFound(format!("User {id}")))?;

    Ok(HttpResponse::Ok().json(user))
}

/// POST /api/users (admin only)
pub async fn create_user(
    state: web::Data<AppState>,
    Authenticated(principal): Authenticated,
    body: web::Json<CreateUserRequest>,
) -> Result<HttpResponse, ServiceError> {
    let id = Uuid::new_v4().to_string();
    state
        .policy
        .authorize(&principal, &Action::AdminOnly { target: &id })?;

    let body = body.into_inner();
    body.validate()?;

    let password_hash = body
        .password
        .as_deref()
        .map(password::hash_password)
        .transpose()?;

    let now = Utc::now();
    let user = state
        .users
        .insert(User {
            id,
            name: body.name,
            email: body.email.trim().to_lowercase(),
            age: body.age,
            role: body.role.unwrap_or(Role::User),
            password_hash,
            created_at: now,
            updated_at: now,
        })
        .await?;

    tracing::info!(
        user_id = %user.id,
        created_by = %principal.subject_id(),
        role = %user.role,
        "User created by admin"
    );

    Ok(HttpResponse::Created().json(UserMessage {
        message: "User created successfully",
        user,
    }))
}

/// PUT /api/users/{id}
///
/// Owners may edit their own profile. Changing a role needs an admin, and
/// an admin cannot change their own role.
pub async fn update_user(
    state: web::Data<AppState>,
    Authenticated(principal): Authenticated,
    path: web::Path<String>,
    body: web::Json<UpdateUserRequest>,
) -> Result<HttpResponse, ServiceError> {
    let id = path.into_inner();
    state
        .policy
        .authorize(&principal, &Action::SelfOrAdmin { target: &id })?;

    let body = body.into_inner();
    if body.role.is_some() {
        state
            .policy
            .authorize(&principal, &Action::AdminOnly { target: &id })?;
    }
    body.validate()?;

    let user = state
        .users
        .update(
            &id,
            UserChanges {
                name: body.name,
                email: body.email.map(|e| e.trim().to_lowercase()),
                age: body.age,
                role: body.role,
            },
        )
        .await?;

    tracing::info!(user_id = %user.id, updated_by = %principal.subject_id(), "User updated");

    Ok(HttpResponse::Ok().json(UserMessage {
        message: "User updated successfully",
        user,
    }))
}

/// DELETE /api/users/{id} (admin only, never yourself)
pub async fn delete_user(
    state: web::Data<AppState>,
    Authenticated(principal): Authenticated,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let id = path.into_inner();
    state
        .policy
        .authorize(&principal, &Action::AdminOnly { target: &id })?;

    let user = state.users.delete(&id).await?;

    tracing::info!(user_id = %user.id, deleted_by = %principal.subject_id(), "User deleted");

    Ok(HttpResponse::Ok().json(UserMessage {
        message: "User deleted successfully",
        user,
    }))
}
