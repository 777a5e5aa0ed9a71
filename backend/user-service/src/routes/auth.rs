use actix_web::{web, HttpResponse};
use chrono::Utc;
use crypto_core::{PrincipalAttributes, Role};
use error_types::ServiceError;
use uuid::Uuid;
use validator::Validate;

use crate::models::{AuthResponse, LoginRequest, RegisterRequest, User};
use crate::security::password;
use crate::state::AppState;

/// POST /api/auth/register
pub async fn register(
    state: web::Data<AppState>,
    body: web::Json<RegisterRequest>,
) -> Result<HttpResponse, ServiceError> {
    let body = body.into_inner();
    body.validate()?;

    let role = match body.role {
        Some(role) if state.allow_register_role => role,
        Some(Role::Admin) => {
            tracing::warn!(email = %body.email, "Ignoring admin role on self-registration");
            Role::User
        }
        _ => Role::User,
    };

    let now = Utc::now();
    let user = state
        .users
        .insert(User {
            id: Uuid::new_v4().to_string(),
            name: body.name,
            email: body.email.trim().to_lowercase(),
            age: None,
            role,
            password_hash: Some(password::hash_password(&body.password)?),
            created_at: now,
            updated_at: now,
        })
        .await?;

    let issued = state
        .authority
        .issue(&PrincipalAttributes::new(&user.id, &user.email, user.role))
        .map_err(|e| ServiceError::InternalError(e.to_string()))?;

    tracing::info!(user_id = %user.id, role = %user.role, "User registered");

    Ok(HttpResponse::Created().json(AuthResponse {
        message: "User registered successfully",
        token: issued.token,
        expires_in: issued.expires_in,
        user,
    }))
}

/// POST /api/auth/login
pub async fn login(
    state: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, ServiceError> {
    body.validate()?;

    let user = state.users.find_by_email(body.email.trim()).await;

    // Same outcome for unknown email, passwordless account and wrong password
    let authenticated = match user.as_ref().and_then(|u| u.password_hash.as_deref()) {
        Some(hash) => password::verify_password(&body.password, hash)?,
        None => false,
    };
    let user = match (authenticated, user) {
        (true, Some(user)) => user,
        _ => {
            tracing::warn!(email = %body.email, "Login failed");
            return Err(ServiceError::Unauthorized);
        }
    };

    let issued = state
        .authority
        .issue(&PrincipalAttributes::new(&user.id, &user.email, user.role))
        .map_err(|e| ServiceError::InternalError(e.to_string()))?;

    tracing::info!(user_id = %user.id, "User logged in");

    Ok(HttpResponse::Ok().json(AuthResponse {
        message: "Login successful",
        token: issued.token,
        expires_in: issued.expires_in,
        user,
    }))
}

/// GET /api/auth/public-key
pub async fn public_key(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("application/x-pem-file")
        .body(state.keys.public_key_pem().to_string())
}
