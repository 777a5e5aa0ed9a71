use actix_middleware::Authenticated;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use crypto_core::Action;
use error_types::ServiceError;
use uuid::Uuid;
use validator::Validate;

use crate::models::{CreateTeamRequest, Team};
use crate::state::AppState;

/// GET /api/teams
///
/// Only the teams the caller is a member of.
pub async fn list_teams(
    state: web::Data<AppState>,
    Authenticated(principal): Authenticated,
) -> Result<HttpResponse, ServiceError> {
    state.policy.authorize(&principal, &Action::Authenticated)?;

    let teams = state.teams.list_for_member(principal.subject_id()).await;
    Ok(HttpResponse::Ok().json(teams))
}

/// POST /api/teams
pub async fn create_team(
    state: web::Data<AppState>,
    Authenticated(principal): Authenticated,
    body: web::Json<CreateTeamRequest>,
) -> Result<HttpResponse, ServiceError> {
    state.policy.authorize(&principal, &Action::Authenticated)?;

    let body = body.into_inner();
    body.validate()?;

    let team = state
        .teams
        .insert(Team {
            id: Uuid::new_v4().to_string(),
            name: body.name.trim().to_string(),
            members: vec![principal.subject_id().to_string()],
            created_at: Utc::now(),
        })
        .await;

    tracing::info!(team_id = %team.id, created_by = %principal.subject_id(), "Team created");

    Ok(HttpResponse::Created().json(team))
}
