use std::sync::Arc;

use actix_middleware::JwtAuthMiddleware;
use actix_web::{error, web, HttpRequest};
use error_types::ServiceError;
use identity_propagation::IdentityResolver;

pub mod auth;
pub mod health;
pub mod teams;
pub mod users;

/// Mount every route. `/api/users` and `/api/teams` sit behind the auth middleware.
pub fn configure(cfg: &mut web::ServiceConfig, resolver: Arc<IdentityResolver>) {
    cfg.app_data(json_config())
        .app_data(query_config())
        .route("/health", web::get().to(health::health_check))
        .service(
            web::scope("/api/auth")
                .route("/register", web::post().to(auth::register))
                .route("/login", web::post().to(auth::login))
                .route("/public-key", web::get().to(auth::public_key)),
        )
        .service(
            web::scope("/api/users")
                .wrap(JwtAuthMiddleware::new(resolver.clone()))
                .route("", web::get().to(users::list_users))
                .route("", web::post().to(users::create_user))
                .route("/{id}", web::get().to(users::get_user))
                .route("/{id}", web::put().to(users::update_user))
                .route("/{id}", web::delete().to(users::delete_user)),
        )
        .service(
            web::scope("/api/teams")
                .wrap(JwtAuthMiddleware::new(resolver))
                .route("", web::get().to(teams::list_teams))
                .route("", web::post().to(teams::create_team)),
        )
        .default_service(web::to(not_found));
}

pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err: error::JsonPayloadError, _req: &HttpRequest| {
        ServiceError::BadRequest(err.to_string()).into()
    })
}

pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|err: error::QueryPayloadError, _req: &HttpRequest| {
        ServiceError::BadRequest(err.to_string()).into()
    })
}

async fn not_found(req: HttpRequest) -> Result<actix_web::HttpResponse, ServiceError> {
    Err(ServiceError::NotFound(format!("Route {} {}", req.method(), req.path())))
}
