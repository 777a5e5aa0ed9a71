use std::sync::Arc;

use actix_middleware::JwtAuthMiddleware;
use actix_web::{error, web, HttpRequest};
use error_types::ServiceError;
use identity_propagation::IdentityResolver;

use crate::websocket;

pub mod comments;
pub mod health;
pub mod tasks;

/// Mount every route. The REST API sits behind the auth middleware; the
/// WebSocket endpoint authenticates through `connection_init`.
pub fn configure(cfg: &mut web::ServiceConfig, resolver: Arc<IdentityResolver>) {
    cfg.app_data(json_config())
        .route("/health", web::get().to(health::health_check))
        .route("/graphql", web::get().to(websocket::subscriptions))
        .service(
            web::scope("/api")
                .wrap(JwtAuthMiddleware::new(resolver))
                .route("/tasks", web::get().to(tasks::list_tasks))
                .route("/tasks", web::post().to(tasks::create_task))
                .route("/tasks/{id}", web::get().to(tasks::get_task))
                .route("/tasks/{id}", web::put().to(tasks::update_task))
                .route("/tasks/{id}", web::delete().to(tasks::delete_task))
                .route("/tasks/{id}/comments", web::get().to(comments::list_comments))
                .route("/tasks/{id}/comments", web::post().to(comments::create_comment))
                .route("/comments/{id}", web::delete().to(comments::delete_comment)),
        )
        .default_service(web::to(not_found));
}

pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err: error::JsonPayloadError, _req: &HttpRequest| {
        ServiceError::BadRequest(err.to_string()).into()
    })
}

async fn not_found(req: HttpRequest) -> Result<actix_web::HttpResponse, ServiceError> {
    Err(ServiceError::NotFound(format!("Route {} {}", req.method(), req.path())))
}
