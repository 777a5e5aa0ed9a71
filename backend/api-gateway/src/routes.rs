use actix_web::{web, HttpRequest, HttpResponse};
use error_types::ServiceError;
use serde_json::json;

use crate::state::AppState;
use crate::{proxy, ws_proxy};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/api/{tail:.*}", web::route().to(proxy::users))
        .route("/tasks-api/{tail:.*}", web::route().to(proxy::tasks))
        .route("/graphql", web::get().to(ws_proxy::graphql))
        .default_service(web::to(not_found));
}

async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "OK",
        "service": "api-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "identityPropagation": state.propagator.mode().to_string(),
        "upstreams": {
            "users": state.upstreams.rest_api_url,
            "tasks": state.upstreams.task_api_url,
        },
    }))
}

async fn not_found(req: HttpRequest) -> Result<actix_web::HttpResponse, ServiceError> {
    Err(ServiceError::NotFound(format!("Route {} {}", req.method(), req.path())))
}
