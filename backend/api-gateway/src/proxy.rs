//! Reverse proxy to the backend services.
//!
//! The caller's bearer token is verified here; an invalid token never leaves
//! the gateway. Identity travels upstream only as the headers produced by the
//! configured [`IdentityPropagator`](identity_propagation::IdentityPropagator).
//! Client-supplied identity headers are dropped.

use actix_middleware::{get_correlation_id, CORRELATION_ID_HEADER};
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use error_types::ServiceError;
use identity_propagation::{INTERNAL_ASSERTION_HEADER, UNTRUSTED_USER_PAYLOAD_HEADER};

use crate::state::AppState;

/// Request headers copied verbatim to the upstream
const FORWARDED_HEADERS: &[&str] = &["content-type", "accept", "accept-language", "user-agent"];

/// Response headers copied back to the caller
const RETURNED_HEADERS: &[&str] = &["content-type", "cache-control", "location"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upstream {
    /// User service, path kept as is
    Users,
    /// Task service, `/tasks-api/*` becomes `/api/*`
    Tasks,
}

impl Upstream {
    /// Absolute upstream URL for an incoming path and query
    pub fn target_url(self, state: &AppState, path: &str, query: &str) -> String {
        let (base, path) = match self {
            Upstream::Users => (&state.upstreams.rest_api_url, path.to_string()),
            Upstream::Tasks => (
                &state.upstreams.task_api_url,
                match path.strip_prefix("/tasks-api") {
                    Some(rest) => format!("/api{rest}"),
                    None => path.to_string(),
                },
            ),
        };

        if query.is_empty() {
            format!("{base}{path}")
        } else {
            format!("{base}{path}?{query}")
        }
    }
}

/// `/api/*` → user service
pub async fn users(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ServiceError> {
    forward(Upstream::Users, req, body, &state).await
}

/// `/tasks-api/*` → task service
pub async fn tasks(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ServiceError> {
    forward(Upstream::Tasks, req, body, &state).await
}

async fn forward(
    upstream: Upstream,
    req: HttpRequest,
    body: web::Bytes,
    state: &AppState,
) -> Result<HttpResponse, ServiceError> {
    let correlation_id = get_correlation_id(&req);
    let url = upstream.target_url(state, req.path(), req.query_string());

    if req.headers().contains_key(UNTRUSTED_USER_PAYLOAD_HEADER) {
        tracing::warn!(
            path = %req.path(),
            correlation_id = %correlation_id,
            "Dropping client-supplied x-user-payload header"
        );
    }
    if req.headers().contains_key(INTERNAL_ASSERTION_HEADER) {
        tracing::warn!(
            path = %req.path(),
            correlation_id = %correlation_id,
            "Dropping client-supplied internal assertion"
        );
    }

    let method = reqwest::Method::from_bytes(req.method().as_str().as_bytes())
        .map_err(|_| ServiceError::BadRequest(format!("Unsupported method {}", req.method())))?;

    let mut outbound = state
        .client
        .request(method, &url)
        .header(CORRELATION_ID_HEADER, correlation_id.as_str());

    for name in FORWARDED_HEADERS {
        if let Some(value) = req.headers().get(*name).and_then(|v| v.to_str().ok()) {
            outbound = outbound.header(*name, value);
        }
    }

    // Identity: verified token in, propagated identity out
    if let Some(authorization) = req.headers().get("authorization") {
        let authorization = authorization.to_str().map_err(|_| ServiceError::Unauthorized)?;
        let principal = state.resolver.resolve(Some(authorization), None).map_err(|e| {
            tracing::warn!(
                path = %req.path(),
                correlation_id = %correlation_id,
                reason = %e,
                "Rejected request at gateway"
            );
            ServiceError::Unauthorized
        })?;

        let headers = state
            .propagator
            .outbound_headers(&principal, authorization)
            .map_err(|e| ServiceError::InternalError(format!("identity propagation failed: {e}")))?;
        for (name, value) in headers {
            outbound = outbound.header(name, value);
        }
    }

    if !body.is_empty() {
        outbound = outbound.body(body.to_vec());
    }

    let response = outbound.send().await.map_err(|e| {
        tracing::error!(
            upstream = ?upstream,
            url = %url,
            correlation_id = %correlation_id,
            error = %e,
            "Upstream request failed"
        );
        ServiceError::ServiceUnavailable(format!("{upstream:?} service unreachable"))
    })?;

    let status = StatusCode::from_u16(response.status().as_u16())
        .unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = HttpResponse::build(status);
    for name in RETURNED_HEADERS {
        if let Some(value) = response.headers().get(*name).and_then(|v| v.to_str().ok()) {
            builder.insert_header((*name, value.to_string()));
        }
    }

    let bytes = response.bytes().await.map_err(|e| {
        tracing::error!(url = %url, error = %e, "Failed to read upstream response");
        ServiceError::ServiceUnavailable(format!("{upstream:?} service response interrupted"))
    })?;

    tracing::debug!(
        upstream = ?upstream,
        url = %url,
        status = status.as_u16(),
        correlation_id = %correlation_id,
        "Proxied request"
    );

    Ok(builder.body(bytes.to_vec()))
}
