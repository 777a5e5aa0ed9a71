//! # Actix Middleware Library
//!
//! Shared middleware for the Actix services
//!
//! ## Modules
//! - `jwt_auth`: bearer token / internal assertion authentication
//! - `correlation_id`: `x-correlation-id` propagation
//! - `logging`: request logging

pub mod correlation_id;
pub mod jwt_auth;
pub mod logging;

pub use correlation_id::{get_correlation_id, CorrelationId, CorrelationIdMiddleware, CORRELATION_ID_HEADER};
pub use jwt_auth::{Authenticated, JwtAuthMiddleware};
pub use logging::Logging;
