use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use crypto_core::Principal;
use error_types::ServiceError;
use futures::future::{ready, Ready};
use identity_propagation::{
    IdentityResolver, INTERNAL_ASSERTION_HEADER, UNTRUSTED_USER_PAYLOAD_HEADER,
};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

/// Verified principal of the current request
#[derive(Debug, Clone)]
pub struct Authenticated(pub Principal);

/// Authentication middleware.
///
/// Resolves the caller from `Authorization: Bearer` (or an internal assertion
/// when the resolver accepts them) and stores an [`Authenticated`] in the request
/// extensions. Every failure is the same 401 body; the reason is only logged.
#[derive(Clone)]
pub struct JwtAuthMiddleware {
    resolver: Arc<IdentityResolver>,
    skip_paths: Rc<Vec<String>>,
}

impl JwtAuthMiddleware {
    pub fn new(resolver: Arc<IdentityResolver>) -> Self {
        Self {
            resolver,
            skip_paths: Rc::new(Vec::new()),
        }
    }

    /// Let requests whose path starts with `prefix` through unauthenticated
    pub fn skip(mut self, prefix: impl Into<String>) -> Self {
        Rc::make_mut(&mut self.skip_paths).push(prefix.into());
        self
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtAuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = JwtAuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtAuthMiddlewareService {
            service: Rc::new(service),
            resolver: self.resolver.clone(),
            skip_paths: self.skip_paths.clone(),
        }))
    }
}

pub struct JwtAuthMiddlewareService<S> {
    service: Rc<S>,
    resolver: Arc<IdentityResolver>,
    skip_paths: Rc<Vec<String>>,
}

impl<S, B> Service<ServiceRequest> for JwtAuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();

        if self.skip_paths.iter().any(|p| req.path().starts_with(p.as_str())) {
            return Box::pin(async move { service.call(req).await });
        }

        if req.headers().contains_key(UNTRUSTED_USER_PAYLOAD_HEADER) {
            tracing::warn!(
                path = %req.path(),
                "Ignoring unsigned x-user-payload identity header"
            );
        }

        let authorization = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok());
        let assertion = req
            .headers()
            .get(INTERNAL_ASSERTION_HEADER)
            .and_then(|h| h.to_str().ok());

        let resolved = self.resolver.resolve(authorization, assertion);

        Box::pin(async move {
            let principal = resolved.map_err(|e| {
                tracing::warn!(path = %req.path(), reason = %e, "Authentication failed");
                ServiceError::Unauthorized
            })?;

            req.extensions_mut().insert(Authenticated(principal));

            service.call(req).await
        })
    }
}

/// FromRequest implementation for Authenticated
impl actix_web::FromRequest for Authenticated {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(
        req: &actix_web::HttpRequest,
        _payload: &mut actix_web::dev::Payload,
    ) -> Self::Future {
        match req.extensions().get::<Authenticated>() {
            Some(authenticated) => ready(Ok(authenticated.clone())),
            None => ready(Err(ServiceError::Unauthorized.into())),
        }
    }
}
