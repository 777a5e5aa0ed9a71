//! Backend side: resolve the caller's identity from request headers.

use crypto_core::{bearer_token, Principal, TokenVerifier, VerificationError};
use thiserror::Error;
use tracing::{debug, warn};

use crate::INTERNAL_AUDIENCE;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("missing credentials")]
    MissingCredentials,
    #[error("invalid authorization header")]
    MalformedHeader,
    #[error(transparent)]
    Verification(#[from] VerificationError),
}

/// Accepts user tokens and, when configured, gateway assertions.
///
/// - An `x-internal-assertion` header is checked first when an assertion
///   verifier is configured. An invalid assertion is rejected outright; there is
///   no fallback to the bearer token.
/// - Otherwise the `Authorization: Bearer` token is verified with the user key.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    user_verifier: TokenVerifier,
    assertion_verifier: Option<TokenVerifier>,
}

impl IdentityResolver {
    pub fn bearer_only(user_verifier: TokenVerifier) -> Self {
        Self {
            user_verifier,
            assertion_verifier: None,
        }
    }

    /// `assertion_verifier` is bound to the internal audience here
    pub fn with_assertions(user_verifier: TokenVerifier, assertion_verifier: TokenVerifier) -> Self {
        Self {
            user_verifier,
            assertion_verifier: Some(assertion_verifier.with_audience(INTERNAL_AUDIENCE)),
        }
    }

    pub fn accepts_assertions(&self) -> bool {
        self.assertion_verifier.is_some()
    }

    /// Verify a bare user token (no `Bearer` scheme), as sent in a WebSocket
    /// `connection_init` payload
    pub fn verify_token(&self, token: &str) -> Result<Principal, ResolveError> {
        self.user_verifier.verify(token).map_err(|e| {
            warn!(stage = ?e, "User token rejected");
            ResolveError::Verification(e)
        })
    }

    pub fn resolve(
        &self,
        authorization: Option<&str>,
        assertion: Option<&str>,
    ) -> Result<Principal, ResolveError> {
        match (&self.assertion_verifier, assertion) {
            (Some(verifier), Some(assertion)) => {
                let principal = verifier.verify(assertion).map_err(|e| {
                    warn!(stage = ?e, "Internal assertion rejected");
                    ResolveError::Verification(e)
                })?;
                debug!(subject = %principal.subject_id(), "Resolved identity from internal assertion");
                return Ok(principal);
            }
            (None, Some(_)) => {
                debug!("Ignoring internal assertion; this service does not accept assertions");
            }
            _ => {}
        }

        let header = authorization.ok_or(ResolveError::MissingCredentials)?;
        let token = bearer_token(header).ok_or_else(|| {
            warn!("Invalid authorization format (expected 'Bearer <token>')");
            ResolveError::MalformedHeader
        })?;

        let principal = self.verify_token(token)?;
        debug!(subject = %principal.subject_id(), "Resolved identity from bearer token");
        Ok(principal)
    }
}
