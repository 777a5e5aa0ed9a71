//! Gateway side: attach the caller's identity to outgoing requests.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Duration;
use crypto_core::{KeyError, KeyMaterial, Principal, SigningError, TokenAuthority};
use thiserror::Error;

use crate::{INTERNAL_ASSERTION_HEADER, INTERNAL_AUDIENCE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationMode {
    /// Pass the caller's `Authorization` header through unchanged
    ForwardToken,
    /// Replace it with a short-lived internal assertion
    SignedAssertion,
}

#[derive(Debug, Error)]
#[error("unknown identity propagation mode: {0} (expected `forward` or `assertion`)")]
pub struct UnknownMode(pub String);

impl FromStr for PropagationMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forward" => Ok(PropagationMode::ForwardToken),
            "assertion" => Ok(PropagationMode::SignedAssertion),
            other => Err(UnknownMode(other.to_string())),
        }
    }
}

impl fmt::Display for PropagationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropagationMode::ForwardToken => f.write_str("forward"),
            PropagationMode::SignedAssertion => f.write_str("assertion"),
        }
    }
}

/// Mints internal assertions with the gateway-only key
#[derive(Debug, Clone)]
pub struct AssertionIssuer {
    authority: TokenAuthority,
}

impl AssertionIssuer {
    pub fn new(keys: Arc<KeyMaterial>, ttl: Duration) -> Result<Self, KeyError> {
        let authority = TokenAuthority::new(keys)?
            .with_audience(INTERNAL_AUDIENCE)
            .with_lifetime(ttl);
        Ok(Self { authority })
    }

    /// Assertion for `principal`, never outliving the principal's own token
    pub fn issue(&self, principal: &Principal) -> Result<String, SigningError> {
        Ok(self.authority.issue_for(principal)?.token)
    }

    pub fn issue_at(&self, principal: &Principal, now: i64) -> Result<String, SigningError> {
        Ok(self.authority.issue_for_at(principal, now)?.token)
    }
}

/// Builds the identity headers for one proxied request
#[derive(Debug, Clone)]
pub struct IdentityPropagator {
    mode: PropagationMode,
    issuer: Option<AssertionIssuer>,
}

impl IdentityPropagator {
    pub fn forward() -> Self {
        Self {
            mode: PropagationMode::ForwardToken,
            issuer: None,
        }
    }

    pub fn assertion(issuer: AssertionIssuer) -> Self {
        Self {
            mode: PropagationMode::SignedAssertion,
            issuer: Some(issuer),
        }
    }

    pub fn mode(&self) -> PropagationMode {
        self.mode
    }

    /// Headers to set on the upstream request.
    ///
    /// `authorization` is the caller's original header value, already verified.
    pub fn outbound_headers(
        &self,
        principal: &Principal,
        authorization: &str,
    ) -> Result<Vec<(&'static str, String)>, SigningError> {
        match &self.issuer {
            None => Ok(vec![("authorization", authorization.to_string())]),
            Some(issuer) => {
                let assertion = issuer.issue(principal)?;
                tracing::debug!(
                    subject = %principal.subject_id(),
                    "Attached internal assertion"
                );
                Ok(vec![(INTERNAL_ASSERTION_HEADER, assertion)])
            }
        }
    }
}
