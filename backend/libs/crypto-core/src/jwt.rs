/// RS256 identity token issuance and verification
///
/// ## Security Design
///
/// - **RS256 ONLY**: tokens with any other `alg` are rejected before the key is touched
/// - **No hardcoded keys**: key material is injected as `Arc<KeyMaterial>`
/// - **No fallback**: a verifier never retries with a weaker validation
///
/// ## Usage
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use crypto_core::{KeyMaterial, PrincipalAttributes, Role, TokenAuthority, TokenVerifier};
///
/// let keys = Arc::new(KeyMaterial::from_private_pem(&private_pem)?);
/// let authority = TokenAuthority::new(keys.clone())?;
/// let verifier = TokenVerifier::new(keys);
///
/// let issued = authority.issue(&PrincipalAttributes::new("42", "ada@example.com", Role::User))?;
/// let principal = verifier.verify(&issued.token)?;
/// assert_eq!(principal.subject_id(), "42");
/// ```
use std::collections::HashSet;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::claims::{IdentityClaim, Principal, PrincipalAttributes};
use crate::keys::{KeyError, KeyMaterial};

// ============================================================================
// Constants
// ============================================================================

pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// JWT algorithm - the only one accepted anywhere
const JWT_ALGORITHM: Algorithm = Algorithm::RS256;
const JWT_ALGORITHM_NAME: &str = "RS256";

// ============================================================================
// Errors
// ============================================================================

/// Why a token failed verification.
///
/// Every variant maps to the same 401 at the transport boundary; the variant is
/// for logs only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("malformed token")]
    MalformedToken,
    #[error("token algorithm is not RS256")]
    AlgorithmMismatch,
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("token audience mismatch")]
    AudienceMismatch,
}

#[derive(Debug, Error)]
pub enum SigningError {
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error("token lifetime must be positive and representable")]
    InvalidLifetime,
    #[error("principal has already expired")]
    PrincipalExpired,
    #[error("failed to encode token: {0}")]
    Encode(String),
}

// ============================================================================
// Issuance
// ============================================================================

/// A freshly signed token together with the claim it carries
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub claims: IdentityClaim,
    /// Seconds until expiry
    pub expires_in: i64,
}

#[derive(Clone)]
pub struct TokenAuthority {
    keys: Arc<KeyMaterial>,
    lifetime: Duration,
    audience: Option<String>,
}

impl TokenAuthority {
    /// Fails with [`KeyError::SigningKeyMissing`] for verify-only key material.
    pub fn new(keys: Arc<KeyMaterial>) -> Result<Self, KeyError> {
        if !keys.can_sign() {
            return Err(KeyError::SigningKeyMissing);
        }
        Ok(Self {
            keys,
            lifetime: Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS),
            audience: None,
        })
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Bind every issued token to `audience`
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn keys(&self) -> &Arc<KeyMaterial> {
        &self.keys
    }

    pub fn issue(&self, attributes: &PrincipalAttributes) -> Result<IssuedToken, SigningError> {
        self.issue_at(attributes, Utc::now().timestamp())
    }

    /// Issue with an explicit "now" (Unix seconds)
    pub fn issue_at(
        &self,
        attributes: &PrincipalAttributes,
        now: i64,
    ) -> Result<IssuedToken, SigningError> {
        let exp = self.expiry_from(now)?;
        self.sign(attributes, now, exp)
    }

    /// Re-issue for an already verified principal. The new token never outlives
    /// the principal's own expiry.
    pub fn issue_for(&self, principal: &Principal) -> Result<IssuedToken, SigningError> {
        self.issue_for_at(principal, Utc::now().timestamp())
    }

    pub fn issue_for_at(&self, principal: &Principal, now: i64) -> Result<IssuedToken, SigningError> {
        let exp = self.expiry_from(now)?.min(principal.expires_at());
        if exp <= now {
            return Err(SigningError::PrincipalExpired);
        }
        self.sign(&principal.attributes(), now, exp)
    }

    fn expiry_from(&self, now: i64) -> Result<i64, SigningError> {
        let lifetime = self.lifetime.num_seconds();
        if lifetime <= 0 {
            return Err(SigningError::InvalidLifetime);
        }
        now.checked_add(lifetime).ok_or(SigningError::InvalidLifetime)
    }

    fn sign(
        &self,
        attributes: &PrincipalAttributes,
        iat: i64,
        exp: i64,
    ) -> Result<IssuedToken, SigningError> {
        let claims = IdentityClaim {
            sub: attributes.subject_id.clone(),
            email: attributes.email.clone(),
            role: attributes.role,
            iat,
            exp,
            aud: self.audience.clone(),
        };

        let encoding_key = self.keys.encoding_key()?;
        let token = encode(&Header::new(JWT_ALGORITHM), &claims, encoding_key)
            .map_err(|e| SigningError::Encode(e.to_string()))?;

        Ok(IssuedToken {
            token,
            expires_in: exp - iat,
            claims,
        })
    }
}

impl std::fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthority")
            .field("lifetime_secs", &self.lifetime.num_seconds())
            .field("audience", &self.audience)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Verification
// ============================================================================

#[derive(Clone)]
pub struct TokenVerifier {
    keys: Arc<KeyMaterial>,
    audience: Option<String>,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(keys: Arc<KeyMaterial>) -> Self {
        // Signature and algorithm only; time and audience are checked below so
        // each failure keeps its own variant.
        let mut validation = Validation::new(JWT_ALGORITHM);
        validation.algorithms = vec![JWT_ALGORITHM];
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();
        validation.leeway = 0;

        Self {
            keys,
            audience: None,
            validation,
        }
    }

    /// Only accept tokens whose `aud` equals `audience`. Without this, tokens
    /// carrying any audience are rejected.
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn verify(&self, token: &str) -> Result<Principal, VerificationError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Verify with an explicit "now" (Unix seconds)
    pub fn verify_at(&self, token: &str, now: i64) -> Result<Principal, VerificationError> {
        // 1. Structure
        let alg = header_algorithm(token)?;

        // 2. Algorithm, read as a raw string so `none` and unknown names count too
        if alg != JWT_ALGORITHM_NAME {
            return Err(VerificationError::AlgorithmMismatch);
        }

        // 3. Signature over header.payload
        let data = decode::<IdentityClaim>(token, self.keys.decoding_key(), &self.validation)
            .map_err(|e| classify(e.kind()))?;
        let claims = data.claims;

        if claims.exp <= claims.iat {
            return Err(VerificationError::MalformedToken);
        }

        // 4. Expiry
        if now >= claims.exp {
            return Err(VerificationError::Expired);
        }

        // 5. Audience
        if claims.aud != self.audience {
            return Err(VerificationError::AudienceMismatch);
        }

        Ok(Principal::from_verified(claims))
    }
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("audience", &self.audience)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct RawHeader {
    alg: String,
}

/// `alg` of a three-segment compact token
fn header_algorithm(token: &str) -> Result<String, VerificationError> {
    let mut segments = token.split('.');
    let (Some(header), Some(_), Some(_), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(VerificationError::MalformedToken);
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(header)
        .map_err(|_| VerificationError::MalformedToken)?;
    let header: RawHeader =
        serde_json::from_slice(&bytes).map_err(|_| VerificationError::MalformedToken)?;
    Ok(header.alg)
}

fn classify(kind: &ErrorKind) -> VerificationError {
    match kind {
        ErrorKind::InvalidSignature | ErrorKind::InvalidRsaKey(_) | ErrorKind::Crypto(_) => {
            VerificationError::InvalidSignature
        }
        ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
            VerificationError::AlgorithmMismatch
        }
        _ => VerificationError::MalformedToken,
    }
}

/// Strip the `Bearer ` scheme from an `Authorization` header value
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::Role;
    use crate::testing;

    const NOW: i64 = 1_700_000_000;

    fn attrs() -> PrincipalAttributes {
        PrincipalAttributes::new("user-1", "user1@example.com", Role::User)
    }

    #[test]
    fn test_issue_sets_lifetime() {
        let authority = testing::authority();
        let issued = authority.issue_at(&attrs(), NOW).unwrap();

        assert_eq!(issued.claims.iat, NOW);
        assert_eq!(issued.claims.exp, NOW + DEFAULT_TOKEN_LIFETIME_SECS);
        assert_eq!(issued.expires_in, DEFAULT_TOKEN_LIFETIME_SECS);
        assert_eq!(issued.token.split('.').count(), 3);
    }

    #[test]
    fn test_zero_lifetime_is_rejected() {
        let authority = testing::authority().with_lifetime(Duration::zero());
        assert!(matches!(
            authority.issue_at(&attrs(), NOW),
            Err(SigningError::InvalidLifetime)
        ));
    }

    #[test]
    fn test_unrepresentable_expiry_is_rejected() {
        let authority = testing::authority();
        assert!(matches!(
            authority.issue_at(&attrs(), i64::MAX - 10),
            Err(SigningError::InvalidLifetime)
        ));
    }

    #[test]
    fn test_verify_only_keys_cannot_issue() {
        let keys = Arc::new(KeyMaterial::verify_only(testing::PRIMARY_PUBLIC_PEM).unwrap());
        assert!(matches!(
            TokenAuthority::new(keys),
            Err(KeyError::SigningKeyMissing)
        ));
    }

    #[test]
    fn test_expiry_boundary() {
        let authority = testing::authority();
        let verifier = testing::verifier();
        let issued = authority.issue_at(&attrs(), NOW).unwrap();

        assert!(verifier.verify_at(&issued.token, issued.claims.exp - 1).is_ok());
        assert_eq!(
            verifier.verify_at(&issued.token, issued.claims.exp),
            Err(VerificationError::Expired)
        );
    }

    #[test]
    fn test_issue_for_caps_at_principal_expiry() {
        let user_token = testing::authority()
            .issue_at(&attrs(), NOW)
            .unwrap();
        let principal = testing::verifier().verify_at(&user_token.token, NOW).unwrap();

        let long_lived = testing::authority().with_lifetime(Duration::hours(5));
        let reissued = long_lived.issue_for_at(&principal, NOW + 100).unwrap();
        assert_eq!(reissued.claims.exp, principal.expires_at());

        assert!(matches!(
            long_lived.issue_for_at(&principal, principal.expires_at()),
            Err(SigningError::PrincipalExpired)
        ));
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(bearer_token("bearer   abc"), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("abc"), None);
    }
}
