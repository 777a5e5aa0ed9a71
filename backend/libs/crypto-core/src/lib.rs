//! Identity token core shared by every service.
//!
//! - [`keys`]: RSA key material, loaded once at startup and shared read-only
//! - [`jwt`]: RS256 token issuance ([`TokenAuthority`]) and verification ([`TokenVerifier`])
//! - [`claims`]: the signed identity claim and the verified [`Principal`]
//! - [`authorization`]: role-based allow/deny decisions

pub mod authorization;
pub mod claims;
pub mod jwt;
pub mod keys;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use authorization::{Action, AuthorizationPolicy, Forbidden};
pub use claims::{IdentityClaim, Principal, PrincipalAttributes, Role, UnknownRole};
pub use jwt::{
    bearer_token, IssuedToken, SigningError, TokenAuthority, TokenVerifier, VerificationError,
    DEFAULT_TOKEN_LIFETIME_SECS,
};
pub use keys::{KeyError, KeyMaterial, KeySource};
