//! Integration Tests for identity propagation
//!
//! These tests run the complete flow:
//! Gateway verifies caller -> builds outbound headers -> backend resolves principal

use std::sync::Arc;

use chrono::Duration;
use crypto_core::testing::{internal_keys, primary_keys, token_for, verifier};
use crypto_core::{KeyMaterial, Role, TokenVerifier, VerificationError};
use identity_propagation::{
    AssertionIssuer, IdentityPropagator, IdentityResolver, ResolveError, INTERNAL_ASSERTION_HEADER,
};

fn header<'a>(headers: &'a [(&'static str, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, v)| v.as_str())
}

fn assertion_resolver() -> IdentityResolver {
    IdentityResolver::with_assertions(verifier(), TokenVerifier::new(internal_keys()))
}

/// Simulate a request flowing through the gateway and into a backend
fn simulate_flow(
    propagator: &IdentityPropagator,
    resolver: &IdentityResolver,
    authorization: &str,
) -> Result<crypto_core::Principal, ResolveError> {
    // GATEWAY: verify the caller
    let principal = resolver_for_gateway().resolve(Some(authorization), None)?;
    let headers = propagator.outbound_headers(&principal, authorization).unwrap();

    // BACKEND: resolve from whatever arrived
    resolver.resolve(
        header(&headers, "authorization"),
        header(&headers, INTERNAL_ASSERTION_HEADER),
    )
}

fn resolver_for_gateway() -> IdentityResolver {
    IdentityResolver::bearer_only(verifier())
}

#[test]
fn test_forward_mode_end_to_end() {
    let authorization = format!("Bearer {}", token_for("u-1", Role::User));
    let principal = simulate_flow(
        &IdentityPropagator::forward(),
        &IdentityResolver::bearer_only(verifier()),
        &authorization,
    )
    .unwrap();

    assert_eq!(principal.subject_id(), "u-1");
    assert_eq!(principal.role(), Role::User);
}

#[test]
fn test_assertion_mode_end_to_end() {
    let issuer = AssertionIssuer::new(internal_keys(), Duration::seconds(30)).unwrap();
    let propagator = IdentityPropagator::assertion(issuer);
    let authorization = format!("Bearer {}", token_for("admin-1", Role::Admin));

    let principal = simulate_flow(&propagator, &assertion_resolver(), &authorization).unwrap();

    assert_eq!(principal.subject_id(), "admin-1");
    assert!(principal.is_admin());
    assert_eq!(principal.claims().aud.as_deref(), Some("internal"));
}

#[test]
fn test_assertion_mode_drops_original_token() {
    let issuer = AssertionIssuer::new(internal_keys(), Duration::seconds(30)).unwrap();
    let propagator = IdentityPropagator::assertion(issuer);
    let authorization = format!("Bearer {}", token_for("u-1", Role::User));
    let principal = resolver_for_gateway().resolve(Some(&authorization), None).unwrap();

    let headers = propagator.outbound_headers(&principal, &authorization).unwrap();

    assert!(header(&headers, "authorization").is_none());
    assert!(header(&headers, INTERNAL_ASSERTION_HEADER).is_some());
}

#[test]
fn test_assertion_is_short_lived() {
    let issuer = AssertionIssuer::new(internal_keys(), Duration::seconds(30)).unwrap();
    let principal = verifier().verify(&token_for("u-1", Role::User)).unwrap();
    let now = chrono::Utc::now().timestamp();

    let assertion = issuer.issue_at(&principal, now).unwrap();
    let internal = TokenVerifier::new(internal_keys()).with_audience("internal");

    assert!(internal.verify_at(&assertion, now + 29).is_ok());
    assert_eq!(
        internal.verify_at(&assertion, now + 30),
        Err(VerificationError::Expired)
    );
}

#[test]
fn test_user_token_cannot_pose_as_assertion() {
    // A user token signed by the user key presented as an assertion
    let user_token = token_for("u-1", Role::Admin);
    let err = assertion_resolver()
        .resolve(None, Some(&user_token))
        .unwrap_err();
    assert_eq!(err, ResolveError::Verification(VerificationError::InvalidSignature));
}

#[test]
fn test_assertion_from_wrong_key_is_rejected() {
    // Signed with the user key instead of the gateway key
    let issuer = AssertionIssuer::new(primary_keys(), Duration::seconds(30)).unwrap();
    let principal = verifier().verify(&token_for("u-1", Role::User)).unwrap();
    let forged = issuer.issue(&principal).unwrap();

    let err = assertion_resolver().resolve(None, Some(&forged)).unwrap_err();
    assert_eq!(err, ResolveError::Verification(VerificationError::InvalidSignature));
}

#[test]
fn test_invalid_assertion_does_not_fall_back_to_bearer() {
    let authorization = format!("Bearer {}", token_for("u-1", Role::User));
    let err = assertion_resolver()
        .resolve(Some(&authorization), Some("not-a-token"))
        .unwrap_err();
    assert_eq!(err, ResolveError::Verification(VerificationError::MalformedToken));
}

#[test]
fn test_assertion_ignored_when_not_configured() {
    let issuer = AssertionIssuer::new(internal_keys(), Duration::seconds(30)).unwrap();
    let principal = verifier().verify(&token_for("u-1", Role::User)).unwrap();
    let assertion = issuer.issue(&principal).unwrap();

    let err = IdentityResolver::bearer_only(verifier())
        .resolve(None, Some(&assertion))
        .unwrap_err();
    assert_eq!(err, ResolveError::MissingCredentials);
}

#[test]
fn test_missing_and_malformed_headers() {
    let resolver = IdentityResolver::bearer_only(verifier());
    assert_eq!(resolver.resolve(None, None).unwrap_err(), ResolveError::MissingCredentials);
    assert_eq!(
        resolver.resolve(Some("Token abc"), None).unwrap_err(),
        ResolveError::MalformedHeader
    );
}

#[test]
fn test_gateway_key_must_be_able_to_sign() {
    let public_only = Arc::new(KeyMaterial::verify_only(crypto_core::testing::INTERNAL_PUBLIC_PEM).unwrap());
    assert!(AssertionIssuer::new(public_only, Duration::seconds(30)).is_err());
}
