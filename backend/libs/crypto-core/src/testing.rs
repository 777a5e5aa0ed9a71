//! Fixture keys and helpers for tests, here and in dependent crates
//! (enable the `test-util` feature).

use std::sync::Arc;

use chrono::Utc;

use crate::claims::{IdentityClaim, Principal, PrincipalAttributes, Role};
use crate::jwt::{TokenAuthority, TokenVerifier};
use crate::keys::KeyMaterial;

pub const PRIMARY_PRIVATE_PEM: &str = include_str!("../tests/fixtures/primary_private.pem");
pub const PRIMARY_PUBLIC_PEM: &str = include_str!("../tests/fixtures/primary_public.pem");
pub const SECONDARY_PRIVATE_PEM: &str = include_str!("../tests/fixtures/secondary_private.pem");
pub const SECONDARY_PUBLIC_PEM: &str = include_str!("../tests/fixtures/secondary_public.pem");
pub const INTERNAL_PRIVATE_PEM: &str = include_str!("../tests/fixtures/internal_private.pem");
pub const INTERNAL_PUBLIC_PEM: &str = include_str!("../tests/fixtures/internal_public.pem");

pub fn primary_keys() -> Arc<KeyMaterial> {
    Arc::new(KeyMaterial::from_pem(PRIMARY_PRIVATE_PEM, PRIMARY_PUBLIC_PEM).expect("primary fixture keys"))
}

pub fn internal_keys() -> Arc<KeyMaterial> {
    Arc::new(
        KeyMaterial::from_pem(INTERNAL_PRIVATE_PEM, INTERNAL_PUBLIC_PEM).expect("internal fixture keys"),
    )
}

/// Authority signing with the primary fixture key
pub fn authority() -> TokenAuthority {
    TokenAuthority::new(primary_keys()).expect("fixture keys can sign")
}

/// Verifier for tokens from [`authority`]
pub fn verifier() -> TokenVerifier {
    TokenVerifier::new(primary_keys())
}

/// Issue a primary-key token for `subject_id` valid for the next hour
pub fn token_for(subject_id: &str, role: Role) -> String {
    authority()
        .issue(&PrincipalAttributes::new(
            subject_id,
            format!("{subject_id}@example.com"),
            role,
        ))
        .expect("fixture token")
        .token
}

/// A principal valid for the next hour, without a signing round-trip
pub fn principal(subject_id: &str, role: Role) -> Principal {
    principal_expiring_at(subject_id, role, Utc::now().timestamp() + 3600)
}

pub fn principal_expiring_at(subject_id: &str, role: Role, exp: i64) -> Principal {
    Principal::from_verified(IdentityClaim {
        sub: subject_id.to_string(),
        email: format!("{subject_id}@example.com"),
        role,
        iat: exp - 3600,
        exp,
        aud: None,
    })
}
