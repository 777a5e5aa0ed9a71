use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role carried inside every identity token
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
}

impl Role {
    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

/// Signed payload of an identity token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaim {
    /// Subject (user id)
    pub sub: String,
    pub email: String,
    pub role: Role,
    /// Issued at (Unix timestamp, seconds)
    pub iat: i64,
    /// Expiration time (Unix timestamp, seconds)
    pub exp: i64,
    /// Audience; only internal assertions carry one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

/// Attributes of an authenticated principal, as handed to the token authority
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalAttributes {
    pub subject_id: String,
    pub email: String,
    pub role: Role,
}

impl PrincipalAttributes {
    pub fn new(subject_id: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        Self {
            subject_id: subject_id.into(),
            email: email.into(),
            role,
        }
    }
}

/// A verified identity.
///
/// Only [`TokenVerifier`](crate::TokenVerifier) can construct one, so holding a
/// `Principal` means its token passed every verification step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    claims: IdentityClaim,
}

impl Principal {
    pub(crate) fn from_verified(claims: IdentityClaim) -> Self {
        Self { claims }
    }

    pub fn subject_id(&self) -> &str {
        &self.claims.sub
    }

    pub fn email(&self) -> &str {
        &self.claims.email
    }

    pub fn role(&self) -> Role {
        self.claims.role
    }

    pub fn is_admin(&self) -> bool {
        self.claims.role.is_admin()
    }

    /// Expiry as a Unix timestamp (seconds)
    pub fn expires_at(&self) -> i64 {
        self.claims.exp
    }

    pub fn claims(&self) -> &IdentityClaim {
        &self.claims
    }

    pub fn attributes(&self) -> PrincipalAttributes {
        PrincipalAttributes::new(self.claims.sub.clone(), self.claims.email.clone(), self.claims.role)
    }
}
