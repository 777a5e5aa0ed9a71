//! Role-based authorization decisions over verified principals.

use std::collections::HashMap;

use thiserror::Error;

use crate::claims::{Principal, Role};

/// An operation a principal wants to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action<'a> {
    /// Any verified principal
    Authenticated,
    /// Requires the admin role. Used for destructive operations on another
    /// account (e.g. delete user); an admin may not target itself.
    AdminOnly { target: &'a str },
    /// The principal acts on its own record, or is an admin
    SelfOrAdmin { target: &'a str },
    /// Open a subscription on a topic
    Subscribe { topic: &'a str },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("forbidden: {reason}")]
pub struct Forbidden {
    pub reason: &'static str,
}

impl Forbidden {
    const fn new(reason: &'static str) -> Self {
        Self { reason }
    }
}

/// Stateless policy. Topic restrictions are the only configuration it carries.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationPolicy {
    topic_roles: HashMap<String, Role>,
}

impl AuthorizationPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit subscriptions on `topic` to principals holding `role`
    /// (admins are always admitted).
    pub fn restrict_topic(mut self, topic: impl Into<String>, role: Role) -> Self {
        self.topic_roles.insert(topic.into(), role);
        self
    }

    pub fn authorize(&self, principal: &Principal, action: &Action<'_>) -> Result<(), Forbidden> {
        match *action {
            Action::Authenticated => Ok(()),
            Action::AdminOnly { target } => {
                if !principal.is_admin() {
                    Err(Forbidden::new("admin role required"))
                } else if principal.subject_id() == target {
                    Err(Forbidden::new("admins cannot perform this action on themselves"))
                } else {
                    Ok(())
                }
            }
            Action::SelfOrAdmin { target } => {
                if principal.is_admin() || principal.subject_id() == target {
                    Ok(())
                } else {
                    Err(Forbidden::new("not the owner of this resource"))
                }
            }
            Action::Subscribe { topic } => match self.topic_roles.get(topic) {
                Some(required) if !principal.is_admin() && principal.role() != *required => {
                    Err(Forbidden::new("not allowed to subscribe to this topic"))
                }
                _ => Ok(()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::principal;

    #[test]
    fn test_admin_only_requires_admin() {
        let policy = AuthorizationPolicy::new();
        let user = principal("u1", Role::User);
        let admin = principal("a1", Role::Admin);

        assert!(policy.authorize(&user, &Action::AdminOnly { target: "u2" }).is_err());
        assert!(policy.authorize(&admin, &Action::AdminOnly { target: "u2" }).is_ok());
    }

    #[test]
    fn test_admin_cannot_target_self() {
        let policy = AuthorizationPolicy::new();
        let admin = principal("a1", Role::Admin);

        let err = policy
            .authorize(&admin, &Action::AdminOnly { target: "a1" })
            .unwrap_err();
        assert!(err.reason.contains("themselves"));
    }

    #[test]
    fn test_self_or_admin() {
        let policy = AuthorizationPolicy::new();
        let user = principal("u1", Role::User);
        let admin = principal("a1", Role::Admin);

        assert!(policy.authorize(&user, &Action::SelfOrAdmin { target: "u1" }).is_ok());
        assert!(policy.authorize(&user, &Action::SelfOrAdmin { target: "u2" }).is_err());
        assert!(policy.authorize(&admin, &Action::SelfOrAdmin { target: "u2" }).is_ok());
        assert!(policy.authorize(&admin, &Action::SelfOrAdmin { target: "a1" }).is_ok());
    }

    #[test]
    fn test_subscribe_defaults_to_open() {
        let policy = AuthorizationPolicy::new();
        let user = principal("u1", Role::User);
        assert!(policy.authorize(&user, &Action::Subscribe { topic: "tasks" }).is_ok());
        assert!(policy.authorize(&user, &Action::Authenticated).is_ok());
    }

    #[test]
    fn test_restricted_topic() {
        let policy = AuthorizationPolicy::new().restrict_topic("audit", Role::Admin);
        let user = principal("u1", Role::User);
        let admin = principal("a1", Role::Admin);

        assert!(policy.authorize(&user, &Action::Subscribe { topic: "audit" }).is_err());
        assert!(policy.authorize(&admin, &Action::Subscribe { topic: "audit" }).is_ok());
        assert!(policy.authorize(&user, &Action::Subscribe { topic: "tasks" }).is_ok());
    }
}
