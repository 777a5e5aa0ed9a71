use chrono::{DateTime, Utc};
use crypto_core::Role;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    pub role: Role,
    /// Argon2id PHC string. Users created by an admin without a password cannot log in.
    #[serde(skip)]
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields a PUT may change
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub age: Option<u32>,
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub role: Option<Role>,
    /// Case-insensitive substring of name or email
    pub search: Option<String>,
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 2, max = 50))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 6))]
    pub password: String,
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 2, max = 50))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(range(max = 150))]
    pub age: Option<u32>,
    pub role: Option<Role>,
    #[validate(length(min = 6))]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(length(min = 2, max = 50))]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(range(max = 150))]
    pub age: Option<u32>,
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub role: Option<Role>,
    pub search: Option<String>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub message: &'static str,
    pub token: String,
    pub expires_in: i64,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct UserMessage {
    pub message: &'static str,
    pub user: User,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: usize,
    pub total_pages: usize,
    pub total_users: usize,
    pub has_next: bool,
    pub has_prev: bool,
}

/// A bare array without paging parameters, a page envelope with them
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum UserList {
    All(Vec<User>),
    Page {
        users: Vec<User>,
        pagination: Pagination,
    },
}

impl UserList {
    pub fn paginate(users: Vec<User>, page: usize, limit: usize) -> Self {
        let page = page.max(1);
        let limit = limit.max(1);
        let total = users.len();
        let start = (page - 1).saturating_mul(limit);
        let end = start.saturating_add(limit);

        UserList::Page {
            users: users.into_iter().skip(start).take(limit).collect(),
            pagination: Pagination {
                current_page: page,
                total_pages: total.div_ceil(limit),
                total_users: total,
                has_next: end < total,
                has_prev: start > 0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(n: usize) -> User {
        User {
            id: n.to_string(),
            name: format!("User {n}"),
            email: format!("user{n}@example.com"),
            age: None,
            role: Role::User,
            password_hash: Some("secret-hash".into()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_password_hash_never_serialized() {
        let json = serde_json::to_value(user(1)).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "user");
    }

    #[test]
    fn test_paginate() {
        let users: Vec<User> = (1..=5).map(user).collect();
        let UserList::Page { users, pagination } = UserList::paginate(users, 2, 2) else {
            panic!("expected a page");
        };

        assert_eq!(users.iter().map(|u| u.id.as_str()).collect::<Vec<_>>(), ["3", "4"]);
        assert_eq!(pagination.total_pages, 3);
        assert_eq!(pagination.total_users, 5);
        assert!(pagination.has_next);
        assert!(pagination.has_prev);
    }

    #[test]
    fn test_register_validation() {
        let bad = RegisterRequest {
            name: "A".into(),
            email: "not-an-email".into(),
            password: "123".into(),
            role: None,
        };
        let errors = bad.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("name"));
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
    }
}
