use async_trait::async_trait;
use chrono::Utc;
use error_types::ServiceError;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::models::{Team, User, UserChanges, UserFilter};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("user {0} not found")]
    NotFound(String),
    #[error("email {0} is already registered")]
    EmailTaken(String),
}

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(id) => ServiceError::NotFound(format!("User {id}")),
            RepositoryError::EmailTaken(_) => {
                ServiceError::Conflict("A user with this email already exists".to_string())
            }
        }
    }
}

/// User storage. Emails are unique, compared case-insensitively.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert(&self, user: User) -> Result<User, RepositoryError>;
    async fn find_by_id(&self, id: &str) -> Option<User>;
    async fn find_by_email(&self, email: &str) -> Option<User>;
    async fn list(&self, filter: &UserFilter) -> Vec<User>;
    async fn update(&self, id: &str, changes: UserChanges) -> Result<User, RepositoryError>;
    async fn delete(&self, id: &str) -> Result<User, RepositoryError>;
}

/// In-process store, insertion ordered
#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<Vec<User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn same_email(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn insert(&self, user: User) -> Result<User, RepositoryError> {
        let mut users = self.users.write().await;
        if users.iter().any(|u| same_email(&u.email, &user.email)) {
            return Err(RepositoryError::EmailTaken(user.email));
        }
        users.push(user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: &str) -> Option<User> {
        self.users.read().await.iter().find(|u| u.id == id).cloned()
    }

    async fn find_by_email(&self, email: &str) -> Option<User> {
        self.users
            .read()
            .await
            .iter()
            .find(|u| same_email(&u.email, email))
            .cloned()
    }

    async fn list(&self, filter: &UserFilter) -> Vec<User> {
        let search = filter.search.as_ref().map(|s| s.to_lowercase());

        self.users
            .read()
            .await
            .iter()
            .filter(|u| filter.role.map_or(true, |role| u.role == role))
            .filter(|u| match &search {
                Some(s) => u.name.to_lowercase().contains(s) || u.email.to_lowercase().contains(s),
                None => true,
            })
            .cloned()
            .collect()
    }

    async fn update(&self, id: &str, changes: UserChanges) -> Result<User, RepositoryError> {
        let mut users = self.users.write().await;

        if let Some(email) = &changes.email {
            if users.iter().any(|u| u.id != id && same_email(&u.email, email)) {
                return Err(RepositoryError::EmailTaken(email.clone()));
            }
        }

        let user = users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;

        if let Some(name) = changes.name {
            user.name = name;
        }
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(age) = changes.age {
            user.age = Some(age);
        }
        if let Some(role) = changes.role {
            user.role = role;
        }
        user.updated_at = Utc::now();

        Ok(user.clone())
    }

    async fn delete(&self, id: &str) -> Result<User, RepositoryError> {
        let mut users = self.users.write().await;
        let index = users
            .iter()
            .position(|u| u.id == id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        Ok(users.remove(index))
    }
}

/// Team storage
#[async_trait]
pub trait TeamRepository: Send + Sync {
    async fn insert(&self, team: Team) -> Team;
    /// Teams `user_id` belongs to, in creation order
    async fn list_for_member(&self, user_id: &str) -> Vec<Team>;
}

#[derive(Default)]
pub struct InMemoryTeamRepository {
    teams: RwLock<Vec<Team>>,
}

impl InMemoryTeamRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TeamRepository for InMemoryTeamRepository {
    async fn insert(&self, team: Team) -> Team {
        self.teams.write().await.push(team.clone());
        team
    }

    async fn list_for_member(&self, user_id: &str) -> Vec<Team> {
        self.teams
            .read()
            .await
            .iter()
            .filter(|t| t.has_member(user_id))
            .cloned()
            .collect()
    }
}
