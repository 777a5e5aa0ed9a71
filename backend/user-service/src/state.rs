use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use crypto_core::{
    AuthorizationPolicy, KeyMaterial, Role, TokenAuthority, TokenVerifier,
};
use identity_propagation::IdentityResolver;
use uuid::Uuid;

use crate::config::{BootstrapAdmin, Config};
use crate::models::User;
use crate::repository::{
    InMemoryTeamRepository, InMemoryUserRepository, RepositoryError, TeamRepository, UserRepository,
};
use crate::security::password;

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserRepository>,
    pub teams: Arc<dyn TeamRepository>,
    pub keys: Arc<KeyMaterial>,
    pub authority: Arc<TokenAuthority>,
    pub resolver: Arc<IdentityResolver>,
    pub policy: Arc<AuthorizationPolicy>,
    /// Honour `role` on self-registration
    pub allow_register_role: bool,
}

impl AppState {
    pub fn new(
        users: Arc<dyn UserRepository>,
        keys: Arc<KeyMaterial>,
        token_lifetime: Duration,
        assertion_keys: Option<Arc<KeyMaterial>>,
    ) -> Result<Self> {
        let authority = TokenAuthority::new(keys.clone())
            .context("User token key material cannot sign")?
            .with_lifetime(token_lifetime);

        let user_verifier = TokenVerifier::new(keys.clone());
        let resolver = match assertion_keys {
            Some(assertion_keys) => {
                IdentityResolver::with_assertions(user_verifier, TokenVerifier::new(assertion_keys))
            }
            None => IdentityResolver::bearer_only(user_verifier),
        };

        Ok(Self {
            users,
            teams: Arc::new(InMemoryTeamRepository::new()),
            keys,
            authority: Arc::new(authority),
            resolver: Arc::new(resolver),
            policy: Arc::new(AuthorizationPolicy::new()),
            allow_register_role: false,
        })
    }

    /// Build everything from configuration. Missing key material is fatal.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let keys = if config.ephemeral_keys && config.private_key.is_none() {
            tracing::warn!("Generating an ephemeral signing key; tokens will not survive a restart");
            KeyMaterial::generate(2048)?
        } else {
            KeyMaterial::load(config.private_key.as_ref(), config.public_key.as_ref())
                .context("Failed to load JWT key material")?
        };

        let assertion_keys = config
            .internal_assertion_public_key
            .as_ref()
            .map(|source| KeyMaterial::load(None, Some(source)))
            .transpose()
            .context("Failed to load internal assertion public key")?
            .map(Arc::new);

        let mut state = Self::new(
            Arc::new(InMemoryUserRepository::new()),
            Arc::new(keys),
            Duration::try_seconds(config.token_lifetime_secs)
                .context("JWT_EXPIRES_IN_SECS is out of range")?,
            assertion_keys,
        )?;
        state.allow_register_role = config.allow_register_role;

        if let Some(admin) = &config.bootstrap_admin {
            state.bootstrap_admin(admin).await?;
        }

        Ok(state)
    }

    async fn bootstrap_admin(&self, admin: &BootstrapAdmin) -> Result<()> {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4().to_string(),
            name: admin.name.clone(),
            email: admin.email.trim().to_lowercase(),
            age: None,
            role: Role::Admin,
            password_hash: Some(password::hash_password(&admin.password)?),
            created_at: now,
            updated_at: now,
        };

        match self.users.insert(user).await {
            Ok(user) => {
                tracing::info!(user_id = %user.id, email = %user.email, "Bootstrap admin created");
                Ok(())
            }
            Err(RepositoryError::EmailTaken(email)) => {
                tracing::debug!(%email, "Bootstrap admin already exists");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
