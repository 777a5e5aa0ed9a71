use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crypto_core::{AuthorizationPolicy, KeyMaterial, Role, TokenVerifier};
use event_broker::{BrokerConfig, EventBroker};
use identity_propagation::IdentityResolver;

use crate::config::Config;
use crate::repository::{InMemoryTaskRepository, TaskRepository};

#[derive(Clone)]
pub struct AppState {
    pub tasks: Arc<dyn TaskRepository>,
    pub broker: EventBroker,
    pub resolver: Arc<IdentityResolver>,
    pub policy: Arc<AuthorizationPolicy>,
}

impl AppState {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        broker: EventBroker,
        resolver: IdentityResolver,
        policy: AuthorizationPolicy,
    ) -> Self {
        Self {
            tasks,
            broker,
            resolver: Arc::new(resolver),
            policy: Arc::new(policy),
        }
    }

    /// Build everything from configuration. Missing key material is fatal.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let keys = match (&config.public_key, &config.public_key_url) {
            (Some(source), _) => {
                KeyMaterial::load(None, Some(source)).context("Failed to load JWT public key")?
            }
            (None, Some(url)) => {
                let pem = fetch_public_key(url).await?;
                KeyMaterial::verify_only(&pem)
                    .with_context(|| format!("Invalid public key served by {url}"))?
            }
            (None, None) => anyhow::bail!("No JWT public key source configured"),
        };
        let user_verifier = TokenVerifier::new(Arc::new(keys));

        let resolver = match &config.internal_assertion_public_key {
            Some(source) => {
                let assertion_keys = KeyMaterial::load(None, Some(source))
                    .context("Failed to load internal assertion public key")?;
                IdentityResolver::with_assertions(
                    user_verifier,
                    TokenVerifier::new(Arc::new(assertion_keys)),
                )
            }
            None => IdentityResolver::bearer_only(user_verifier),
        };

        let policy = config
            .admin_only_topics
            .iter()
            .fold(AuthorizationPolicy::new(), |policy, topic| {
                policy.restrict_topic(topic.clone(), Role::Admin)
            });

        let broker = EventBroker::new(BrokerConfig {
            channel_capacity: config.broker.channel_capacity,
            enforce_expiry: config.broker.enforce_expiry,
        });

        tracing::info!(
            channel_capacity = config.broker.channel_capacity,
            enforce_expiry = config.broker.enforce_expiry,
            admin_only_topics = ?config.admin_only_topics,
            "Event broker configured"
        );

        Ok(Self::new(
            Arc::new(InMemoryTaskRepository::new()),
            broker,
            resolver,
            policy,
        ))
    }
}

/// Download the user service's PEM public key
async fn fetch_public_key(url: &str) -> Result<String> {
    tracing::info!(%url, "Fetching JWT public key");

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .context("Failed to build HTTP client")?;

    client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to fetch public key from {url}"))?
        .error_for_status()
        .with_context(|| format!("Public key endpoint {url} returned an error"))?
        .text()
        .await
        .context("Failed to read public key response")
}
