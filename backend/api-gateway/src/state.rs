use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crypto_core::{KeyMaterial, TokenVerifier};
use identity_propagation::{AssertionIssuer, IdentityPropagator, IdentityResolver, PropagationMode};

use crate::config::Config;

const PUBLIC_KEY_FETCH_ATTEMPTS: u32 = 5;
const PUBLIC_KEY_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Where a proxied request goes
#[derive(Debug, Clone)]
pub struct Upstreams {
    pub rest_api_url: String,
    pub task_api_url: String,
}

#[derive(Clone)]
pub struct AppState {
    pub client: reqwest::Client,
    pub upstreams: Upstreams,
    /// Verifies callers' bearer tokens before anything is proxied
    pub resolver: Arc<IdentityResolver>,
    pub propagator: Arc<IdentityPropagator>,
}

impl AppState {
    pub fn new(
        upstreams: Upstreams,
        timeout: Duration,
        user_verifier: TokenVerifier,
        propagator: IdentityPropagator,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build upstream HTTP client")?;

        Ok(Self {
            client,
            upstreams,
            resolver: Arc::new(IdentityResolver::bearer_only(user_verifier)),
            propagator: Arc::new(propagator),
        })
    }

    pub async fn from_config(config: &Config) -> Result<Self> {
        let keys = match &config.public_key {
            Some(source) => {
                KeyMaterial::load(None, Some(source)).context("Failed to load JWT public key")?
            }
            None => {
                let pem = fetch_public_key(&config.public_key_url).await?;
                KeyMaterial::verify_only(&pem).with_context(|| {
                    format!("Invalid public key served by {}", config.public_key_url)
                })?
            }
        };

        let propagator = match (config.propagation, &config.assertion_private_key) {
            (PropagationMode::SignedAssertion, Some(source)) => {
                let assertion_keys = KeyMaterial::load(Some(source), None)
                    .context("Failed to load internal assertion private key")?;
                let issuer = AssertionIssuer::new(
                    Arc::new(assertion_keys),
                    chrono::Duration::try_seconds(config.assertion_ttl_secs)
                        .context("INTERNAL_ASSERTION_TTL_SECS is out of range")?,
                )?;
                IdentityPropagator::assertion(issuer)
            }
            (PropagationMode::SignedAssertion, None) => {
                anyhow::bail!("Assertion mode requires an internal assertion private key")
            }
            (PropagationMode::ForwardToken, _) => IdentityPropagator::forward(),
        };

        tracing::info!(
            mode = %propagator.mode(),
            rest_api = %config.rest_api_url,
            task_api = %config.task_api_url,
            "Identity propagation configured"
        );

        Self::new(
            Upstreams {
                rest_api_url: config.rest_api_url.clone(),
                task_api_url: config.task_api_url.clone(),
            },
            Duration::from_secs(config.upstream_timeout_secs),
            TokenVerifier::new(Arc::new(keys)),
            propagator,
        )
    }
}

/// Download the user service's public key, retrying while it starts up
async fn fetch_public_key(url: &str) -> Result<String> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .context("Failed to build HTTP client")?;

    let mut attempt = 1;
    loop {
        let result = async {
            client
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await
        }
        .await;

        match result {
            Ok(pem) => {
                tracing::info!(%url, "Fetched JWT public key");
                return Ok(pem);
            }
            Err(e) if attempt < PUBLIC_KEY_FETCH_ATTEMPTS => {
                tracing::warn!(%url, attempt, error = %e, "Public key fetch failed, retrying");
                tokio::time::sleep(PUBLIC_KEY_RETRY_DELAY).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to fetch public key from {url} after {attempt} attempts")
                })
            }
        }
    }
}
