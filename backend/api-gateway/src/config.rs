use anyhow::{bail, Context, Result};
use crypto_core::KeySource;
use dotenvy::dotenv;
use identity_propagation::{PropagationMode, DEFAULT_ASSERTION_TTL_SECS};
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// User service base URL, serves `/api/*`
    pub rest_api_url: String,
    /// Task service base URL, serves `/tasks-api/*` rewritten to `/api/*`
    pub task_api_url: String,
    pub upstream_timeout_secs: u64,
    /// Public key for verifying user tokens
    pub public_key: Option<KeySource>,
    /// Fallback when no local public key is configured
    pub public_key_url: String,
    pub propagation: PropagationMode,
    /// Gateway-only signing key, required in assertion mode
    pub assertion_private_key: Option<KeySource>,
    pub assertion_ttl_secs: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid port number")?;

        let rest_api_url = base_url("REST_API_URL", "http://localhost:3001");
        let task_api_url = base_url("TASK_API_URL", "http://localhost:4000");

        let propagation = env::var("IDENTITY_PROPAGATION")
            .unwrap_or_else(|_| "forward".to_string())
            .parse::<PropagationMode>()?;

        let assertion_private_key = KeySource::from_env(
            "INTERNAL_ASSERTION_PRIVATE_KEY_PEM",
            "INTERNAL_ASSERTION_PRIVATE_KEY_PATH",
        );
        if propagation == PropagationMode::SignedAssertion && assertion_private_key.is_none() {
            bail!(
                "IDENTITY_PROPAGATION=assertion requires INTERNAL_ASSERTION_PRIVATE_KEY_PEM or INTERNAL_ASSERTION_PRIVATE_KEY_PATH"
            );
        }

        let assertion_ttl_secs = match env::var("INTERNAL_ASSERTION_TTL_SECS") {
            Ok(v) => v
                .parse::<i64>()
                .context("INTERNAL_ASSERTION_TTL_SECS must be an integer number of seconds")?,
            Err(_) => DEFAULT_ASSERTION_TTL_SECS,
        };
        if assertion_ttl_secs <= 0 {
            bail!("INTERNAL_ASSERTION_TTL_SECS must be positive");
        }

        let upstream_timeout_secs = env::var("UPSTREAM_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u64>()
            .context("UPSTREAM_TIMEOUT_SECS must be an integer number of seconds")?;

        let public_key_url = env::var("AUTH_PUBLIC_KEY_URL")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| format!("{rest_api_url}/api/auth/public-key"));

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port,
            rest_api_url,
            task_api_url,
            upstream_timeout_secs,
            public_key: KeySource::from_env("JWT_PUBLIC_KEY_PEM", "JWT_PUBLIC_KEY_PATH"),
            public_key_url,
            propagation,
            assertion_private_key,
            assertion_ttl_secs,
        })
    }
}

fn base_url(var: &str, default: &str) -> String {
    env::var(var)
        .unwrap_or_else(|_| default.to_string())
        .trim_end_matches('/')
        .to_string()
}
