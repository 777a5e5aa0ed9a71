use anyhow::{bail, Context, Result};
use crypto_core::{KeySource, DEFAULT_TOKEN_LIFETIME_SECS};
use dotenvy::dotenv;
use std::env;

#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Signing key for user tokens
    pub private_key: Option<KeySource>,
    /// Optional; derived from the private key when absent
    pub public_key: Option<KeySource>,
    /// Generate a throwaway keypair at startup (development only)
    pub ephemeral_keys: bool,
    pub token_lifetime_secs: i64,
    /// Gateway assertion key, when the gateway runs in assertion mode
    pub internal_assertion_public_key: Option<KeySource>,
    /// Honour the `role` field on self-registration
    pub allow_register_role: bool,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3001".to_string())
            .parse::<u16>()
            .context("PORT must be a valid port number")?;

        let token_lifetime_secs = match env::var("JWT_EXPIRES_IN_SECS") {
            Ok(v) => v
                .parse::<i64>()
                .context("JWT_EXPIRES_IN_SECS must be an integer number of seconds")?,
            Err(_) => DEFAULT_TOKEN_LIFETIME_SECS,
        };
        if token_lifetime_secs <= 0 {
            bail!("JWT_EXPIRES_IN_SECS must be positive");
        }

        let bootstrap_admin = match (
            env::var("BOOTSTRAP_ADMIN_EMAIL").ok(),
            env::var("BOOTSTRAP_ADMIN_PASSWORD").ok(),
        ) {
            (Some(email), Some(password)) => Some(BootstrapAdmin {
                name: env::var("BOOTSTRAP_ADMIN_NAME").unwrap_or_else(|_| "Administrator".to_string()),
                email,
                password,
            }),
            (None, None) => None,
            _ => bail!("BOOTSTRAP_ADMIN_EMAIL and BOOTSTRAP_ADMIN_PASSWORD must be set together"),
        };

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port,
            private_key: KeySource::from_env("JWT_PRIVATE_KEY_PEM", "JWT_PRIVATE_KEY_PATH"),
            public_key: KeySource::from_env("JWT_PUBLIC_KEY_PEM", "JWT_PUBLIC_KEY_PATH"),
            ephemeral_keys: parse_bool("JWT_EPHEMERAL_KEYS", false)?,
            token_lifetime_secs,
            internal_assertion_public_key: KeySource::from_env(
                "INTERNAL_ASSERTION_PUBLIC_KEY_PEM",
                "INTERNAL_ASSERTION_PUBLIC_KEY_PATH",
            ),
            allow_register_role: parse_bool("ALLOW_REGISTER_ROLE", false)?,
            bootstrap_admin,
        })
    }
}

fn parse_bool(var: &str, default: bool) -> Result<bool> {
    match env::var(var) {
        Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            other => bail!("{var} must be a boolean, got {other:?}"),
        },
        Err(_) => Ok(default),
    }
}
