use anyhow::{bail, Context, Result};
use crypto_core::KeySource;
use dotenvy::dotenv;
use event_broker::DEFAULT_CHANNEL_CAPACITY;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub public_key: Option<KeySource>,
    /// Fetched at startup when no local public key is configured
    pub public_key_url: Option<String>,
    pub internal_assertion_public_key: Option<KeySource>,
    pub broker: BrokerSettings,
    /// Topics only admins may subscribe to
    pub admin_only_topics: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct BrokerSettings {
    pub channel_capacity: usize,
    pub enforce_expiry: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let port = env::var("PORT")
            .unwrap_or_else(|_| "4000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid port number")?;

        let channel_capacity = match env::var("BROKER_CHANNEL_CAPACITY") {
            Ok(v) => v
                .parse::<usize>()
                .context("BROKER_CHANNEL_CAPACITY must be a positive integer")?,
            Err(_) => DEFAULT_CHANNEL_CAPACITY,
        };
        if channel_capacity == 0 {
            bail!("BROKER_CHANNEL_CAPACITY must be at least 1");
        }

        let public_key = KeySource::from_env("JWT_PUBLIC_KEY_PEM", "JWT_PUBLIC_KEY_PATH");
        let public_key_url = env::var("AUTH_PUBLIC_KEY_URL").ok().filter(|v| !v.is_empty());
        if public_key.is_none() && public_key_url.is_none() {
            bail!("Set JWT_PUBLIC_KEY_PEM, JWT_PUBLIC_KEY_PATH or AUTH_PUBLIC_KEY_URL");
        }

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port,
            public_key,
            public_key_url,
            internal_assertion_public_key: KeySource::from_env(
                "INTERNAL_ASSERTION_PUBLIC_KEY_PEM",
                "INTERNAL_ASSERTION_PUBLIC_KEY_PATH",
            ),
            broker: BrokerSettings {
                channel_capacity,
                enforce_expiry: parse_bool("BROKER_ENFORCE_EXPIRY", true)?,
            },
            admin_only_topics: env::var("ADMIN_ONLY_TOPICS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}

fn parse_bool(var: &str, default: bool) -> Result<bool> {
    match env::var(var) {
        Ok(v) => match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => bail!("{var} must be a boolean, got {other:?}"),
        },
        Err(_) => Ok(default),
    }
}
