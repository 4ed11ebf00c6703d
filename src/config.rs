use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub audience: String,
    pub issuer: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub request_timeout_secs: u64,
}

impl AiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub ai: AiConfig,
    pub feed_capacity: usize,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key/value source; missing optional keys fall back to defaults.
    pub fn from_lookup<F>(get: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| get(key).with_context(|| format!("{key} must be set"));
        let or_default = |key: &str, default: &str| get(key).unwrap_or_else(|| default.into());
        let parsed = |key: &str, default: u64| -> anyhow::Result<u64> {
            match get(key) {
                Some(v) => v
                    .parse::<u64>()
                    .with_context(|| format!("{key} must be a positive integer, got {v:?}")),
                None => Ok(default),
            }
        };

        let jwt = JwtConfig {
            secret: required("JWT_SECRET")?,
            audience: or_default("JWT_AUDIENCE", "authenticated"),
            issuer: get("JWT_ISSUER"),
        };

        let storage = StorageConfig {
            endpoint: or_default("MINIO_ENDPOINT", "http://localhost:9000"),
            bucket: or_default("MINIO_BUCKET", "foodshare"),
            access_key: or_default("MINIO_ACCESS_KEY", "minioadmin"),
            secret_key: or_default("MINIO_SECRET_KEY", "minioadmin"),
            region: or_default("MINIO_REGION", "us-east-1"),
        };

        let ai = AiConfig {
            api_key: required("GEMINI_API_KEY")?,
            model: or_default("GEMINI_MODEL", "gemini-1.5-flash"),
            endpoint: or_default(
                "GEMINI_ENDPOINT",
                "https://generativelanguage.googleapis.com/v1beta",
            ),
            max_attempts: parsed("AI_MAX_ATTEMPTS", 5)? as u32,
            base_delay_ms: parsed("AI_BASE_DELAY_MS", 5_000)?,
            max_delay_ms: parsed("AI_MAX_DELAY_MS", 60_000)?,
            request_timeout_secs: parsed("AI_REQUEST_TIMEOUT_SECS", 60)?,
        };

        let host = or_default("APP_HOST", "0.0.0.0");
        let port = or_default("APP_PORT", "8080");
        let bind_addr = format!("{host}:{port}")
            .parse::<SocketAddr>()
            .with_context(|| format!("APP_HOST/APP_PORT do not form an address: {host}:{port}"))?;

        Ok(Self {
            bind_addr,
            database_url: required("DATABASE_URL")?,
            jwt,
            storage,
            ai,
            feed_capacity: parsed("FEED_CAPACITY", 64)? as usize,
        })
    }
}
