// rest_api/src/config.rs

use anyhow::{Context, Result};
use config::{Config, Environment};
use serde::Deserialize;

use security::TokenSettings;

/// Runtime settings for the REST API server. Defaults suit local
/// development; every field can be overridden through a `HEALTH_*`
/// environment variable (e.g. `HEALTH_PORT`, `HEALTH_ACCESS_TOKEN_SECRET`).
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSettings {
    pub host: String,
    pub port: u16,
    /// "development" exposes internal error detail in 500 responses.
    pub environment: String,
    pub access_token_secret: String,
    pub refresh_token_secret: String,
    pub access_token_ttl_days: i64,
    pub refresh_token_ttl_days: i64,
    pub storage_engine: String,
}

impl ApiSettings {
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn tokens(&self) -> TokenSettings {
        TokenSettings {
            access_secret: self.access_token_secret.clone(),
            refresh_secret: self.refresh_token_secret.clone(),
            access_ttl_days: self.access_token_ttl_days,
            refresh_ttl_days: self.refresh_token_ttl_days,
        }
    }
}

/// Loads settings from the environment on top of built-in defaults.
pub fn load_api_settings() -> Result<ApiSettings> {
    let settings = Config::builder()
        .set_default("host", "127.0.0.1")?
        .set_default("port", 8082_i64)?
        .set_default("environment", "development")?
        .set_default("access_token_secret", "dev-access-secret-change-me")?
        .set_default("refresh_token_secret", "dev-refresh-secret-change-me")?
        .set_default("access_token_ttl_days", 15_i64)?
        .set_default("refresh_token_ttl_days", 30_i64)?
        .set_default("storage_engine", "memory")?
        .add_source(Environment::with_prefix("HEALTH"))
        .build()
        .context("Failed to build REST API configuration")?;

    settings
        .try_deserialize()
        .context("Failed to parse REST API configuration")
}
