//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. The
//! database URL can be overridden through an env var referenced by name in
//! the config, resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub app: AppSection,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub seed: SeedConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
    pub currency: String,
    /// Balance granted to every newly created bettor.
    pub starting_balance: Decimal,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    /// Env var that, when set, overrides `url`.
    #[serde(default)]
    pub url_env: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SeedConfig {
    pub enabled: bool,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// The effective database URL, after env override.
    pub fn database_url(&self) -> String {
        if let Some(env_name) = self.database.url_env.as_deref() {
            if let Ok(url) = std::env::var(env_name) {
                return url;
            }
        }
        self.database.url.clone()
    }
}
