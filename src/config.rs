//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. The
//! database URL may be overridden by the environment variable named in
//! `database.url_env`, so credentials can live in `.env` instead of the
//! config file.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;

use crate::engine::settlement::PrizePool;
use crate::engine::simulation::RaceSettings;
use crate::types::RallyError;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub app: AppSection,
    pub database: DatabaseConfig,
    pub race: RaceConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
    #[serde(default = "default_currency")]
    pub currency: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    /// Env var that, when set, replaces `url`.
    #[serde(default = "default_url_env")]
    pub url_env: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default)]
    pub seed_sample_data: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RaceConfig {
    pub distance_km: f64,
    pub entry_fee: Decimal,
    #[serde(default = "default_prize_positions")]
    pub prize_positions: usize,
    #[serde(default)]
    pub noise_secs: f64,
    /// Only teams that can pay the fee may enter.
    #[serde(default)]
    pub require_entry_fee: bool,
    #[serde(default)]
    pub prize_pool: PrizePool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_url_env() -> String {
    "RALLY_DATABASE_URL".to_string()
}

fn default_max_connections() -> u32 {
    4
}

fn default_prize_positions() -> usize {
    3
}

impl RaceConfig {
    /// Engine settings for a race using these defaults.
    pub fn settings(&self) -> RaceSettings {
        RaceSettings {
            distance_km: self.distance_km,
            entry_fee: self.entry_fee,
            prize_pool: self.prize_pool.clone(),
            prize_positions: self.prize_positions,
            noise_secs: self.noise_secs,
            require_entry_fee: self.require_entry_fee,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Invalid config file: {path}"))
    }

    /// Parse and validate configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RallyError> {
        if self.database.max_connections == 0 {
            return Err(RallyError::Config(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if !(self.race.noise_secs.is_finite() && self.race.noise_secs >= 0.0) {
            return Err(RallyError::Config(format!(
                "race.noise_secs must be a non-negative number, got {}",
                self.race.noise_secs
            )));
        }
        self.race.settings().validate().map_err(|e| match e {
            RallyError::Validation(msg) => RallyError::Config(msg),
            other => other,
        })
    }

    /// The database URL, preferring the environment override.
    pub fn database_url(&self) -> SecretString {
        let url = Self::resolve_env(&self.database.url_env)
            .unwrap_or_else(|_| self.database.url.clone());
        SecretString::new(url)
    }

    /// Value of `env_name`; unset and blank both count as missing.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        let value = std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))?;
        if value.trim().is_empty() {
            anyhow::bail!("Environment variable is empty: {env_name}");
        }
        Ok(value)
    }
}
