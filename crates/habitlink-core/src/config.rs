//! SDK configuration management.
//!
//! This module handles loading and saving the SDK configuration, which
//! holds the partner identifier and the backend environment.
//!
//! Configuration is stored at `~/.config/habitlink/config.json` and can be
//! overridden with the `HABITLINK_PARTNER_ID` and `HABITLINK_ENVIRONMENT`
//! environment variables.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::SdkError;

/// Application name used for config/data directory paths
pub const APP_NAME: &str = "habitlink";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const PRODUCTION_BASE_URL: &str = "https://api.habitlink.app/v1";
const STAGING_BASE_URL: &str = "https://staging.api.habitlink.app/v1";

pub const PARTNER_ID_ENV: &str = "HABITLINK_PARTNER_ID";
pub const ENVIRONMENT_ENV: &str = "HABITLINK_ENVIRONMENT";

/// Backend the SDK talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Staging,
}

impl Environment {
    pub fn base_url(&self) -> &'static str {
        match self {
            Environment::Production => PRODUCTION_BASE_URL,
            Environment::Staging => STAGING_BASE_URL,
        }
    }
}

impl FromStr for Environment {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "staging" | "stage" => Ok(Environment::Staging),
            other => Err(SdkError::InvalidSdkConfiguration(format!(
                "unknown environment '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Production => f.write_str("production"),
            Environment::Staging => f.write_str("staging"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdkConfig {
    pub partner_id: String,
    #[serde(default)]
    pub environment: Environment,
}

impl SdkConfig {
    pub fn new(partner_id: impl Into<String>, environment: Environment) -> Self {
        Self {
            partner_id: partner_id.into(),
            environment,
        }
    }

    /// Reject configurations the SDK cannot work with.
    pub fn validate(&self) -> Result<(), SdkError> {
        if self.partner_id.trim().is_empty() {
            return Err(SdkError::InvalidSdkConfiguration(
                "partner id must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Load the config file, then apply environment variable overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(partner_id) = std::env::var(PARTNER_ID_ENV) {
            self.partner_id = partner_id;
        }
        if let Ok(environment) = std::env::var(ENVIRONMENT_ENV) {
            self.environment = environment
                .parse()
                .with_context(|| format!("Invalid {}", ENVIRONMENT_ENV))?;
        }
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for persisted session state.
    pub fn data_dir() -> PathBuf {
        dirs::data_dir()
            .map(|dir| dir.join(APP_NAME))
            .unwrap_or_else(|| PathBuf::from(".habitlink"))
    }
}
