//! TOML-based application configuration.
//!
//! Stores the tunable policy constants (free-trial grant, health grace
//! window) and the credentials for the two external services: the LLM proxy
//! used for talk-starter generation and the payment provider used for token
//! checkout.
//!
//! Configuration is stored at `~/.config/friendkeeper/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;

/// Policy constants inferred from the product contract.
///
/// These are deliberately configuration, not hardcoded law: the grace
/// multiplier shapes the yellow band of the health classifier and the
/// free-trial grant seeds new ledgers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_grace_multiplier")]
    pub grace_multiplier: f64,
    #[serde(default = "default_free_trial_grant")]
    pub free_trial_grant: u32,
}

/// LLM proxy configuration for talk-starter generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_proxy_url")]
    pub proxy_url: String,
    /// Empty means unconfigured; generation falls back to canned starters.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
}

/// Payment provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfig {
    #[serde(default = "default_payment_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub webhook_secret: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/friendkeeper/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub payment: PaymentConfig,
}

// Default functions
fn default_grace_multiplier() -> f64 {
    1.5
}
fn default_free_trial_grant() -> u32 {
    3
}
fn default_llm_proxy_url() -> String {
    "https://llm-proxy.densematrix.ai".into()
}
fn default_llm_model() -> String {
    "gpt-4o-mini".into()
}
fn default_payment_api_url() -> String {
    "https://api.creem.io".into()
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            grace_multiplier: default_grace_multiplier(),
            free_trial_grant: default_free_trial_grant(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            proxy_url: default_llm_proxy_url(),
            api_key: String::new(),
            model: default_llm_model(),
        }
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            api_url: default_payment_api_url(),
            api_key: String::new(),
            webhook_secret: String::new(),
        }
    }
}

impl Config {
    fn path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load configuration, falling back to defaults if the file is missing
    /// or unreadable.
    pub fn load() -> Self {
        let Ok(path) = Self::path() else {
            return Self::default();
        };
        match std::fs::read_to_string(&path) {
            Ok(raw) => toml::from_str(&raw).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk.
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails.
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let path = Self::path()?;
        let raw = toml::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }
}
