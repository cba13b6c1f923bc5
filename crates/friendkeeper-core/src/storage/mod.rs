mod config;
pub mod database;

pub use config::{Config, LlmConfig, PaymentConfig, PolicyConfig};
pub use database::Database;

use std::path::PathBuf;

/// Returns `~/.config/friendkeeper[-dev]/` based on FRIENDKEEPER_ENV.
///
/// Set FRIENDKEEPER_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if the home directory cannot be determined or if
/// creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("FRIENDKEEPER_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("friendkeeper-dev")
    } else {
        base_dir.join("friendkeeper")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
