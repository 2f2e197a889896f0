//! Configuration types.

use std::path::PathBuf;

use crate::error::ConfigError;

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Path of the local libSQL database file.
    pub db_path: PathBuf,
    /// Storage partition for this device's user.
    pub user_id: String,
    /// Language used until the user picks one.
    pub default_language: String,
    /// When set, serve the REST surface instead of running the terminal wizard.
    pub http_port: Option<u16>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/lifecompass.db"),
            user_id: "default".to_string(),
            default_language: "en".to_string(),
            http_port: None,
        }
    }
}

impl AppConfig {
    /// Build from `LIFECOMPASS_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = lookup("LIFECOMPASS_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }

        if let Some(user) = lookup("LIFECOMPASS_USER") {
            let user = user.trim();
            if user.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "LIFECOMPASS_USER".to_string(),
                    message: "must not be empty".to_string(),
                });
            }
            config.user_id = user.to_string();
        }

        if let Some(lang) = lookup("LIFECOMPASS_LANGUAGE") {
            config.default_language = lang.trim().to_lowercase();
        }

        if let Some(port) = lookup("LIFECOMPASS_HTTP_PORT") {
            let port = port
                .trim()
                .parse::<u16>()
                .map_err(|e| ConfigError::InvalidValue {
                    key: "LIFECOMPASS_HTTP_PORT".to_string(),
                    message: e.to_string(),
                })?;
            config.http_port = Some(port);
        }

        Ok(config)
    }
}
