//! Application configuration management.
//!
//! Configuration lives at `~/.config/autocheckin/config.json`. Every field has
//! a default, so a missing file is not an error. A handful of environment
//! variables override the file after it is read.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/data directory paths
pub const APP_NAME: &str = "autocheckin";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Credential store file name inside the base directory
const CREDENTIALS_FILE: &str = "credentials.txt";

/// Default remote API root
pub const DEFAULT_API_BASE_URL: &str = "https://datavancedbd.rysenova.net/api/v1";

/// Minutes between check-in cycles.
const DEFAULT_INTERVAL_MINUTES: u64 = 10;

/// Longest accepted interval: one week
const MAX_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

/// The login endpoint does not report an expiry, so tokens are trusted for a
/// fixed window.
pub(crate) const DEFAULT_TOKEN_TTL_HOURS: i64 = 8;

/// Longest accepted token lifetime: 30 days
const MAX_TOKEN_TTL_HOURS: i64 = 30 * 24;

/// Credential corrections allowed per identity per cycle.
pub(crate) const DEFAULT_MAX_RECOVERY_ATTEMPTS: u32 = 3;

pub const ENV_BASE_DIR: &str = "AUTOCHECKIN_BASE_DIR";
pub const ENV_API_URL: &str = "AUTOCHECKIN_API_URL";
pub const ENV_INTERVAL_MINUTES: &str = "AUTOCHECKIN_INTERVAL_MINUTES";

/// Where secrets are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SecretBackend {
    /// Plaintext, inside the credential line
    #[default]
    File,
    /// OS keychain; the credential line only keeps the identity
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_dir: Option<PathBuf>,
    pub api_base_url: String,
    pub interval_minutes: u64,
    pub token_ttl_hours: i64,
    pub max_recovery_attempts: u32,
    pub secret_backend: SecretBackend,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_dir: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
            token_ttl_hours: DEFAULT_TOKEN_TTL_HOURS,
            max_recovery_attempts: DEFAULT_MAX_RECOVERY_ATTEMPTS,
            secret_backend: SecretBackend::File,
        }
    }
}

impl Config {
    /// Load the config file (if any) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config
            .validate()
            .with_context(|| format!("Invalid configuration (file {})", path.display()))?;
        Ok(config)
    }

    /// Reject values the agent cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.api_base_url.trim().is_empty() {
            bail!("api_base_url must not be empty");
        }
        self.interval()?;
        self.token_ttl()?;
        Ok(())
    }

    /// Apply overrides from a variable lookup (normally the process environment).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_BASE_DIR).filter(|v| !v.trim().is_empty()) {
            self.base_dir = Some(PathBuf::from(dir));
        }
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.api_base_url = url;
        }
        if let Some(minutes) = lookup(ENV_INTERVAL_MINUTES) {
            self.interval_minutes = minutes
                .trim()
                .parse()
                .with_context(|| format!("{} must be a whole number of minutes", ENV_INTERVAL_MINUTES))?;
        }
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the credential store, token files and logs.
    pub fn base_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.base_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn credentials_path(&self) -> Result<PathBuf> {
        Ok(self.base_dir()?.join(CREDENTIALS_FILE))
    }

    pub fn log_dir(&self) -> Result<PathBuf> {
        Ok(self.base_dir()?.join("logs"))
    }

    pub fn token_ttl(&self) -> Result<chrono::Duration> {
        if !(1..=MAX_TOKEN_TTL_HOURS).contains(&self.token_ttl_hours) {
            bail!(
                "token_ttl_hours must be between 1 and {}, got {}",
                MAX_TOKEN_TTL_HOURS,
                self.token_ttl_hours
            );
        }
        chrono::Duration::try_hours(self.token_ttl_hours)
            .ok_or_else(|| anyhow::anyhow!("token_ttl_hours {} is out of range", self.token_ttl_hours))
    }

    pub fn interval(&self) -> Result<std::time::Duration> {
        if !(1..=MAX_INTERVAL_MINUTES).contains(&self.interval_minutes) {
            bail!(
                "interval_minutes must be between 1 and {}, got {}",
                MAX_INTERVAL_MINUTES,
                self.interval_minutes
            );
        }
        let secs = self
            .interval_minutes
            .checked_mul(60)
            .ok_or_else(|| anyhow::anyhow!("interval_minutes {} is out of range", self.interval_minutes))?;
        Ok(std::time::Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.interval_minutes, 10);
        assert_eq!(config.token_ttl().unwrap(), chrono::Duration::hours(8));
        assert!(config.validate().is_ok());
        assert_eq!(config.max_recovery_attempts, 3);
        assert_eq!(config.secret_backend, SecretBackend::File);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"interval_minutes": 5, "secret_backend": "keyring"}"#)
                .expect("partial config should parse");
        assert_eq!(config.interval_minutes, 5);
        assert_eq!(config.secret_backend, SecretBackend::Keyring);
        assert_eq!(config.token_ttl_hours, 8);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_BASE_DIR, "/tmp/autocheckin-test"),
            (ENV_API_URL, "http://localhost:9999/api"),
            (ENV_INTERVAL_MINUTES, " 15 "),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .expect("overrides should apply");

        assert_eq!(
            config.credentials_path().unwrap(),
            PathBuf::from("/tmp/autocheckin-test/credentials.txt")
        );
        assert_eq!(config.api_base_url, "http://localhost:9999/api");
        assert_eq!(config.interval().unwrap(), std::time::Duration::from_secs(15 * 60));
    }

    #[test]
    fn test_out_of_range_values_are_rejected_without_panicking() {
        for json in [
            format!(r#"{{"interval_minutes": {}}}"#, u64::MAX),
            r#"{"interval_minutes": 0}"#.to_string(),
            format!(r#"{{"token_ttl_hours": {}}}"#, i64::MAX),
            r#"{"token_ttl_hours": -5}"#.to_string(),
            r#"{"token_ttl_hours": 0}"#.to_string(),
            r#"{"api_base_url": "  "}"#.to_string(),
        ] {
            let config: Config = serde_json::from_str(&json).expect("config should parse");
            assert!(config.validate().is_err(), "{} should be rejected", json);
        }

        let config: Config = serde_json::from_str(&format!(r#"{{"interval_minutes": {}}}"#, u64::MAX)).unwrap();
        assert!(config.interval().is_err());
        let config: Config = serde_json::from_str(r#"{"token_ttl_hours": -5}"#).unwrap();
        assert!(config.token_ttl().is_err());
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let config: Config =
            serde_json::from_str(r#"{"interval_minutes": 10080, "token_ttl_hours": 720}"#).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.token_ttl().unwrap(), chrono::Duration::hours(720));
    }

    #[test]
    fn test_bad_interval_override_is_an_error() {
        let mut config = Config::default();
        let result = config.apply_overrides(|key| {
            (key == ENV_INTERVAL_MINUTES).then(|| "ten".to_string())
        });
        assert!(result.is_err());
    }
}
