//! Runtime configuration for the sync core.
//!
//! `SyncConfig` tunes the queue and engine, `RemoteConfig` locates the
//! Supabase project, and `AppConfig` is the on-disk file clients load both
//! from. Remote credentials are never written back to disk by this crate.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

/// Attempts before a queue item is parked `FAILED`
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_DRAIN_INTERVAL_SECS: u64 = 30;
/// Minimum age of the last pull before a non-forced pull reads again
pub const DEFAULT_FRESHNESS_WINDOW_SECS: u64 = 5 * 60;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

pub const ENV_SUPABASE_URL: &str = "PRISM_SUPABASE_URL";
pub const ENV_SUPABASE_ANON_KEY: &str = "PRISM_SUPABASE_ANON_KEY";
pub const ENV_ACCESS_TOKEN: &str = "PRISM_ACCESS_TOKEN";
pub const ENV_USER_ID: &str = "PRISM_USER_ID";

const fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

const fn default_drain_interval_secs() -> u64 {
    DEFAULT_DRAIN_INTERVAL_SECS
}

const fn default_freshness_window_secs() -> u64 {
    DEFAULT_FRESHNESS_WINDOW_SECS
}

const fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

const fn default_true() -> bool {
    true
}

/// Queue and engine tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_drain_interval_secs")]
    pub drain_interval_secs: u64,
    #[serde(default = "default_freshness_window_secs")]
    pub freshness_window_secs: u64,
    /// Re-key local records to the id the remote assigned on create
    #[serde(default = "default_true")]
    pub adopt_remote_ids: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            drain_interval_secs: DEFAULT_DRAIN_INTERVAL_SECS,
            freshness_window_secs: DEFAULT_FRESHNESS_WINDOW_SECS,
            adopt_remote_ids: true,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::InvalidInput(
                "sync.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.drain_interval_secs == 0 {
            return Err(Error::InvalidInput(
                "sync.drain_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub const fn drain_interval(&self) -> Duration {
        Duration::from_secs(self.drain_interval_secs)
    }

    pub const fn freshness_window(&self) -> Duration {
        Duration::from_secs(self.freshness_window_secs)
    }
}

/// Supabase project the REST client talks to
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    pub base_url: String,
    pub anon_key: String,
    /// Session token of the signed-in user; the anon key is used without one
    #[serde(default)]
    pub access_token: Option<String>,
    /// Cached principal that owns newly created records
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RemoteConfig")
            .field("base_url", &self.base_url)
            .field("anon_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("user_id", &self.user_id)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl RemoteConfig {
    /// Read the remote configuration from `PRISM_*` environment variables.
    ///
    /// Returns `Ok(None)` when neither the URL nor the anon key is set.
    pub fn from_env() -> Result<Option<Self>> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>> {
        let base_url = normalize_text_option(lookup(ENV_SUPABASE_URL));
        let anon_key = normalize_text_option(lookup(ENV_SUPABASE_ANON_KEY));

        let (base_url, anon_key) = match (base_url, anon_key) {
            (None, None) => return Ok(None),
            (Some(base_url), Some(anon_key)) => (base_url, anon_key),
            (None, Some(_)) => {
                return Err(Error::InvalidInput(format!("{ENV_SUPABASE_URL} is not set")))
            }
            (Some(_), None) => {
                return Err(Error::InvalidInput(format!(
                    "{ENV_SUPABASE_ANON_KEY} is not set"
                )))
            }
        };

        let config = Self {
            base_url,
            anon_key,
            access_token: normalize_text_option(lookup(ENV_ACCESS_TOKEN)),
            user_id: normalize_text_option(lookup(ENV_USER_ID)),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        };
        config.validate()?;
        Ok(Some(config))
    }

    pub fn validate(&self) -> Result<()> {
        if !is_http_url(self.base_url.trim()) {
            return Err(Error::InvalidInput(
                "remote base_url must include http:// or https://".to_string(),
            ));
        }
        if self.anon_key.trim().is_empty() {
            return Err(Error::InvalidInput(
                "remote anon_key must not be empty".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::InvalidInput(
                "remote request_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Contents of the client configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
    /// Principal used when running without a remote
    #[serde(default)]
    pub user_id: Option<String>,
}

impl AppConfig {
    /// Load from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let config = Self::parse(&raw)?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let mut config: Self = serde_json::from_str(raw)?;
        config.user_id = normalize_text_option(config.user_id.take());
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.sync.validate()?;
        if let Some(remote) = &self.remote {
            remote.validate()?;
        }
        Ok(())
    }

    /// Remote settings with environment variables taking precedence
    pub fn resolve_remote(&self) -> Result<Option<RemoteConfig>> {
        Ok(RemoteConfig::from_env()?.or_else(|| self.remote.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn sync_config_defaults_fill_missing_fields() {
        let config: SyncConfig = serde_json::from_str(r#"{ "max_attempts": 3 }"#).unwrap();
        assert_eq!(
            config,
            SyncConfig {
                max_attempts: 3,
                ..SyncConfig::default()
            }
        );
        assert_eq!(config.freshness_window(), Duration::from_secs(300));
        assert!(config.adopt_remote_ids);
    }

    #[test]
    fn sync_config_rejects_zero_attempts() {
        let config = SyncConfig {
            max_attempts: 0,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn app_config_rejects_unknown_fields() {
        let error = AppConfig::parse(r#"{ "sync": { "retries": 2 } }"#).unwrap_err();
        assert!(error.to_string().contains("unknown field"));
    }

    #[test]
    fn app_config_loads_missing_file_as_default() {
        let tmp = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&tmp.path().join("config.json")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn remote_from_env_requires_url_and_key() {
        assert_eq!(RemoteConfig::from_lookup(lookup(&[])).unwrap(), None);
        assert!(RemoteConfig::from_lookup(lookup(&[(ENV_SUPABASE_URL, "https://x.co")])).is_err());
        assert!(RemoteConfig::from_lookup(lookup(&[
            (ENV_SUPABASE_URL, "x.co"),
            (ENV_SUPABASE_ANON_KEY, "anon"),
        ]))
        .is_err());
    }

    #[test]
    fn remote_from_env_trims_values() {
        let config = RemoteConfig::from_lookup(lookup(&[
            (ENV_SUPABASE_URL, " https://project.supabase.co "),
            (ENV_SUPABASE_ANON_KEY, "anon"),
            (ENV_ACCESS_TOKEN, "   "),
            (ENV_USER_ID, "user-1"),
        ]))
        .unwrap()
        .unwrap();

        assert_eq!(config.base_url, "https://project.supabase.co");
        assert_eq!(config.access_token, None);
        assert_eq!(config.user_id.as_deref(), Some("user-1"));
    }

    #[test]
    fn remote_config_debug_redacts_keys() {
        let config = RemoteConfig {
            base_url: "https://project.supabase.co".to_string(),
            anon_key: "anon-secret".to_string(),
            access_token: Some("token-secret".to_string()),
            user_id: None,
            request_timeout_secs: 15,
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret"));
    }
}
