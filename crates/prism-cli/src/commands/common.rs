use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use prism_core::remote::RemoteResult;
use prism_core::{
    AppConfig, Collection, Connectivity, DrainOutcome, Entity, EntityRepository, LocalStore,
    Query, RecordId, RemoteClient, RemoteError, RestClient, SyncContext,
};
use serde_json::Value;

use crate::error::CliError;

pub const ENV_DB_PATH: &str = "PRISM_DB_PATH";
pub const ENV_CONFIG_PATH: &str = "PRISM_CONFIG";

/// Principal used when neither the remote nor the config names one
pub const LOCAL_PRINCIPAL: &str = "local";

/// Flags shared by every subcommand
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub db_path: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub offline: bool,
}

/// Remote stand-in when no remote is configured.
///
/// It names the principal so records can be created, and refuses every
/// request; the engine never calls it because connectivity stays offline.
#[derive(Debug, Clone)]
pub struct LocalOnlyRemote {
    principal: String,
}

impl LocalOnlyRemote {
    pub fn new(principal: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
        }
    }
}

fn local_only() -> RemoteError {
    RemoteError::NotConfigured("running local-only".to_string())
}

#[async_trait]
impl RemoteClient for LocalOnlyRemote {
    async fn insert(&self, _collection: Collection, _row: &Value) -> RemoteResult<Value> {
        Err(local_only())
    }

    async fn update(
        &self,
        _collection: Collection,
        _id: &RecordId,
        _patch: &Value,
    ) -> RemoteResult<()> {
        Err(local_only())
    }

    async fn delete(&self, _collection: Collection, _id: &RecordId) -> RemoteResult<()> {
        Err(local_only())
    }

    async fn select_all(&self, _collection: Collection) -> RemoteResult<Vec<Value>> {
        Err(local_only())
    }

    fn current_principal(&self) -> Option<String> {
        Some(self.principal.clone())
    }
}

/// An opened store wired to the remote, or to [`LocalOnlyRemote`]
pub struct Session {
    pub ctx: SyncContext,
    /// A remote is configured, whether or not `--offline` was passed
    pub remote_configured: bool,
}

impl Session {
    pub fn open(options: &GlobalOptions) -> Result<Self, CliError> {
        let config_path = resolve_config_path(options.config_path.clone())?;
        let config = AppConfig::load(&config_path)?;
        let db_path = resolve_db_path(options.db_path.clone(), &config)?;
        let store = Arc::new(LocalStore::open(&db_path)?);

        let remote_config = config.resolve_remote()?;
        let remote_configured = remote_config.is_some();
        let online = remote_configured && !options.offline;

        let remote: Arc<dyn RemoteClient> = match remote_config {
            Some(remote) => {
                tracing::debug!("Remote sync via {}", remote.base_url);
                Arc::new(RestClient::new(&remote).map_err(prism_core::Error::from)?)
            }
            None => Arc::new(LocalOnlyRemote::new(
                config
                    .user_id
                    .clone()
                    .unwrap_or_else(|| LOCAL_PRINCIPAL.to_string()),
            )),
        };

        let ctx = SyncContext::builder(store, remote)
            .config(config.sync.clone())
            .connectivity(Connectivity::new(online))
            .build()?;

        Ok(Self {
            ctx,
            remote_configured,
        })
    }

    pub fn is_online(&self) -> bool {
        self.ctx.connectivity.is_online()
    }

    /// Push queued changes right after a local write when online.
    ///
    /// Failures stay queued and are reported by the engine's notifications.
    pub async fn push_pending(&self) -> Result<(), CliError> {
        if !self.is_online() {
            return Ok(());
        }
        if let DrainOutcome::Completed(summary) = self.ctx.drain().await? {
            tracing::debug!("Pushed {} queued change(s)", summary.processed());
        }
        Ok(())
    }
}

pub fn resolve_config_path(cli_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_path.or_else(|| env::var_os(ENV_CONFIG_PATH).map(PathBuf::from)) {
        return Ok(path);
    }
    Ok(dirs::config_dir()
        .ok_or(CliError::NoPlatformDir("config"))?
        .join("prism")
        .join("config.json"))
}

pub fn resolve_db_path(cli_path: Option<PathBuf>, config: &AppConfig) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_path
        .or_else(|| env::var_os(ENV_DB_PATH).map(PathBuf::from))
        .or_else(|| config.db_path.clone())
    {
        return Ok(path);
    }
    default_db_path()
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    Ok(dirs::data_dir()
        .ok_or(CliError::NoPlatformDir("data"))?
        .join("prism")
        .join("prism.db"))
}

pub fn normalize_record_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyRecordId)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Find a record by exact id or by unique id prefix
pub fn resolve_record<E: Entity>(
    repository: &EntityRepository<E>,
    query: &str,
) -> Result<E, CliError> {
    let query = normalize_record_identifier(query)?;

    if let Ok(id) = query.parse::<RecordId>() {
        if let Some(record) = repository.get(&id)? {
            return Ok(record);
        }
    }

    let mut matches: Vec<E> = repository
        .list(&Query::all())?
        .into_iter()
        .filter(|record| record.id().to_string().starts_with(&query))
        .collect();

    match matches.len() {
        0 => Err(CliError::RecordNotFound(E::LABEL, query)),
        1 => Ok(matches.remove(0)),
        _ => {
            let options = matches
                .iter()
                .take(3)
                .map(|record| record.id().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousRecordId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

/// Split `KEY=VALUE`; the value is read as JSON when it parses, else as text
pub fn parse_field_assignment(raw: &str) -> Result<(String, Value), CliError> {
    let Some((key, value)) = raw.split_once('=') else {
        return Err(CliError::InvalidFieldAssignment(raw.to_string()));
    };
    let key = key.trim();
    if key.is_empty() {
        return Err(CliError::InvalidFieldAssignment(raw.to_string()));
    }

    let value = value.trim();
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

pub fn format_relative_time(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = (now - timestamp).num_seconds().max(0);
    let minute = 60;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let mut truncated = collapsed
            .chars()
            .take(max_chars.saturating_sub(3))
            .collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
