//! prism-core - Offline-first sync core for Prism Contacts
//!
//! Records are written to a local `SQLite` store and queued for the remote
//! system in the same transaction. A background engine drains the queue when
//! online, and live views re-run their queries after every committed write.

pub mod config;
pub mod connectivity;
pub mod context;
pub mod db;
pub mod error;
pub mod live;
pub mod models;
pub mod notify;
pub mod queue;
pub mod remote;
pub mod repository;
pub mod state;
pub mod sync;
pub mod util;

pub use config::{AppConfig, RemoteConfig, SyncConfig};
pub use connectivity::Connectivity;
pub use context::{SyncContext, SyncContextBuilder};
pub use db::{LocalStore, OrderBy, Query};
pub use error::{Error, Result};
pub use live::{LiveQuery, LiveViews};
pub use models::{
    Collection, Contact, CustomField, CustomFieldSchema, Entity, Group, Operation, QueueItem,
    QueueStatus, RecordId,
};
pub use notify::{NotificationCenter, Notifier, TracingNotifier};
pub use queue::SyncQueue;
pub use remote::{InMemoryRemote, RemoteClient, RemoteError, RestClient};
pub use repository::{
    ContactRepository, CustomFieldRepository, CustomFieldSchemaRepository, EntityRepository,
    GroupRepository, PullOutcome,
};
pub use state::SyncState;
pub use sync::{DrainOutcome, DrainSummary, SkipReason, SyncEngine, SyncTrigger, SyncWorker};
