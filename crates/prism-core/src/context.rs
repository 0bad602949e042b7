//! Wiring of the sync core from explicitly supplied collaborators

use std::sync::Arc;

use crate::config::SyncConfig;
use crate::connectivity::Connectivity;
use crate::db::LocalStore;
use crate::error::Result;
use crate::live::LiveViews;
use crate::models::{Collection, IdGenerator, UuidGenerator};
use crate::notify::{Notifier, TracingNotifier};
use crate::queue::SyncQueue;
use crate::remote::RemoteClient;
use crate::repository::{
    ContactRepository, CustomFieldRepository, CustomFieldSchemaRepository, GroupRepository,
    PullOutcome, RepositoryDeps,
};
use crate::sync::{DrainOutcome, SyncEngine, SyncTrigger, SyncWorker};

/// Store, queue, engine, live views and the four repositories over one store.
#[derive(Debug)]
pub struct SyncContext {
    pub store: Arc<LocalStore>,
    pub queue: SyncQueue,
    pub engine: Arc<SyncEngine>,
    pub trigger: SyncTrigger,
    pub views: Arc<LiveViews>,
    pub connectivity: Connectivity,
    pub contacts: ContactRepository,
    pub groups: GroupRepository,
    pub schemas: CustomFieldSchemaRepository,
    pub custom_fields: CustomFieldRepository,
}

pub struct SyncContextBuilder {
    store: Arc<LocalStore>,
    remote: Arc<dyn RemoteClient>,
    config: SyncConfig,
    notifier: Arc<dyn Notifier>,
    ids: Arc<dyn IdGenerator>,
    connectivity: Connectivity,
}

impl SyncContextBuilder {
    #[must_use]
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    #[must_use]
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    #[must_use]
    pub fn connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = connectivity;
        self
    }

    pub fn build(self) -> Result<SyncContext> {
        self.config.validate()?;

        let queue = SyncQueue::with_max_attempts(Arc::clone(&self.store), self.config.max_attempts);
        let trigger = SyncTrigger::new(self.connectivity.clone());
        let views = LiveViews::new(Arc::clone(&self.store));
        let engine = Arc::new(SyncEngine::new(
            Arc::clone(&self.store),
            queue.clone(),
            Arc::clone(&self.remote),
            self.connectivity.clone(),
            Arc::clone(&self.notifier),
            self.config.clone(),
        ));

        let deps = RepositoryDeps {
            store: Arc::clone(&self.store),
            remote: self.remote,
            ids: self.ids,
            notifier: self.notifier,
            trigger: trigger.clone(),
            views: Arc::clone(&views),
            freshness_window: self.config.freshness_window(),
        };

        Ok(SyncContext {
            store: self.store,
            queue,
            engine,
            trigger,
            views,
            connectivity: self.connectivity,
            contacts: ContactRepository::new(deps.clone()),
            groups: GroupRepository::new(deps.clone()),
            schemas: CustomFieldSchemaRepository::new(deps.clone()),
            custom_fields: CustomFieldRepository::new(deps),
        })
    }
}

impl SyncContext {
    /// Start building a context; defaults are UUID v7 ids, log notifications and online
    pub fn builder(store: Arc<LocalStore>, remote: Arc<dyn RemoteClient>) -> SyncContextBuilder {
        SyncContextBuilder {
            store,
            remote,
            config: SyncConfig::default(),
            notifier: Arc::new(TracingNotifier),
            ids: Arc::new(UuidGenerator),
            connectivity: Connectivity::default(),
        }
    }

    /// Spawn the background drain loop on the current runtime
    pub fn start_worker(&self) -> SyncWorker {
        SyncWorker::spawn(Arc::clone(&self.engine), self.trigger.clone())
    }

    /// Run one drain pass now
    pub async fn drain(&self) -> Result<DrainOutcome> {
        self.engine.drain().await
    }

    /// Pull every collection, schemas first.
    ///
    /// Stops at the first failing collection.
    pub async fn pull_all(&self, force: bool) -> Result<Vec<(Collection, PullOutcome)>> {
        Ok(vec![
            (
                Collection::CustomFieldSchemas,
                self.schemas.sync_from_remote(force).await?,
            ),
            (Collection::Groups, self.groups.sync_from_remote(force).await?),
            (Collection::Contacts, self.contacts.sync_from_remote(force).await?),
            (
                Collection::CustomFields,
                self.custom_fields.sync_from_remote(force).await?,
            ),
        ])
    }
}
