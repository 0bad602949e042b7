//! Live query results backed by the store's change feed.
//!
//! Every distinct `(collection, query)` pair has at most one watcher task.
//! Subscribers share its `watch` channel, and the task is aborted when the
//! last subscriber drops.

use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::db::{LocalStore, Query};
use crate::error::{Error, Result};
use crate::models::{Collection, Entity};

type ViewKey = (Collection, Query);

struct SharedView {
    /// `watch::Receiver<Arc<Vec<E>>>` for the view's entity type
    prototype: Box<dyn Any + Send + Sync>,
    subscribers: usize,
    task: JoinHandle<()>,
}

/// Registry of shared live views over one store
pub struct LiveViews {
    store: Arc<LocalStore>,
    views: Mutex<HashMap<ViewKey, SharedView>>,
}

impl std::fmt::Debug for LiveViews {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveViews")
            .field("active_views", &self.active_views())
            .finish_non_exhaustive()
    }
}

impl LiveViews {
    pub fn new(store: Arc<LocalStore>) -> Arc<Self> {
        Arc::new(Self {
            store,
            views: Mutex::new(HashMap::new()),
        })
    }

    fn views(&self) -> MutexGuard<'_, HashMap<ViewKey, SharedView>> {
        self.views.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of watcher tasks currently running
    pub fn active_views(&self) -> usize {
        self.views().len()
    }

    /// Subscribe to `query` over `E`'s collection.
    ///
    /// Must be called from within a tokio runtime.
    pub fn observe<E: Entity>(self: &Arc<Self>, query: Query) -> Result<LiveQuery<E>> {
        let key = (E::COLLECTION, query);
        let mut views = self.views();

        if let Some(view) = views.get_mut(&key) {
            if let Some(rx) = view
                .prototype
                .downcast_ref::<watch::Receiver<Arc<Vec<E>>>>()
            {
                view.subscribers += 1;
                return Ok(LiveQuery::new(rx.clone(), key, Arc::clone(self)));
            }
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::InvalidInput(format!("live views need a tokio runtime: {e}")))?;

        // Subscribe first so no commit between the initial read and the task start is missed.
        let changes = self.store.subscribe();
        let initial = self.store.query::<E>(&key.1)?;
        let (tx, rx) = watch::channel(Arc::new(initial));
        let task = runtime.spawn(watch_collection::<E>(
            Arc::clone(&self.store),
            key.1.clone(),
            changes,
            tx,
        ));

        tracing::debug!("Started live view on {} ({:?})", key.0, key.1);
        views.insert(
            key.clone(),
            SharedView {
                prototype: Box::new(rx.clone()),
                subscribers: 1,
                task,
            },
        );
        Ok(LiveQuery::new(rx, key, Arc::clone(self)))
    }

    fn release(&self, key: &ViewKey) {
        let mut views = self.views();
        let Some(view) = views.get_mut(key) else {
            return;
        };
        view.subscribers = view.subscribers.saturating_sub(1);
        if view.subscribers == 0 {
            if let Some(view) = views.remove(key) {
                view.task.abort();
                tracing::debug!("Stopped live view on {} ({:?})", key.0, key.1);
            }
        }
    }
}

async fn watch_collection<E: Entity>(
    store: Arc<LocalStore>,
    query: Query,
    mut changes: tokio::sync::broadcast::Receiver<Collection>,
    tx: watch::Sender<Arc<Vec<E>>>,
) {
    loop {
        match changes.recv().await {
            Ok(collection) if collection == E::COLLECTION => {}
            Ok(_) => continue,
            // Missed notifications may include ours; refresh to be safe.
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!("Live view on {} lagged by {skipped}", E::COLLECTION);
            }
            Err(RecvError::Closed) => break,
        }

        match store.query::<E>(&query) {
            Ok(rows) => {
                if tx.send(Arc::new(rows)).is_err() {
                    break;
                }
            }
            Err(error) => tracing::warn!("Live view on {} failed to refresh: {error}", E::COLLECTION),
        }
    }
}

/// A subscriber's handle on a live view.
///
/// The first [`next`](Self::next) yields the current result; later calls wait
/// for the next refresh.
pub struct LiveQuery<E: Entity> {
    rx: watch::Receiver<Arc<Vec<E>>>,
    key: ViewKey,
    views: Arc<LiveViews>,
    primed: bool,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> LiveQuery<E> {
    fn new(rx: watch::Receiver<Arc<Vec<E>>>, key: ViewKey, views: Arc<LiveViews>) -> Self {
        Self {
            rx,
            key,
            views,
            primed: false,
            _entity: PhantomData,
        }
    }

    pub fn query(&self) -> &Query {
        &self.key.1
    }

    /// Latest result without waiting
    pub fn current(&self) -> Arc<Vec<E>> {
        Arc::clone(&self.rx.borrow())
    }

    /// Next result; `None` once the view has shut down
    pub async fn next(&mut self) -> Option<Arc<Vec<E>>> {
        if !self.primed {
            self.primed = true;
            return Some(Arc::clone(&self.rx.borrow_and_update()));
        }
        self.rx.changed().await.ok()?;
        Some(Arc::clone(&self.rx.borrow_and_update()))
    }
}

impl<E: Entity> Drop for LiveQuery<E> {
    fn drop(&mut self) {
        self.views.release(&self.key);
    }
}

impl<E: Entity> std::fmt::Debug for LiveQuery<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveQuery")
            .field("collection", &self.key.0)
            .field("query", &self.key.1)
            .finish_non_exhaustive()
    }
}
