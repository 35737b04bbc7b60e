//! Event-driven cache invalidation.
//!
//! A background task subscribes to the event bus and translates events into
//! cache operations. Imports that finished rewrite store state, so their
//! library's entries are expired outright; settings changes leave the store
//! untouched and only mark entries stale.

use crate::cache::DerivedCache;
use core_runtime::events::{
    CoreEvent, EventBus, LibraryEvent, RecvError, SettingsEvent, SyncEvent,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Cache key for a folder-scoped derived value.
pub fn folder_key(library_id: &str, folder_id: &str) -> String {
    format!("{library_id}/{folder_id}")
}

fn library_prefix(library_id: &str) -> String {
    format!("{library_id}/")
}

/// Apply one event to the cache.
pub fn apply<V: Clone>(cache: &DerivedCache<V>, event: &CoreEvent) {
    match event {
        CoreEvent::Sync(SyncEvent::Progress { library_id, .. }) => {
            cache.mark_stale_prefix(&library_prefix(library_id));
        }
        CoreEvent::Sync(SyncEvent::Completed { library_id, .. }) => {
            debug!(library_id, "sync completed; expiring library cache entries");
            cache.expire_prefix(&library_prefix(library_id));
        }
        CoreEvent::Sync(_) => {}
        CoreEvent::Library(LibraryEvent::Switched { .. }) => cache.expire_all(),
        CoreEvent::Library(LibraryEvent::Deleted { library_id }) => {
            cache.expire_prefix(&library_prefix(library_id));
        }
        CoreEvent::Settings(SettingsEvent::GlobalSortChanged) => cache.mark_stale_all(),
        CoreEvent::Settings(SettingsEvent::FolderSortChanged {
            library_id,
            folder_id,
        }) => cache.mark_stale(&folder_key(library_id, folder_id)),
    }
}

/// Spawn the invalidation task. It exits when the bus is dropped.
pub fn spawn_invalidation<V>(cache: Arc<DerivedCache<V>>, bus: &EventBus) -> JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
{
    let mut receiver = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => apply(&cache, &event),
                Err(RecvError::Lagged(missed)) => {
                    // Events were dropped; the safe response is to assume
                    // any of them could have invalidated anything.
                    warn!(missed, "invalidation subscriber lagged; expiring all entries");
                    cache.expire_all();
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
