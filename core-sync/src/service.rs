//! Session ownership for sync runs.
//!
//! At most one import session runs per library. Starting a session while
//! one is active cancels the old session and supersedes it; the old run
//! notices at its next checkpoint and winds down with a cancelled outcome.

use crate::error::{Result, SyncError};
use crate::importer::Importer;
use crate::sources::SourceFactory;
use core_library::LibraryRepository;
use core_runtime::events::{CoreEvent, LibraryEvent};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

struct ActiveSession {
    session_id: u64,
    cancellation: CancellationToken,
}

struct Inner {
    importer: Importer,
    sources: SourceFactory,
    libraries: Arc<dyn LibraryRepository>,
    active: Mutex<HashMap<String, ActiveSession>>,
    next_session_id: AtomicU64,
}

/// Starts, supersedes, and cancels import sessions.
///
/// Cloning is cheap; clones share the session table.
#[derive(Clone)]
pub struct SyncService {
    inner: Arc<Inner>,
}

impl SyncService {
    pub fn new(
        importer: Importer,
        sources: SourceFactory,
        libraries: Arc<dyn LibraryRepository>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                importer,
                sources,
                libraries,
                active: Mutex::new(HashMap::new()),
                next_session_id: AtomicU64::new(1),
            }),
        }
    }

    /// Start an import session for a library, superseding any session
    /// already running for it. Returns once the session is spawned.
    #[instrument(skip(self))]
    pub async fn start(&self, library_id: &str, full_reimport: bool) -> Result<()> {
        let library = self
            .inner
            .libraries
            .find_by_id(library_id)
            .await?
            .ok_or_else(|| SyncError::LibraryNotFound(library_id.to_string()))?;

        let session_id = self.inner.next_session_id.fetch_add(1, Ordering::Relaxed);
        let cancellation = CancellationToken::new();
        {
            let mut active = lock_active(&self.inner.active);
            if let Some(previous) = active.insert(
                library_id.to_string(),
                ActiveSession {
                    session_id,
                    cancellation: cancellation.clone(),
                },
            ) {
                info!(library_id, "superseding running session");
                previous.cancellation.cancel();
            }
        }

        let inner = Arc::clone(&self.inner);
        let library_id = library_id.to_string();
        tokio::spawn(async move {
            let source = inner.sources.open(&library.source);
            let result = inner
                .importer
                .import_all(&library, source.as_ref(), &cancellation, full_reimport)
                .await;
            if let Err(e) = &result {
                if !matches!(e, SyncError::Cancelled) {
                    warn!(library_id = %library.id, error = %e, "sync session ended with error");
                }
            }

            let mut active = lock_active(&inner.active);
            // A superseding session may already own the slot.
            if active
                .get(&library_id)
                .is_some_and(|session| session.session_id == session_id)
            {
                active.remove(&library_id);
            }
        });
        Ok(())
    }

    /// Delete a library: cancel its running session, remove its rows (the
    /// schema cascades folders, items, and links), and remove its locally
    /// cached asset files. Returns whether the library existed.
    #[instrument(skip(self))]
    pub async fn delete_library(&self, library_id: &str) -> Result<bool> {
        self.cancel(library_id);
        let removed = self.inner.libraries.delete(library_id).await?;
        if removed {
            if let Some(root) = self.inner.importer.asset_root() {
                let dir = root.join(library_id);
                match tokio::fs::remove_dir_all(&dir).await {
                    Ok(()) => info!(library_id, "removed cached assets"),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => warn!(library_id, error = %e, "failed to remove cached assets"),
                }
            }
            self.inner
                .importer
                .events()
                .emit(CoreEvent::Library(LibraryEvent::Deleted {
                    library_id: library_id.to_string(),
                }))
                .ok();
        }
        Ok(removed)
    }

    /// Request cancellation of the library's running session, if any.
    /// Returns whether a session was signalled.
    pub fn cancel(&self, library_id: &str) -> bool {
        let active = lock_active(&self.inner.active);
        match active.get(library_id) {
            Some(session) => {
                session.cancellation.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every running session.
    pub fn cancel_all(&self) {
        let active = lock_active(&self.inner.active);
        for session in active.values() {
            session.cancellation.cancel();
        }
    }

    /// Whether a session is currently registered for the library.
    pub fn is_active(&self, library_id: &str) -> bool {
        lock_active(&self.inner.active).contains_key(library_id)
    }
}

fn lock_active(
    active: &Mutex<HashMap<String, ActiveSession>>,
) -> std::sync::MutexGuard<'_, HashMap<String, ActiveSession>> {
    active.lock().unwrap_or_else(|e| e.into_inner())
}
