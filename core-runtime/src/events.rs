//! # Event Bus System
//!
//! Event-driven communication between core modules using `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event Types**: strongly-typed enum hierarchies per domain
//! - **EventBus**: central broadcast channel for publishing events
//! - **EventStream**: wrapper for consuming events with filtering
//!
//! The derived-value cache subscribes to this bus to invalidate folder-cover
//! entries: a library switch expires everything, a global sort change marks
//! all entries stale, sync progress marks that library's entries stale, and
//! a per-folder sort change marks that folder's entry stale.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{EventBus, CoreEvent, LibraryEvent};
//!
//! let bus = EventBus::new(100);
//! let mut sub = bus.subscribe();
//!
//! bus.emit(CoreEvent::Library(LibraryEvent::Switched {
//!     library_id: "lib-1".to_string(),
//! }))
//! .ok();
//! ```
//!
//! ## Error Handling
//!
//! `RecvError::Lagged(n)` means the subscriber fell behind by `n` events and
//! can keep receiving; `RecvError::Closed` means all senders are gone and the
//! subscriber should exit.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Sync-related events
    Sync(SyncEvent),
    /// Library selection events
    Library(LibraryEvent),
    /// Settings changes relevant to derived values
    Settings(SettingsEvent),
}

/// Events emitted by the metadata importer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// An import session started for a library.
    Started {
        library_id: String,
        full_reimport: bool,
    },
    /// Incremental progress, `fraction` in `[0.0, 1.0]`.
    Progress { library_id: String, fraction: f64 },
    /// Import finished cleanly.
    Completed {
        library_id: String,
        folders_written: u64,
        items_written: u64,
        items_deleted: u64,
    },
    /// Import surfaced an error other than cancellation.
    Failed { library_id: String, message: String },
    /// Import observed cancellation at a checkpoint.
    Cancelled { library_id: String },
}

/// Events describing the active library selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum LibraryEvent {
    /// The user switched to another library.
    Switched { library_id: String },
    /// A library was deleted along with its cached assets.
    Deleted { library_id: String },
}

/// Settings changes that supersede derived values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum SettingsEvent {
    /// The global sort preference changed.
    GlobalSortChanged,
    /// A single folder's sort preference changed.
    FolderSortChanged {
        library_id: String,
        folder_id: String,
    },
}

/// Central event bus backed by a `tokio::sync::broadcast` channel.
///
/// Cloning the bus is cheap; all clones publish into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Create an event bus with the given channel buffer size.
    pub fn new(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new independent subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` wrapper with optional filtering.
///
/// ```rust
/// use core_runtime::events::{EventBus, EventStream, CoreEvent};
///
/// let bus = EventBus::new(100);
/// let mut settings_only = EventStream::new(bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Settings(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Adds a filter; only matching events are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// `RecvError::Lagged(n)` if the subscriber fell behind by `n` events,
    /// `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            let Some(filter) = &self.filter else {
                return Ok(event);
            };

            if filter(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    let Some(filter) = &self.filter else {
                        return Some(Ok(event));
                    };
                    if filter(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_without_subscribers_errors() {
        let bus = EventBus::new(10);
        let event = CoreEvent::Settings(SettingsEvent::GlobalSortChanged);
        assert!(bus.emit(event).is_err());
    }

    #[tokio::test]
    async fn test_all_subscribers_receive_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::Sync(SyncEvent::Started {
            library_id: "lib-1".to_string(),
            full_reimport: false,
        });
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Settings(_)));

        bus.emit(CoreEvent::Sync(SyncEvent::Cancelled {
            library_id: "lib-1".to_string(),
        }))
        .ok();
        let settings_event = CoreEvent::Settings(SettingsEvent::FolderSortChanged {
            library_id: "lib-1".to_string(),
            folder_id: "folder-9".to_string(),
        });
        bus.emit(settings_event.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), settings_event);
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(CoreEvent::Sync(SyncEvent::Progress {
                library_id: "lib-1".to_string(),
                fraction: i as f64 / 5.0,
            }))
            .ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[tokio::test]
    async fn test_try_recv_empty() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe());
        assert!(stream.try_recv().is_none());
    }
}
