//! Change feed for observing completed operations.
//!
//! The change feed emits an event after every completed mutation,
//! enabling:
//! - Cache invalidation in outer layers
//! - Reactive UI updates
//! - Audit logging
//!
//! # Usage
//!
//! ```rust,ignore
//! use docudb_core::{Config, Database};
//!
//! let db = Database::open(Config::new("data")).await?;
//! let events = db.subscribe();
//!
//! db.collection("users").await?.insert(doc).await?;
//!
//! while let Ok(change) = events.try_recv() {
//!     println!("{}: {:?}", change.sequence, change.event);
//! }
//! ```

use parking_lot::{Mutex, RwLock};
use std::sync::mpsc::{self, Receiver, Sender};

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseEvent {
    /// A document was inserted.
    DocumentInserted {
        /// Collection name.
        collection: String,
        /// Id of the new document.
        id: String,
    },
    /// Documents were modified by an update.
    DocumentsUpdated {
        /// Collection name.
        collection: String,
        /// Ids of the modified documents.
        ids: Vec<String>,
    },
    /// Documents were deleted.
    DocumentsDeleted {
        /// Collection name.
        collection: String,
        /// Ids of the deleted documents.
        ids: Vec<String>,
    },
    /// A collection was created.
    CollectionCreated {
        /// Collection name.
        collection: String,
    },
    /// A collection was dropped.
    CollectionDropped {
        /// Collection name.
        collection: String,
    },
    /// An index was created.
    IndexCreated {
        /// Collection name.
        collection: String,
        /// Indexed field.
        field: String,
        /// Whether the index is unique.
        unique: bool,
    },
    /// An index was dropped.
    IndexDropped {
        /// Collection name.
        collection: String,
        /// Indexed field.
        field: String,
    },
}

impl DatabaseEvent {
    /// Name of the collection the event concerns.
    #[must_use]
    pub fn collection(&self) -> &str {
        match self {
            Self::DocumentInserted { collection, .. }
            | Self::DocumentsUpdated { collection, .. }
            | Self::DocumentsDeleted { collection, .. }
            | Self::CollectionCreated { collection }
            | Self::CollectionDropped { collection }
            | Self::IndexCreated { collection, .. }
            | Self::IndexDropped { collection, .. } => collection,
        }
    }
}

/// An event with its position in the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Position in the feed, starting at 1.
    pub sequence: u64,
    /// The event.
    pub event: DatabaseEvent,
}

/// Distributes events to subscribers.
///
/// The change feed:
/// - Emits only completed operations
/// - Preserves emission order
/// - Supports multiple subscribers
/// - Keeps a bounded history for catch-up polling
pub struct ChangeFeed {
    /// Subscribers (senders).
    subscribers: RwLock<Vec<Sender<ChangeEvent>>>,
    /// Recent events, oldest first.
    history: Mutex<Vec<ChangeEvent>>,
    /// Last assigned sequence number.
    sequence: Mutex<u64>,
    /// Maximum history size.
    max_history: usize,
}

impl ChangeFeed {
    /// Creates a new change feed.
    pub fn new() -> Self {
        Self::with_max_history(1000)
    }

    /// Creates a change feed with a specific history limit.
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            history: Mutex::new(Vec::new()),
            sequence: Mutex::new(0),
            max_history,
        }
    }

    /// Subscribes to the change feed.
    ///
    /// Returns a receiver that will receive all future events. Sending
    /// never blocks, so an unread receiver buffers without bound.
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Emits an event to all subscribers and returns its sequence number.
    pub fn emit(&self, event: DatabaseEvent) -> u64 {
        let change = {
            let mut sequence = self.sequence.lock();
            *sequence += 1;
            let change = ChangeEvent {
                sequence: *sequence,
                event,
            };

            let mut history = self.history.lock();
            history.push(change.clone());
            if history.len() > self.max_history {
                let excess = history.len() - self.max_history;
                history.drain(0..excess);
            }
            change
        };

        // Disconnected subscribers are dropped.
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(change.clone()).is_ok());
        change.sequence
    }

    /// Returns events with sequence > `cursor`, up to `limit`.
    pub fn poll(&self, cursor: u64, limit: usize) -> Vec<ChangeEvent> {
        self.history
            .lock()
            .iter()
            .filter(|e| e.sequence > cursor)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Returns the last assigned sequence number.
    pub fn latest_sequence(&self) -> u64 {
        *self.sequence.lock()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn inserted(id: &str) -> DatabaseEvent {
        DatabaseEvent::DocumentInserted {
            collection: "users".into(),
            id: id.into(),
        }
    }

    #[test]
    fn emit_and_receive() {
        let feed = ChangeFeed::new();
        let rx = feed.subscribe();

        assert_eq!(feed.emit(inserted("a")), 1);

        let received = rx.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(received.sequence, 1);
        assert_eq!(received.event, inserted("a"));
        assert_eq!(received.event.collection(), "users");
    }

    #[test]
    fn multiple_subscribers() {
        let feed = ChangeFeed::new();
        let rx1 = feed.subscribe();
        let rx2 = feed.subscribe();

        feed.emit(inserted("a"));

        assert_eq!(rx1.recv().unwrap().event, inserted("a"));
        assert_eq!(rx2.recv().unwrap().event, inserted("a"));
    }

    #[test]
    fn subscriber_cleanup() {
        let feed = ChangeFeed::new();
        let rx = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 1);

        drop(rx);
        feed.emit(inserted("a"));
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[test]
    fn poll_respects_cursor_limit_and_history() {
        let feed = ChangeFeed::with_max_history(5);
        for i in 0..10 {
            feed.emit(inserted(&i.to_string()));
        }

        assert_eq!(feed.latest_sequence(), 10);
        let events = feed.poll(0, 100);
        assert_eq!(events.len(), 5);
        assert_eq!(events[0].sequence, 6);

        let events = feed.poll(7, 2);
        let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![8, 9]);
    }

    #[test]
    fn threaded_emit() {
        let feed = Arc::new(ChangeFeed::new());
        let rx = feed.subscribe();

        let feed_clone = Arc::clone(&feed);
        let handle = thread::spawn(move || {
            feed_clone.emit(DatabaseEvent::CollectionCreated {
                collection: "logs".into(),
            });
        });

        let received = rx.recv_timeout(Duration::from_millis(500)).unwrap();
        assert_eq!(received.event.collection(), "logs");
        handle.join().unwrap();
    }
}
