//! Event types and the broadcast EventBus
//!
//! Import sessions and the study loop publish [`MwEvent`]s so a front end (or
//! the CLI's progress printer) can follow along without polling storage.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// MagicWord event types
///
/// Serialized with a `type` tag so events can be forwarded as JSON unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MwEvent {
    /// Bulk import session started
    ImportSessionStarted {
        session_id: Uuid,
        library_id: i64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Candidates extracted and split into chunks
    ImportCandidatesExtracted {
        session_id: Uuid,
        candidates: usize,
        chunks: usize,
    },

    /// A line was appended to the session's progress log
    ImportProgress {
        session_id: Uuid,
        /// Entries persisted so far
        imported: usize,
        /// Chunks still waiting in the work queue
        pending_chunks: usize,
        message: String,
    },

    /// A chunk exhausted its retry budget; its terms were not imported
    ImportChunkFailed {
        session_id: Uuid,
        terms: Vec<String>,
        error: String,
    },

    /// Import session reached a terminal state
    ImportSessionCompleted {
        session_id: Uuid,
        imported: usize,
        failed_chunks: usize,
        cancelled: bool,
        duration_seconds: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Import session failed before any chunk work started
    ImportSessionFailed {
        session_id: Uuid,
        error_message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A graded review rescheduled an entry
    ReviewRecorded {
        entry_id: i64,
        quality: i32,
        interval_days: i64,
        next_review_time: i64,
    },
}

impl MwEvent {
    /// Event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            MwEvent::ImportSessionStarted { .. } => "ImportSessionStarted",
            MwEvent::ImportCandidatesExtracted { .. } => "ImportCandidatesExtracted",
            MwEvent::ImportProgress { .. } => "ImportProgress",
            MwEvent::ImportChunkFailed { .. } => "ImportChunkFailed",
            MwEvent::ImportSessionCompleted { .. } => "ImportSessionCompleted",
            MwEvent::ImportSessionFailed { .. } => "ImportSessionFailed",
            MwEvent::ReviewRecorded { .. } => "ReviewRecorded",
        }
    }
}

/// Broadcast bus for [`MwEvent`]s
///
/// Slow subscribers lose the oldest events once `capacity` is exceeded.
pub struct EventBus {
    tx: broadcast::Sender<MwEvent>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<MwEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, returning the number of subscribers that received it
    ///
    /// Fails when nobody is subscribed.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: MwEvent) -> Result<usize, broadcast::error::SendError<MwEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring a missing audience
    pub fn emit_lossy(&self, event: MwEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers_fails() {
        let bus = EventBus::new(10);
        let event = MwEvent::ReviewRecorded {
            entry_id: 1,
            quality: 5,
            interval_days: 1,
            next_review_time: 0,
        };
        assert!(bus.emit(event.clone()).is_err());
        // lossy emit never fails
        bus.emit_lossy(event);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        let session_id = Uuid::new_v4();

        bus.emit(MwEvent::ImportCandidatesExtracted { session_id, candidates: 7, chunks: 3 })
            .unwrap();
        bus.emit_lossy(MwEvent::ImportProgress {
            session_id,
            imported: 3,
            pending_chunks: 2,
            message: "chunk ok".to_string(),
        });

        let first = rx.recv().await.unwrap();
        assert_eq!(first.event_type(), "ImportCandidatesExtracted");
        let second = rx.recv().await.unwrap();
        assert!(matches!(second, MwEvent::ImportProgress { imported: 3, .. }));
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = MwEvent::ImportChunkFailed {
            session_id: Uuid::nil(),
            terms: vec!["a".to_string()],
            error: "timeout".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ImportChunkFailed");
        assert_eq!(json["terms"][0], "a");
    }
}
