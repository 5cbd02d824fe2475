//! Event types and EventBus for PVA services
//!
//! Events are broadcast via [`EventBus`] and serialized for SSE transmission.
//! Emission is fire-and-forget: a missing subscriber is never an error for
//! the component raising the event.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// PVA event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum PvaEvent {
    /// A finder failed for one (plate, state) query
    ///
    /// The finder contributes zero records for that query; siblings are unaffected.
    FinderFailed {
        /// Finder display name
        finder_name: String,
        /// Normalized plate that was searched
        license_plate: String,
        /// Requested state for the search
        state: String,
        /// Underlying error (transport, HTTP status, parse, timeout, panic)
        error: String,
        /// Human-readable summary
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Aggregation run dispatched
    AggregationStarted {
        tracking_id: Uuid,
        vehicle_count: usize,
        finder_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Aggregation run finished (including deadline-truncated runs)
    AggregationCompleted {
        tracking_id: Uuid,
        requests_count: usize,
        violations_found: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl PvaEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            PvaEvent::FinderFailed { .. } => "FinderFailed",
            PvaEvent::AggregationStarted { .. } => "AggregationStarted",
            PvaEvent::AggregationCompleted { .. } => "AggregationCompleted",
        }
    }
}

/// Broadcast bus shared by all components of a service
///
/// Cloning is cheap; all clones publish to the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PvaEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PvaEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, returning the number of subscribers reached
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: PvaEvent) -> Result<usize, broadcast::error::SendError<PvaEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PvaEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
