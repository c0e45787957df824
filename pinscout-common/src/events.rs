//! Event types for the PinScout event system
//!
//! Workflow progress is broadcast through the [`EventBus`] and forwarded to
//! SSE clients. Events are telemetry: nothing reads them back for
//! correctness, so dropping one is always acceptable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Workflow event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
/// Stage and status names are carried as their stored lower-case strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum WorkflowEvent {
    /// A workflow run was accepted and spawned
    RunStarted {
        run_id: Uuid,
        prompt_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// A stage record was created in Pending state
    StageStarted {
        run_id: Uuid,
        prompt_id: Uuid,
        stage_record_id: Uuid,
        stage: String,
        timestamp: DateTime<Utc>,
    },

    /// A progress line was appended to a stage log
    StageLogAppended {
        stage_record_id: Uuid,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A stage record reached Completed or Failed
    StageFinished {
        run_id: Uuid,
        prompt_id: Uuid,
        stage_record_id: Uuid,
        stage: String,
        status: String,
        detail: String,
        timestamp: DateTime<Utc>,
    },

    /// One item received its verdict
    ItemValidated {
        prompt_id: Uuid,
        item_id: Uuid,
        score: f64,
        status: String,
        /// Items finished so far in this batch
        validated: usize,
        /// Batch size
        total: usize,
        timestamp: DateTime<Utc>,
    },

    /// A workflow run ended (completed, stage failure or error)
    RunFinished {
        run_id: Uuid,
        prompt_id: Uuid,
        outcome: String,
        timestamp: DateTime<Utc>,
    },
}

impl WorkflowEvent {
    /// Get event type as string for SSE event names
    pub fn event_type(&self) -> &str {
        match self {
            WorkflowEvent::RunStarted { .. } => "RunStarted",
            WorkflowEvent::StageStarted { .. } => "StageStarted",
            WorkflowEvent::StageLogAppended { .. } => "StageLogAppended",
            WorkflowEvent::StageFinished { .. } => "StageFinished",
            WorkflowEvent::ItemValidated { .. } => "ItemValidated",
            WorkflowEvent::RunFinished { .. } => "RunFinished",
        }
    }
}

/// Central event distribution bus
///
/// Wraps a tokio broadcast channel:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged subscribers lose the oldest events
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<WorkflowEvent>,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: WorkflowEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_started() -> WorkflowEvent {
        WorkflowEvent::RunStarted {
            run_id: Uuid::new_v4(),
            prompt_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_eventbus_new() {
        let bus = EventBus::new(16);
        assert_eq!(bus.subscriber_count(), 0);
        let _rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn test_emit_without_subscribers_is_dropped() {
        let bus = EventBus::new(4);
        bus.emit_lossy(run_started());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();
        let event = run_started();
        bus.emit_lossy(event.clone());
        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[test]
    fn test_serialized_event_is_tagged() {
        let event = WorkflowEvent::StageLogAppended {
            stage_record_id: Uuid::nil(),
            message: "Scraped item 1/25".to_string(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "StageLogAppended");
        assert_eq!(event.event_type(), "StageLogAppended");
    }
}
