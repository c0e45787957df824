//! Append-only progress log for stage records
//!
//! Appends never fail from the caller's point of view: a store error is
//! logged and dropped, and appending to an unknown record does nothing.

use chrono::Utc;
use pinscout_common::events::{EventBus, WorkflowEvent};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db;

/// Shared writer for stage log entries
#[derive(Clone)]
pub struct ProgressLog {
    db: SqlitePool,
    event_bus: EventBus,
}

impl ProgressLog {
    pub fn new(db: SqlitePool, event_bus: EventBus) -> Self {
        Self { db, event_bus }
    }

    /// Append a timestamped message to a stage record
    pub async fn append(&self, stage_record_id: Uuid, message: impl Into<String>) {
        let message = message.into();
        let timestamp = Utc::now();

        match db::stages::append_log_entry(&self.db, stage_record_id, timestamp, &message).await {
            Ok(true) => {
                tracing::info!(stage_record_id = %stage_record_id, "{}", message);
                self.event_bus.emit_lossy(WorkflowEvent::StageLogAppended {
                    stage_record_id,
                    message,
                    timestamp,
                });
            }
            Ok(false) => {
                tracing::debug!(
                    stage_record_id = %stage_record_id,
                    "Dropping log entry for unknown stage record: {}",
                    message
                );
            }
            Err(e) => {
                tracing::warn!(
                    stage_record_id = %stage_record_id,
                    error = %e,
                    "Failed to append stage log entry: {}",
                    message
                );
            }
        }
    }

    /// Handle bound to one stage record
    pub fn for_record(&self, stage_record_id: Uuid) -> StageLog {
        StageLog {
            log: self.clone(),
            stage_record_id,
        }
    }
}

/// Progress log handle for the stage currently running
#[derive(Clone)]
pub struct StageLog {
    log: ProgressLog,
    stage_record_id: Uuid,
}

impl StageLog {
    pub async fn append(&self, message: impl Into<String>) {
        self.log.append(self.stage_record_id, message).await;
    }
}
