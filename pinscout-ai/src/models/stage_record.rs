//! Stage record ("session") model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Stage, StageStatus};

/// One attempt at one workflow stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub id: Uuid,
    pub prompt_id: Uuid,
    /// Run that created this record
    pub run_id: Uuid,
    pub stage: Stage,
    pub status: StageStatus,
    pub timestamp: DateTime<Utc>,
    /// Progress log in append order
    pub log: Vec<LogEntry>,
}

impl StageRecord {
    /// Fresh Pending record with an empty log
    pub fn pending(prompt_id: Uuid, run_id: Uuid, stage: Stage) -> Self {
        Self {
            id: Uuid::new_v4(),
            prompt_id,
            run_id,
            stage,
            status: StageStatus::Pending,
            timestamp: Utc::now(),
            log: Vec::new(),
        }
    }
}

/// Timestamped progress message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}
