//! Stage runner
//!
//! Runs one workflow stage as an atomic unit: create a Pending stage record,
//! run the work unit, then write exactly one terminal status. Work errors,
//! panics and timeouts all end as a Failed record; only store failures are
//! returned as errors.

use chrono::Utc;
use futures::FutureExt;
use pinscout_common::events::{EventBus, WorkflowEvent};
use pinscout_common::Result;
use sqlx::SqlitePool;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use uuid::Uuid;

use super::progress_log::{ProgressLog, StageLog};
use crate::db;
use crate::models::{Stage, StageRecord, StageStatus};

/// Result reported by a stage's work unit
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome {
    pub success: bool,
    pub detail: String,
}

impl StageOutcome {
    pub fn success(detail: impl Into<String>) -> Self {
        Self {
            success: true,
            detail: detail.into(),
        }
    }

    pub fn failure(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: detail.into(),
        }
    }
}

/// What the runner recorded for one stage invocation
#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    pub stage_record_id: Uuid,
    pub stage: Stage,
    pub status: StageStatus,
    pub detail: String,
}

impl StageReport {
    pub fn succeeded(&self) -> bool {
        self.status == StageStatus::Completed
    }
}

#[derive(Clone)]
pub struct StageRunner {
    db: SqlitePool,
    event_bus: EventBus,
    progress: ProgressLog,
    stage_timeout: Duration,
}

impl StageRunner {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        progress: ProgressLog,
        stage_timeout: Duration,
    ) -> Self {
        Self {
            db,
            event_bus,
            progress,
            stage_timeout,
        }
    }

    /// Run `work` as stage `stage` of run `run_id`
    ///
    /// `work` receives a log handle bound to the new record.
    pub async fn run_stage<F, Fut>(
        &self,
        prompt_id: Uuid,
        run_id: Uuid,
        stage: Stage,
        work: F,
    ) -> Result<StageReport>
    where
        F: FnOnce(StageLog) -> Fut,
        Fut: Future<Output = anyhow::Result<StageOutcome>>,
    {
        let record = StageRecord::pending(prompt_id, run_id, stage);
        db::stages::insert_stage_record(&self.db, &record).await?;

        tracing::info!(
            prompt_id = %prompt_id,
            run_id = %run_id,
            stage = %stage,
            stage_record_id = %record.id,
            "Stage started"
        );
        self.event_bus.emit_lossy(WorkflowEvent::StageStarted {
            run_id,
            prompt_id,
            stage_record_id: record.id,
            stage: stage.as_str().to_string(),
            timestamp: Utc::now(),
        });

        let log = self.progress.for_record(record.id);
        let guarded = AssertUnwindSafe(work(log.clone())).catch_unwind();

        let outcome = match tokio::time::timeout(self.stage_timeout, guarded).await {
            Ok(Ok(Ok(outcome))) => outcome,
            Ok(Ok(Err(e))) => StageOutcome::failure(format!("{:#}", e)),
            Ok(Err(panic)) => {
                StageOutcome::failure(format!("Stage panicked: {}", panic_message(&*panic)))
            }
            Err(_) => StageOutcome::failure(format!(
                "Stage timed out after {}s",
                self.stage_timeout.as_secs()
            )),
        };

        let status = StageStatus::from_success(outcome.success);
        if !db::stages::finish_stage_record(&self.db, record.id, status).await? {
            tracing::warn!(
                stage_record_id = %record.id,
                "Stage record disappeared before its terminal status was written"
            );
        }

        let summary = if outcome.detail.is_empty() {
            format!("Stage {} {}", stage, status)
        } else {
            format!("Stage {} {}: {}", stage, status, outcome.detail)
        };
        log.append(summary).await;

        if outcome.success {
            tracing::info!(prompt_id = %prompt_id, run_id = %run_id, stage = %stage, "Stage completed");
        } else {
            tracing::warn!(
                prompt_id = %prompt_id,
                run_id = %run_id,
                stage = %stage,
                detail = %outcome.detail,
                "Stage failed"
            );
        }

        self.event_bus.emit_lossy(WorkflowEvent::StageFinished {
            run_id,
            prompt_id,
            stage_record_id: record.id,
            stage: stage.as_str().to_string(),
            status: status.as_str().to_string(),
            detail: outcome.detail.clone(),
            timestamp: Utc::now(),
        });

        Ok(StageReport {
            stage_record_id: record.id,
            stage,
            status,
            detail: outcome.detail,
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
