//! Workflow coordinator
//!
//! Drives a prompt through Warmup → Acquisition → Validation. A failed stage
//! stops the run and leaves the prompt Processing; an unexpected error marks
//! the prompt Error. Runs execute in the background through
//! [`WorkflowTasks`].

use chrono::Utc;
use futures::FutureExt;
use pinscout_common::events::{EventBus, WorkflowEvent};
use serde::Serialize;
use sqlx::SqlitePool;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::batch_validator::BatchValidator;
use super::candidate_source::CandidateSource;
use super::progress_log::ProgressLog;
use super::stage_runner::{StageOutcome, StageRunner};
use super::workflow_tasks::{RunHandle, RunOutcome, RunStatus, WorkflowTasks};
use crate::db;
use crate::error::{WorkflowError, WorkflowResult};
use crate::models::{Item, Prompt, PromptStatus, Stage, StageRecord, StageStatus};

/// Run limits taken from configuration
#[derive(Debug, Clone, Copy)]
pub struct WorkflowSettings {
    /// Candidates requested from the source per run
    pub max_items: usize,
    /// Classifier calls in flight during Validation
    pub max_concurrent: usize,
}

/// Everything recorded for one prompt
#[derive(Debug, Clone, Serialize)]
pub struct PromptResults {
    pub prompt: Prompt,
    pub sessions: Vec<StageRecord>,
    pub items: Vec<Item>,
}

/// Counts from startup recovery
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub stage_records_failed: usize,
    pub prompts_failed: u64,
}

#[derive(Clone)]
pub struct WorkflowCoordinator {
    db: SqlitePool,
    event_bus: EventBus,
    progress: ProgressLog,
    runner: StageRunner,
    validator: BatchValidator,
    source: Arc<dyn CandidateSource>,
    tasks: WorkflowTasks,
    settings: WorkflowSettings,
    last_error: Arc<RwLock<Option<String>>>,
}

impl WorkflowCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        progress: ProgressLog,
        runner: StageRunner,
        validator: BatchValidator,
        source: Arc<dyn CandidateSource>,
        tasks: WorkflowTasks,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            db,
            event_bus,
            progress,
            runner,
            validator,
            source,
            tasks,
            settings,
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    pub fn tasks(&self) -> &WorkflowTasks {
        &self.tasks
    }

    /// Most recent run error, shared with the health endpoint
    pub fn last_error(&self) -> Arc<RwLock<Option<String>>> {
        Arc::clone(&self.last_error)
    }

    /// Create a Pending prompt
    pub async fn submit(&self, text: &str) -> WorkflowResult<Prompt> {
        let prompt = Prompt::new(text).map_err(WorkflowError::InvalidInput)?;
        db::prompts::insert_prompt(&self.db, &prompt).await?;
        tracing::info!(prompt_id = %prompt.id, "Prompt submitted");
        Ok(prompt)
    }

    /// Mark the prompt Processing and start a background run
    pub async fn trigger(&self, prompt_id: Uuid) -> WorkflowResult<RunHandle> {
        let prompt = self.load_prompt(prompt_id).await?;
        if prompt.status == PromptStatus::Processing {
            tracing::warn!(prompt_id = %prompt_id, "Prompt already processing, starting another run");
        } else if prompt.status.is_terminal() {
            tracing::info!(prompt_id = %prompt_id, previous = %prompt.status, "Re-running prompt");
        }
        db::prompts::update_prompt_status(&self.db, prompt_id, PromptStatus::Processing).await?;

        let run_id = Uuid::new_v4();
        tracing::info!(prompt_id = %prompt_id, run_id = %run_id, "Workflow run triggered");
        self.event_bus.emit_lossy(WorkflowEvent::RunStarted {
            run_id,
            prompt_id,
            timestamp: Utc::now(),
        });

        let coordinator = self.clone();
        self.tasks.spawn(run_id, prompt_id, async move {
            coordinator.run(prompt_id, run_id, &prompt.text).await
        });

        Ok(RunHandle { run_id, prompt_id })
    }

    /// Execute one run to the end; never returns an error
    pub async fn run(&self, prompt_id: Uuid, run_id: Uuid, prompt_text: &str) -> RunOutcome {
        let result = AssertUnwindSafe(self.run_stages(prompt_id, run_id, prompt_text))
            .catch_unwind()
            .await;

        let outcome = match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => self.mark_errored(prompt_id, run_id, e.to_string()).await,
            Err(_) => {
                self.mark_errored(prompt_id, run_id, "Workflow run panicked".to_string())
                    .await
            }
        };

        tracing::info!(
            prompt_id = %prompt_id,
            run_id = %run_id,
            outcome = outcome.label(),
            "Workflow run finished"
        );
        self.event_bus.emit_lossy(WorkflowEvent::RunFinished {
            run_id,
            prompt_id,
            outcome: outcome.label().to_string(),
            timestamp: Utc::now(),
        });

        outcome
    }

    async fn run_stages(
        &self,
        prompt_id: Uuid,
        run_id: Uuid,
        prompt_text: &str,
    ) -> WorkflowResult<RunOutcome> {
        let source = &self.source;

        let warmup = self
            .runner
            .run_stage(prompt_id, run_id, Stage::Warmup, |log| async move {
                if source.warm_up(prompt_text, &log).await? {
                    Ok(StageOutcome::success("Warm-up phase completed successfully"))
                } else {
                    Ok(StageOutcome::failure("Warm-up did not succeed"))
                }
            })
            .await?;
        if !warmup.succeeded() {
            return Ok(RunOutcome::StageFailed {
                stage: Stage::Warmup,
                detail: warmup.detail,
            });
        }

        let pool = &self.db;
        let max_items = self.settings.max_items;
        let acquisition = self
            .runner
            .run_stage(prompt_id, run_id, Stage::Acquisition, |log| async move {
                let candidates = source.acquire(prompt_text, max_items, &log).await;
                if candidates.is_empty() {
                    return Ok(StageOutcome::failure("No pins were scraped"));
                }

                let items: Vec<Item> = candidates
                    .into_iter()
                    .map(|candidate| Item::from_candidate(prompt_id, candidate))
                    .collect();
                db::items::insert_items(pool, &items).await?;
                log.append(format!("Saved {} pins to database", items.len()))
                    .await;

                Ok(StageOutcome::success(format!("Acquired {} pins", items.len())))
            })
            .await?;
        if !acquisition.succeeded() {
            return Ok(RunOutcome::StageFailed {
                stage: Stage::Acquisition,
                detail: acquisition.detail,
            });
        }

        let summary = self
            .validator
            .validate_batch(prompt_id, run_id, self.settings.max_concurrent)
            .await?;
        Ok(RunOutcome::Completed { summary })
    }

    async fn mark_errored(&self, prompt_id: Uuid, run_id: Uuid, message: String) -> RunOutcome {
        tracing::error!(prompt_id = %prompt_id, run_id = %run_id, error = %message, "Workflow run errored");
        if let Err(e) =
            db::prompts::update_prompt_status(&self.db, prompt_id, PromptStatus::Error).await
        {
            tracing::error!(prompt_id = %prompt_id, error = %e, "Failed to mark prompt as errored");
        }
        *self.last_error.write().await = Some(format!("Run {}: {}", run_id, message));
        RunOutcome::Errored { message }
    }

    /// Prompt with its stage records and items
    pub async fn get_status(&self, prompt_id: Uuid) -> WorkflowResult<PromptResults> {
        let prompt = self.load_prompt(prompt_id).await?;
        let sessions = db::stages::list_stage_records(&self.db, prompt_id).await?;
        let items = db::items::list_items(&self.db, prompt_id).await?;
        Ok(PromptResults {
            prompt,
            sessions,
            items,
        })
    }

    pub async fn list_prompts(&self, skip: i64, limit: i64) -> WorkflowResult<Vec<Prompt>> {
        Ok(db::prompts::list_prompts(&self.db, skip, limit).await?)
    }

    pub async fn load_prompt(&self, prompt_id: Uuid) -> WorkflowResult<Prompt> {
        db::prompts::load_prompt(&self.db, prompt_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("Prompt {}", prompt_id)))
    }

    /// Delete a prompt and everything recorded for it
    pub async fn delete(&self, prompt_id: Uuid) -> WorkflowResult<()> {
        if !db::prompts::delete_prompt(&self.db, prompt_id).await? {
            return Err(WorkflowError::NotFound(format!("Prompt {}", prompt_id)));
        }
        tracing::info!(prompt_id = %prompt_id, "Prompt deleted");
        Ok(())
    }

    pub fn run_status(&self, run_id: Uuid) -> WorkflowResult<RunStatus> {
        self.tasks
            .status(run_id)
            .ok_or_else(|| WorkflowError::NotFound(format!("Run {}", run_id)))
    }

    /// Fail stage records and prompts left in flight by a previous process
    pub async fn recover_interrupted_runs(&self) -> WorkflowResult<RecoveryReport> {
        let pending = db::stages::list_pending_stage_record_ids(&self.db).await?;
        for id in &pending {
            self.progress.append(*id, "Stage interrupted by restart").await;
            db::stages::finish_stage_record(&self.db, *id, StageStatus::Failed).await?;
        }
        let prompts_failed = db::prompts::fail_processing_prompts(&self.db).await?;

        let report = RecoveryReport {
            stage_records_failed: pending.len(),
            prompts_failed,
        };
        if report != RecoveryReport::default() {
            tracing::warn!(
                stage_records = report.stage_records_failed,
                prompts = report.prompts_failed,
                "Recovered workflow runs interrupted by restart"
            );
        }
        Ok(report)
    }
}
