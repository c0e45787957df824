//! Bounded batch validation
//!
//! Classifies every Pending item of a prompt with at most `C` classifier
//! calls in flight. A failing or slow item only affects its own verdict;
//! a verdict that cannot be persisted fails the whole stage once the rest
//! of the batch has settled.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use pinscout_common::events::{EventBus, WorkflowEvent};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::classifier::{Classifier, ClassifierError};
use super::progress_log::StageLog;
use super::stage_runner::{StageOutcome, StageRunner};
use super::verdict;
use crate::db;
use crate::error::{WorkflowError, WorkflowResult};
use crate::models::{Item, ItemStatus, PromptStatus, Stage, Verdict};

/// Aggregate counts for one batch
///
/// `approved + disqualified == validated <= total`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSummary {
    /// Pending items at batch start
    pub total: usize,
    /// Items whose verdict was recorded
    pub validated: usize,
    pub approved: usize,
    pub disqualified: usize,
}

/// Settled state of one item
enum ItemResult {
    Recorded(ItemStatus),
    /// Another writer already gave the item a verdict
    AlreadyDecided,
    NotPersisted(String),
}

#[derive(Clone)]
pub struct BatchValidator {
    db: SqlitePool,
    event_bus: EventBus,
    runner: StageRunner,
    classifier: Arc<dyn Classifier>,
    call_timeout: Duration,
}

impl BatchValidator {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        runner: StageRunner,
        classifier: Arc<dyn Classifier>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            db,
            event_bus,
            runner,
            classifier,
            call_timeout,
        }
    }

    /// Validate all Pending items of a prompt with at most `max_concurrent` calls in flight
    ///
    /// With no Pending items nothing is recorded and the prompt status is left
    /// alone. Otherwise the prompt ends Completed, or Error when the
    /// Validation stage fails.
    pub async fn validate_batch(
        &self,
        prompt_id: Uuid,
        run_id: Uuid,
        max_concurrent: usize,
    ) -> WorkflowResult<ValidationSummary> {
        let prompt = db::prompts::load_prompt(&self.db, prompt_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("Prompt {}", prompt_id)))?;

        let pending = db::items::list_pending_items(&self.db, prompt_id).await?;
        if pending.is_empty() {
            tracing::info!(prompt_id = %prompt_id, run_id = %run_id, "No pending items to validate");
            return Ok(ValidationSummary::default());
        }

        let total = pending.len();
        let concurrency = max_concurrent.max(1);
        let mut summary = ValidationSummary {
            total,
            ..Default::default()
        };
        let summary_slot = &mut summary;

        tracing::info!(
            prompt_id = %prompt_id,
            run_id = %run_id,
            total,
            concurrency,
            "Starting batch validation"
        );

        let report = self
            .runner
            .run_stage(prompt_id, run_id, Stage::Validation, move |log| async move {
                log.append(format!("Starting AI validation of {} pins", total))
                    .await;

                let settled = AtomicUsize::new(0);
                let results: Vec<ItemResult> = stream::iter(pending)
                    .map(|item| self.validate_item(item, &prompt.text, &log, &settled, total))
                    .buffer_unordered(concurrency)
                    .collect()
                    .await;

                let mut failures = Vec::new();
                for result in results {
                    match result {
                        ItemResult::Recorded(ItemStatus::Approved) => {
                            summary_slot.validated += 1;
                            summary_slot.approved += 1;
                        }
                        ItemResult::Recorded(_) => {
                            summary_slot.validated += 1;
                            summary_slot.disqualified += 1;
                        }
                        ItemResult::AlreadyDecided => {}
                        ItemResult::NotPersisted(reason) => failures.push(reason),
                    }
                }

                if let Some(first) = failures.first() {
                    anyhow::bail!(
                        "Failed to persist {} of {} item results: {}",
                        failures.len(),
                        total,
                        first
                    );
                }

                log.append(format!(
                    "AI validation completed! Approved: {}, Disqualified: {}",
                    summary_slot.approved, summary_slot.disqualified
                ))
                .await;

                Ok(StageOutcome::success(format!(
                    "Validated {}/{} items",
                    summary_slot.validated, total
                )))
            })
            .await?;

        if !report.succeeded() {
            db::prompts::update_prompt_status(&self.db, prompt_id, PromptStatus::Error).await?;
            return Err(WorkflowError::StageFailed {
                stage: Stage::Validation,
                detail: report.detail,
            });
        }

        db::prompts::update_prompt_status(&self.db, prompt_id, PromptStatus::Completed).await?;

        tracing::info!(
            prompt_id = %prompt_id,
            run_id = %run_id,
            approved = summary.approved,
            disqualified = summary.disqualified,
            "Batch validation completed"
        );

        Ok(summary)
    }

    /// Classify, persist and report one item
    async fn validate_item(
        &self,
        item: Item,
        prompt_text: &str,
        log: &StageLog,
        settled: &AtomicUsize,
        total: usize,
    ) -> ItemResult {
        let verdict = self.classify_item(&item, prompt_text).await;

        let result = match db::items::record_item_verdict(&self.db, item.id, &verdict).await {
            Ok(true) => ItemResult::Recorded(verdict.status),
            Ok(false) => ItemResult::AlreadyDecided,
            Err(e) => ItemResult::NotPersisted(format!("item {}: {}", item.id, e)),
        };

        let k = settled.fetch_add(1, Ordering::SeqCst) + 1;
        match &result {
            ItemResult::Recorded(status) => {
                log.append(format!("Validated item {}/{} - {}", k, total, status))
                    .await;
                self.event_bus.emit_lossy(WorkflowEvent::ItemValidated {
                    prompt_id: item.prompt_id,
                    item_id: item.id,
                    score: verdict.score,
                    status: status.as_str().to_string(),
                    validated: k,
                    total,
                    timestamp: Utc::now(),
                });
            }
            ItemResult::AlreadyDecided => {
                log.append(format!("Skipped item {}/{} - already validated", k, total))
                    .await;
            }
            ItemResult::NotPersisted(reason) => {
                tracing::error!(item_id = %item.id, "Failed to record item verdict: {}", reason);
                log.append(format!("Failed to record verdict for item {}/{}", k, total))
                    .await;
            }
        }

        result
    }

    /// Verdict for one item; call failures become Disqualified verdicts
    async fn classify_item(&self, item: &Item, prompt_text: &str) -> Verdict {
        if item.image_ref.trim().is_empty() {
            return verdict::missing_image_verdict();
        }

        let call = self.classifier.classify(&item.image_ref, prompt_text);
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(Ok(reply)) => verdict::parse_reply(&reply),
            Ok(Err(e)) => {
                tracing::warn!(item_id = %item.id, error = %e, "Classifier call failed");
                verdict::failure_verdict(&e.to_string())
            }
            Err(_) => {
                let e = ClassifierError::Timeout(self.call_timeout.as_secs());
                tracing::warn!(item_id = %item.id, error = %e, "Classifier call timed out");
                verdict::failure_verdict(&e.to_string())
            }
        }
    }
}
