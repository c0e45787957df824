//! Registry of background workflow runs
//!
//! Every triggered run is a tokio task keyed by its run id. Callers can poll
//! a run's status or await its outcome; shutdown aborts whatever is still
//! running. Only the most recent finished runs are retained: once more than
//! [`DEFAULT_FINISHED_RETENTION`] have finished, the oldest are dropped and
//! their run ids become unknown.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::batch_validator::ValidationSummary;
use crate::models::Stage;

/// How a workflow run ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every stage succeeded
    Completed { summary: ValidationSummary },
    /// A stage reported failure and the run stopped there
    StageFailed { stage: Stage, detail: String },
    /// Unexpected error (store failure, validation batch failure)
    Errored { message: String },
}

impl RunOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::StageFailed { .. } => "stage_failed",
            Self::Errored { .. } => "errored",
        }
    }
}

/// Identifies a triggered run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunHandle {
    pub run_id: Uuid,
    pub prompt_id: Uuid,
}

/// Point-in-time view of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatus {
    pub run_id: Uuid,
    pub prompt_id: Uuid,
    pub finished: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<RunOutcome>,
}

/// Finished runs kept for status queries
pub const DEFAULT_FINISHED_RETENTION: usize = 100;

struct RunEntry {
    prompt_id: Uuid,
    outcome: watch::Receiver<Option<RunOutcome>>,
    handle: JoinHandle<()>,
}

impl RunEntry {
    fn is_finished(&self) -> bool {
        self.outcome.borrow().is_some() || self.handle.is_finished()
    }
}

#[derive(Default)]
struct Registry {
    runs: HashMap<Uuid, RunEntry>,
    /// Run ids in spawn order
    order: VecDeque<Uuid>,
}

impl Registry {
    /// Drop the oldest finished runs beyond `retention`
    fn prune(&mut self, retention: usize) {
        let finished: Vec<Uuid> = self
            .order
            .iter()
            .filter(|id| self.runs.get(*id).map_or(true, RunEntry::is_finished))
            .copied()
            .collect();
        if finished.len() <= retention {
            return;
        }

        let excess = finished.len() - retention;
        for run_id in &finished[..excess] {
            self.runs.remove(run_id);
        }
        let runs = &self.runs;
        self.order.retain(|id| runs.contains_key(id));
        tracing::debug!(dropped = excess, "Pruned finished workflow runs");
    }
}

#[derive(Clone)]
pub struct WorkflowTasks {
    registry: Arc<Mutex<Registry>>,
    retention: usize,
}

impl Default for WorkflowTasks {
    fn default() -> Self {
        Self::with_retention(DEFAULT_FINISHED_RETENTION)
    }
}

impl WorkflowTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry keeping at most `retention` finished runs
    pub fn with_retention(retention: usize) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            retention,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Spawn `run` as the task for `run_id`
    pub fn spawn<F>(&self, run_id: Uuid, prompt_id: Uuid, run: F)
    where
        F: Future<Output = RunOutcome> + Send + 'static,
    {
        let (tx, rx) = watch::channel(None);
        let handle = tokio::spawn(async move {
            let outcome = run.await;
            let _ = tx.send(Some(outcome));
        });

        let entry = RunEntry {
            prompt_id,
            outcome: rx,
            handle,
        };
        let mut registry = self.lock();
        registry.runs.insert(run_id, entry);
        registry.order.push_back(run_id);
        registry.prune(self.retention);
    }

    /// Current status of a run; `None` for an unknown run id
    pub fn status(&self, run_id: Uuid) -> Option<RunStatus> {
        let registry = self.lock();
        registry.runs.get(&run_id).map(|entry| {
            let outcome = entry.outcome.borrow().clone();
            RunStatus {
                run_id,
                prompt_id: entry.prompt_id,
                finished: outcome.is_some() || entry.handle.is_finished(),
                outcome,
            }
        })
    }

    /// Wait for a run to finish
    ///
    /// `None` when the run id is unknown or the task ended without an
    /// outcome (aborted or panicked).
    pub async fn wait(&self, run_id: Uuid) -> Option<RunOutcome> {
        let mut rx = {
            let registry = self.lock();
            registry.runs.get(&run_id)?.outcome.clone()
        };

        let outcome = match rx.wait_for(|outcome| outcome.is_some()).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        outcome
    }

    /// Runs not yet finished
    pub fn active_count(&self) -> usize {
        let registry = self.lock();
        registry
            .runs
            .values()
            .filter(|entry| !entry.is_finished())
            .count()
    }

    /// Abort every run still in flight
    pub fn shutdown(&self) {
        let registry = self.lock();
        let mut aborted = 0;
        for (run_id, entry) in registry.runs.iter() {
            if !entry.is_finished() {
                tracing::warn!(run_id = %run_id, prompt_id = %entry.prompt_id, "Aborting workflow run");
                entry.handle.abort();
                aborted += 1;
            }
        }
        tracing::info!(aborted, "Workflow tasks shut down");
    }
}
