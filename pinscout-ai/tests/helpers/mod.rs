//! Test helper utilities
//!
//! Fake classifier and candidate source plus a harness that wires the
//! workflow services over an in-memory database.

#![allow(dead_code)]

use async_trait::async_trait;
use pinscout_ai::db;
use pinscout_ai::models::{CandidateRecord, Item, Prompt};
use pinscout_ai::services::{
    BatchValidator, CandidateSource, Classifier, ClassifierError, ProgressLog, StageLog,
    StageRunner, WorkflowCoordinator, WorkflowSettings, WorkflowTasks,
};
use pinscout_common::events::EventBus;
use serde_json::json;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Scripted behaviour for one image
#[derive(Debug, Clone)]
pub enum Reply {
    /// Return this raw text
    Text(String),
    /// Fail with a network error
    Fail(String),
    /// Never answer
    Hang,
}

impl Reply {
    pub fn score(score: f64) -> Self {
        Reply::Text(
            json!({
                "match_score": score,
                "explanation": format!("Scored {}", score),
                "classification": if score >= 0.5 { "approved" } else { "disqualified" },
            })
            .to_string(),
        )
    }
}

/// Classifier answering from a script keyed by image reference
pub struct FakeClassifier {
    replies: HashMap<String, Reply>,
    default_reply: Reply,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl FakeClassifier {
    pub fn new(default_reply: Reply) -> Self {
        Self {
            replies: HashMap::new(),
            default_reply,
            delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_reply(mut self, image_ref: &str, reply: Reply) -> Self {
        self.replies.insert(image_ref.to_string(), reply);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Highest number of calls observed in flight at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight gauge even when the call is cancelled
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Classifier for FakeClassifier {
    async fn classify(&self, image_ref: &str, _prompt_text: &str) -> Result<String, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.peak.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match self.replies.get(image_ref).unwrap_or(&self.default_reply) {
            Reply::Text(text) => Ok(text.clone()),
            Reply::Fail(reason) => Err(ClassifierError::NetworkError(reason.clone())),
            Reply::Hang => std::future::pending().await,
        }
    }
}

/// Warm-up behaviour of the fake source
#[derive(Debug, Clone)]
pub enum Warmup {
    Succeed,
    Decline,
    Error(String),
}

/// Candidate source returning a fixed candidate list
pub struct FakeSource {
    warmup: Warmup,
    candidates: Vec<CandidateRecord>,
    acquire_calls: AtomicUsize,
    requested_max: Mutex<Option<usize>>,
}

impl FakeSource {
    pub fn new(warmup: Warmup, candidates: Vec<CandidateRecord>) -> Self {
        Self {
            warmup,
            candidates,
            acquire_calls: AtomicUsize::new(0),
            requested_max: Mutex::new(None),
        }
    }

    pub fn acquire_calls(&self) -> usize {
        self.acquire_calls.load(Ordering::SeqCst)
    }

    pub fn requested_max(&self) -> Option<usize> {
        *self.requested_max.lock().unwrap()
    }
}

#[async_trait]
impl CandidateSource for FakeSource {
    async fn warm_up(&self, _prompt_text: &str, log: &StageLog) -> anyhow::Result<bool> {
        log.append("Starting warm-up phase...").await;
        match &self.warmup {
            Warmup::Succeed => Ok(true),
            Warmup::Decline => Ok(false),
            Warmup::Error(reason) => Err(anyhow::anyhow!("{}", reason)),
        }
    }

    async fn acquire(
        &self,
        _prompt_text: &str,
        max_items: usize,
        log: &StageLog,
    ) -> Vec<CandidateRecord> {
        self.acquire_calls.fetch_add(1, Ordering::SeqCst);
        *self.requested_max.lock().unwrap() = Some(max_items);
        let candidates: Vec<_> = self.candidates.iter().take(max_items).cloned().collect();
        for (i, _) in candidates.iter().enumerate() {
            log.append(format!("Scraped pin {}/{}", i + 1, max_items)).await;
        }
        candidates
    }
}

/// Image reference used for candidate `i`
pub fn image_ref(i: usize) -> String {
    format!("https://i.pinimg.com/originals/{}.jpg", i)
}

pub fn candidate(i: usize) -> CandidateRecord {
    CandidateRecord {
        image_ref: image_ref(i),
        source_ref: format!("https://www.pinterest.com/pin/{}/", 1000 + i),
        title: format!("Pin {}", i),
        description: String::new(),
        metadata: json!({ "collected_at": "2024-03-01T12:00:00Z" }),
    }
}

pub fn candidates(n: usize) -> Vec<CandidateRecord> {
    (0..n).map(candidate).collect()
}

/// Workflow services over an in-memory database
pub struct Harness {
    pub pool: SqlitePool,
    pub event_bus: EventBus,
    pub runner: StageRunner,
    pub validator: BatchValidator,
    pub coordinator: WorkflowCoordinator,
}

impl Harness {
    pub async fn new(
        classifier: Arc<dyn Classifier>,
        source: Arc<dyn CandidateSource>,
        call_timeout: Duration,
    ) -> Self {
        let pool = db::init_memory_pool().await.unwrap();
        let event_bus = EventBus::new(1000);
        let progress = ProgressLog::new(pool.clone(), event_bus.clone());
        let runner = StageRunner::new(
            pool.clone(),
            event_bus.clone(),
            progress.clone(),
            Duration::from_secs(30),
        );
        let validator = BatchValidator::new(
            pool.clone(),
            event_bus.clone(),
            runner.clone(),
            classifier,
            call_timeout,
        );
        let coordinator = WorkflowCoordinator::new(
            pool.clone(),
            event_bus.clone(),
            progress,
            runner.clone(),
            validator.clone(),
            source,
            WorkflowTasks::new(),
            WorkflowSettings {
                max_items: 25,
                max_concurrent: 5,
            },
        );

        Self {
            pool,
            event_bus,
            runner,
            validator,
            coordinator,
        }
    }

    /// Harness whose source yields nothing; for validator-only tests
    pub async fn for_validation(classifier: Arc<dyn Classifier>, call_timeout: Duration) -> Self {
        Self::new(
            classifier,
            Arc::new(FakeSource::new(Warmup::Succeed, Vec::new())),
            call_timeout,
        )
        .await
    }

    /// Insert a prompt already marked Processing
    pub async fn processing_prompt(&self, text: &str) -> Prompt {
        let mut prompt = Prompt::new(text).unwrap();
        prompt.status = pinscout_ai::models::PromptStatus::Processing;
        db::prompts::insert_prompt(&self.pool, &prompt).await.unwrap();
        prompt
    }

    /// Insert Pending items built from the first `n` candidates
    pub async fn seed_items(&self, prompt_id: Uuid, n: usize) -> Vec<Item> {
        let items: Vec<Item> = candidates(n)
            .into_iter()
            .map(|c| Item::from_candidate(prompt_id, c))
            .collect();
        db::items::insert_items(&self.pool, &items).await.unwrap();
        items
    }
}
