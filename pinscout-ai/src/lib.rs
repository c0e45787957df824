//! pinscout-ai library interface
//!
//! Exposes the workflow services, store access and HTTP router so the
//! binary and the integration tests share one wiring.

pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult, WorkflowError, WorkflowResult};

use axum::http::HeaderValue;
use axum::Router;
use chrono::{DateTime, Utc};
use pinscout_common::config::TomlConfig;
use pinscout_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::services::{
    BatchValidator, CandidateSource, Classifier, ProgressLog, StageRunner, WorkflowCoordinator,
    WorkflowSettings, WorkflowTasks,
};

/// Events buffered per SSE subscriber
pub const EVENT_BUS_CAPACITY: usize = 1000;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    pub coordinator: WorkflowCoordinator,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last run error for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(event_bus: EventBus, coordinator: WorkflowCoordinator) -> Self {
        let last_error = coordinator.last_error();
        Self {
            event_bus,
            coordinator,
            startup_time: Utc::now(),
            last_error,
        }
    }
}

/// Wire progress log, stage runner, validator and coordinator from config
///
/// Timeouts below one second are raised to one second.
pub fn build_coordinator(
    db: SqlitePool,
    event_bus: EventBus,
    classifier: Arc<dyn Classifier>,
    source: Arc<dyn CandidateSource>,
    config: &TomlConfig,
) -> WorkflowCoordinator {
    let progress = ProgressLog::new(db.clone(), event_bus.clone());
    let runner = StageRunner::new(
        db.clone(),
        event_bus.clone(),
        progress.clone(),
        Duration::from_secs(config.workflow.stage_timeout_secs.max(1)),
    );
    let validator = BatchValidator::new(
        db.clone(),
        event_bus.clone(),
        runner.clone(),
        classifier,
        Duration::from_secs(config.classifier.timeout_secs.max(1)),
    );

    WorkflowCoordinator::new(
        db,
        event_bus,
        progress,
        runner,
        validator,
        source,
        WorkflowTasks::new(),
        WorkflowSettings {
            max_items: config.acquisition.max_items,
            max_concurrent: config.classifier.max_concurrent,
        },
    )
}

/// CORS layer for the configured origins; invalid entries are skipped
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build application router
pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::health_routes())
        .merge(api::prompt_routes())
        .merge(api::run_routes())
        .route("/events", get(api::event_stream))
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
