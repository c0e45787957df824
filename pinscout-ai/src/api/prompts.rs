//! Prompt API handlers
//!
//! POST/GET /api/prompts, GET/DELETE /api/prompts/:id,
//! GET /api/prompts/:id/results, POST /api/prompts/:id/start-workflow

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::parse_id;
use crate::error::{ApiError, ApiResult};
use crate::models::Prompt;
use crate::services::PromptResults;
use crate::AppState;

pub const DEFAULT_PAGE_LIMIT: i64 = 10;
pub const MAX_PAGE_LIMIT: i64 = 100;

/// POST /api/prompts request
#[derive(Debug, Deserialize)]
pub struct CreatePromptRequest {
    pub text: String,
}

/// GET /api/prompts query
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    DEFAULT_PAGE_LIMIT
}

/// POST /api/prompts/:id/start-workflow response
#[derive(Debug, Serialize)]
pub struct StartWorkflowResponse {
    pub message: String,
    pub prompt_id: Uuid,
    pub run_id: Uuid,
    pub status: String,
}

/// POST /api/prompts
pub async fn create_prompt(
    State(state): State<AppState>,
    Json(request): Json<CreatePromptRequest>,
) -> ApiResult<(StatusCode, Json<Prompt>)> {
    let prompt = state.coordinator.submit(&request.text).await?;
    Ok((StatusCode::CREATED, Json(prompt)))
}

/// GET /api/prompts?skip=&limit=
pub async fn list_prompts(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Prompt>>> {
    if query.skip < 0 {
        return Err(ApiError::BadRequest("skip must not be negative".to_string()));
    }
    if !(1..=MAX_PAGE_LIMIT).contains(&query.limit) {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {}",
            MAX_PAGE_LIMIT
        )));
    }

    let prompts = state.coordinator.list_prompts(query.skip, query.limit).await?;
    Ok(Json(prompts))
}

/// GET /api/prompts/:id
pub async fn get_prompt(
    State(state): State<AppState>,
    Path(prompt_id): Path<String>,
) -> ApiResult<Json<Prompt>> {
    let prompt_id = parse_id(&prompt_id, "prompt")?;
    Ok(Json(state.coordinator.load_prompt(prompt_id).await?))
}

/// GET /api/prompts/:id/results
pub async fn get_results(
    State(state): State<AppState>,
    Path(prompt_id): Path<String>,
) -> ApiResult<Json<PromptResults>> {
    let prompt_id = parse_id(&prompt_id, "prompt")?;
    Ok(Json(state.coordinator.get_status(prompt_id).await?))
}

/// DELETE /api/prompts/:id
pub async fn delete_prompt(
    State(state): State<AppState>,
    Path(prompt_id): Path<String>,
) -> ApiResult<StatusCode> {
    let prompt_id = parse_id(&prompt_id, "prompt")?;
    state.coordinator.delete(prompt_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/prompts/:id/start-workflow
///
/// Returns 202 Accepted immediately; the run continues in the background.
pub async fn start_workflow(
    State(state): State<AppState>,
    Path(prompt_id): Path<String>,
) -> ApiResult<(StatusCode, Json<StartWorkflowResponse>)> {
    let prompt_id = parse_id(&prompt_id, "prompt")?;
    let handle = state.coordinator.trigger(prompt_id).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(StartWorkflowResponse {
            message: "Workflow started".to_string(),
            prompt_id: handle.prompt_id,
            run_id: handle.run_id,
            status: "processing".to_string(),
        }),
    ))
}

pub fn prompt_routes() -> Router<AppState> {
    Router::new()
        .route("/api/prompts", post(create_prompt).get(list_prompts))
        .route("/api/prompts/:id", get(get_prompt).delete(delete_prompt))
        .route("/api/prompts/:id/results", get(get_results))
        .route("/api/prompts/:id/start-workflow", post(start_workflow))
}
