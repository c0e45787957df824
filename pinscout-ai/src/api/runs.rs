//! Workflow run status endpoint

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use super::parse_id;
use crate::error::ApiResult;
use crate::services::RunStatus;
use crate::AppState;

/// GET /api/runs/:run_id
///
/// 404 for runs pruned from the registry or started by an earlier process;
/// their stage records remain under `/api/prompts/:id/results`.
pub async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> ApiResult<Json<RunStatus>> {
    let run_id = parse_id(&run_id, "run")?;
    Ok(Json(state.coordinator.run_status(run_id)?))
}

pub fn run_routes() -> Router<AppState> {
    Router::new().route("/api/runs/:run_id", get(get_run))
}
