//! GET /events - SSE stream of workflow progress
//!
//! Streams RunStarted, StageStarted, StageLogAppended, StageFinished,
//! ItemValidated and RunFinished events as JSON.

use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;

use crate::AppState;

pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    pinscout_common::sse::workflow_event_stream(&state.event_bus, "pinscout-ai")
}
