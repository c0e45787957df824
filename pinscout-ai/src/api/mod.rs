//! HTTP API handlers for pinscout-ai

pub mod health;
pub mod prompts;
pub mod runs;
pub mod sse;

pub use health::health_routes;
pub use prompts::prompt_routes;
pub use runs::run_routes;
pub use sse::event_stream;

use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

/// Parse an id path segment, rejecting malformed values with 400
pub(crate) fn parse_id(raw: &str, kind: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("Invalid {} ID format", kind)))
}
