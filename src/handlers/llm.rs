//! LLM status handler.

use axum::{Json, extract::State};
use std::sync::Arc;

use crate::AppState;
use crate::services::llm::LlmStatus;
use crate::utils::ApiResult;

/// LLM surface status (no secrets)
#[utoipa::path(
    get,
    path = "/api/llm/status",
    responses((status = 200, description = "LLM status", body = LlmStatus)),
    tag = "LLM"
)]
pub async fn get_status(State(state): State<Arc<AppState>>) -> ApiResult<Json<LlmStatus>> {
    Ok(Json(state.llm_service.status()))
}
