//! Reconciliation ruleset handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use utoipa::ToSchema;
use validator::Validate;

use crate::AppState;
use crate::models::{FieldPreference, Ruleset};
use crate::utils::{ApiError, ApiResult};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct GenerateRulesRequest {
    #[validate(length(min = 1, message = "kg_name must not be empty"))]
    pub kg_name: String,
    #[validate(length(min = 1, message = "at least one schema is required"))]
    pub schemas: Vec<String>,
    #[serde(default = "default_use_llm")]
    pub use_llm: bool,
    #[serde(default = "default_min_confidence")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_confidence: f64,
    /// Per-table preferences; values may be the structured form or a bare
    /// `{"src_col": "tgt_col"}` hint map.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub field_preferences: BTreeMap<String, serde_json::Value>,
}

fn default_use_llm() -> bool {
    true
}

fn default_min_confidence() -> f64 {
    0.3
}

/// Generate a reconciliation ruleset from the knowledge graph
#[utoipa::path(
    post,
    path = "/api/rules/generate",
    request_body = GenerateRulesRequest,
    responses(
        (status = 201, description = "Ruleset generated", body = Ruleset),
        (status = 404, description = "Graph or schema not found"),
    ),
    tag = "Rules"
)]
pub async fn generate_rules(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerateRulesRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()
        .map_err(|e| ApiError::validation_error(e.to_string()))?;

    let kg = state.graph_service.snapshot(&req.kg_name).await?;
    let schemas = state.schema_store.load_many(&req.schemas).await?;

    // free-form preference maps are adapted to the typed form here and
    // nowhere else
    let preferences: Vec<FieldPreference> = req
        .field_preferences
        .iter()
        .map(|(table, value)| FieldPreference::from_value(table, value))
        .collect();

    let ruleset = state
        .rule_generator
        .generate(&kg, &schemas, req.use_llm, req.min_confidence, &preferences)
        .await;

    state.store.save_ruleset(&ruleset)?;
    tracing::info!("Generated ruleset {} with {} rules", ruleset.ruleset_id, ruleset.rules.len());

    Ok((StatusCode::CREATED, Json(ruleset)))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RulesetSummary {
    pub ruleset_id: String,
    pub name: String,
    pub kg_name: String,
    pub schemas: Vec<String>,
    pub rule_count: usize,
    pub created_at: DateTime<Utc>,
}

/// List rulesets
#[utoipa::path(
    get,
    path = "/api/rules",
    responses((status = 200, description = "Ruleset summaries", body = Vec<RulesetSummary>)),
    tag = "Rules"
)]
pub async fn list_rulesets(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<RulesetSummary>>> {
    let rulesets = state.store.list_rulesets()?;
    let summaries = rulesets
        .into_iter()
        .map(|rs| RulesetSummary {
            ruleset_id: rs.ruleset_id,
            name: rs.name,
            kg_name: rs.kg_name,
            schemas: rs.schemas,
            rule_count: rs.rules.len(),
            created_at: rs.created_at,
        })
        .collect();
    Ok(Json(summaries))
}

/// Fetch one ruleset
#[utoipa::path(
    get,
    path = "/api/rules/{ruleset_id}",
    params(("ruleset_id" = String, Path, description = "Ruleset id")),
    responses(
        (status = 200, description = "Ruleset", body = Ruleset),
        (status = 404, description = "Ruleset not found"),
    ),
    tag = "Rules"
)]
pub async fn get_ruleset(
    State(state): State<Arc<AppState>>,
    Path(ruleset_id): Path<String>,
) -> ApiResult<Json<Ruleset>> {
    Ok(Json(state.store.load_ruleset(&ruleset_id)?))
}
