//! KPI handlers: configure KPIs and compute them from supplied inputs.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;
use validator::Validate;

use super::reconciliation::KpiSummary;
use crate::AppState;
use crate::models::{ExecutionOutcome, KpiConfig, KpiKind};
use crate::services::kpi::KpiInputs;
use crate::utils::{ApiError, ApiResult, id};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateKpiConfigRequest {
    #[validate(length(min = 1, message = "name must not be empty"))]
    pub name: String,
    pub kind: KpiKind,
}

/// Create a KPI configuration
#[utoipa::path(
    post,
    path = "/api/kpi/configs",
    request_body = CreateKpiConfigRequest,
    responses((status = 201, description = "KPI config created", body = KpiConfig)),
    tag = "KPIs"
)]
pub async fn create_kpi_config(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateKpiConfigRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()
        .map_err(|e| ApiError::validation_error(e.to_string()))?;
    let config = KpiConfig {
        kpi_id: id::kpi_id(),
        name: req.name,
        kind: req.kind,
        enabled: true,
        created_at: Utc::now(),
    };
    state.store.save_kpi_config(&config)?;
    Ok((StatusCode::CREATED, Json(config)))
}

/// Fetch a KPI configuration
#[utoipa::path(
    get,
    path = "/api/kpi/configs/{kpi_id}",
    params(("kpi_id" = String, Path, description = "KPI id")),
    responses(
        (status = 200, description = "KPI config", body = KpiConfig),
        (status = 404, description = "KPI config not found"),
    ),
    tag = "KPIs"
)]
pub async fn get_kpi_config(
    State(state): State<Arc<AppState>>,
    Path(kpi_id): Path<String>,
) -> ApiResult<Json<KpiConfig>> {
    Ok(Json(state.store.load_kpi_config(&kpi_id)?))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ComputeKpisRequest {
    #[validate(length(min = 1, message = "ruleset_id must not be empty"))]
    pub ruleset_id: String,
    /// Execution this KPI belongs to; generated when absent
    #[serde(default)]
    pub execution_id: Option<String>,
    pub matched_count: usize,
    pub total_source_count: usize,
    /// (confidence, record count) pairs for matched records
    #[serde(default)]
    #[schema(value_type = Vec<Vec<f64>>)]
    pub match_confidences: Vec<(f64, usize)>,
    pub active_rules: usize,
    pub total_rules: usize,
    pub execution_time_ms: u64,
}

/// Compute RCR/DQCS/REI from supplied inputs and persist the documents
#[utoipa::path(
    post,
    path = "/api/kpi/compute",
    request_body = ComputeKpisRequest,
    responses((status = 200, description = "Computed KPI documents", body = KpiSummary)),
    tag = "KPIs"
)]
pub async fn compute_kpis(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ComputeKpisRequest>,
) -> ApiResult<Json<KpiSummary>> {
    req.validate()
        .map_err(|e| ApiError::validation_error(e.to_string()))?;

    let inputs = KpiInputs {
        matched_count: req.matched_count,
        total_source_count: req.total_source_count,
        match_confidences: req.match_confidences.clone(),
        active_rules: req.active_rules,
        total_rules: req.total_rules,
        execution_time_ms: req.execution_time_ms,
    };

    // shell outcome carrying only lineage identity for the evidence document
    let outcome = ExecutionOutcome {
        ruleset_id: req.ruleset_id.clone(),
        execution_id: req.execution_id.clone().unwrap_or_else(id::execution_id),
        execution_timestamp: Utc::now(),
        matched_count: req.matched_count,
        unmatched_source_count: req.total_source_count.saturating_sub(req.matched_count),
        unmatched_target_count: 0,
        matched_records: Vec::new(),
        unmatched_source: Vec::new(),
        unmatched_target: Vec::new(),
        execution_time_ms: req.execution_time_ms,
        generated_sql: Vec::new(),
        rule_match_stats: Vec::new(),
        rule_errors: Vec::new(),
    };

    let (rcr, dqcs, rei) = state.kpi_service.persist(&inputs, &outcome, None)?;
    Ok(Json(KpiSummary { rcr, dqcs, rei }))
}
