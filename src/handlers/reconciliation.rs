//! Reconciliation execution handler: run a ruleset against source/target
//! backends, persist the result artifact and compute KPIs.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use validator::Validate;

use crate::AppState;
use crate::config::DbConnectionConfig;
use crate::models::{DqcsKpi, ExecutionOutcome, RcrKpi, ReiKpi};
use crate::services::sql_generator::Dialect;
use crate::utils::{ApiError, ApiResult, id};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ExecuteReconciliationRequest {
    #[validate(length(min = 1, message = "ruleset_id must not be empty"))]
    pub ruleset_id: String,
    #[serde(default)]
    pub source_db: Option<DbConnectionConfig>,
    #[serde(default)]
    pub target_db: Option<DbConnectionConfig>,
    #[serde(default = "default_dialect")]
    pub dialect: String,
    #[serde(default)]
    pub limit: Option<u32>,
    /// Skip KPI computation when false
    #[serde(default = "default_true")]
    pub compute_kpis: bool,
}

fn default_dialect() -> String {
    "mysql".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize, ToSchema)]
pub struct KpiSummary {
    pub rcr: RcrKpi,
    pub dqcs: DqcsKpi,
    pub rei: ReiKpi,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ExecuteReconciliationResponse {
    pub outcome: ExecutionOutcome,
    pub result_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kpis: Option<KpiSummary>,
}

/// Execute a reconciliation ruleset. Per-rule failures are reported in
/// `outcome.rule_errors`; the request succeeds as long as the batch ran.
#[utoipa::path(
    post,
    path = "/api/reconciliation/execute",
    request_body = ExecuteReconciliationRequest,
    responses(
        (status = 200, description = "Execution outcome", body = ExecuteReconciliationResponse),
        (status = 400, description = "Missing connection config"),
        (status = 404, description = "Ruleset not found"),
        (status = 503, description = "Worker queue full"),
    ),
    tag = "Reconciliation"
)]
pub async fn execute_reconciliation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ExecuteReconciliationRequest>,
) -> ApiResult<Json<ExecuteReconciliationResponse>> {
    req.validate()
        .map_err(|e| ApiError::validation_error(e.to_string()))?;
    let dialect = Dialect::parse(&req.dialect)?;

    let ruleset = state.store.load_ruleset(&req.ruleset_id)?;

    let source_config = super::query::resolve_source_config(&state, req.source_db)?;
    let target_config = resolve_target_config(&state, req.target_db)?;

    let source = state.backend_factory.connect(&source_config).await?;
    let target = state.backend_factory.connect(&target_config).await?;

    let execution_id = id::execution_id();
    let outcome = state
        .executor
        .execute_ruleset(&ruleset, source, target, dialect, req.limit, &execution_id)
        .await?;

    let result_path = state.store.save_execution_result(&outcome)?;
    let result_path = result_path.to_string_lossy().to_string();

    let kpis = if req.compute_kpis {
        match state.kpi_service.compute_and_persist(
            &outcome,
            ruleset.rules.len(),
            Some(result_path.clone()),
        ) {
            Ok((rcr, dqcs, rei)) => Some(KpiSummary { rcr, dqcs, rei }),
            Err(e) => {
                // KPI persistence problems never fail the execution response
                tracing::error!("KPI computation failed for {}: {}", execution_id, e);
                None
            },
        }
    } else {
        None
    };

    Ok(Json(ExecuteReconciliationResponse { outcome, result_path, kpis }))
}

fn resolve_target_config(
    state: &AppState,
    from_request: Option<DbConnectionConfig>,
) -> Result<DbConnectionConfig, ApiError> {
    if let Some(config) = from_request {
        return Ok(config);
    }
    if state.config.databases.use_env_configs
        && let Some(config) = state.config.databases.target.clone()
    {
        return Ok(config);
    }
    Err(ApiError::validation_error(
        "No target database config: provide target_db or set USE_ENV_DB_CONFIGS with TARGET_DB_*",
    ))
}
