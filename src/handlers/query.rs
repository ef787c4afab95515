//! NL query handlers: translate a definition to SQL, execute definition
//! batches.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use validator::Validate;

use crate::AppState;
use crate::config::DbConnectionConfig;
use crate::models::{QueryIntent, QueryResult};
use crate::services::sql_generator::Dialect;
use crate::utils::{ApiError, ApiResult};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct TranslateRequest {
    #[validate(length(min = 1, message = "definition must not be empty"))]
    pub definition: String,
    #[validate(length(min = 1, message = "kg_name must not be empty"))]
    pub kg_name: String,
    #[serde(default = "default_dialect")]
    pub dialect: String,
    #[serde(default = "default_use_llm")]
    pub use_llm: bool,
    #[serde(default)]
    pub limit: Option<u32>,
}

fn default_dialect() -> String {
    "mysql".to_string()
}

fn default_use_llm() -> bool {
    true
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TranslateResponse {
    pub intent: QueryIntent,
    pub sql: String,
}

/// Translate a business definition into SQL without executing it
#[utoipa::path(
    post,
    path = "/api/queries/translate",
    request_body = TranslateRequest,
    responses(
        (status = 200, description = "Generated SQL", body = TranslateResponse),
        (status = 400, description = "Unresolvable definition or no join path"),
        (status = 404, description = "Graph not found"),
    ),
    tag = "Queries"
)]
pub async fn translate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TranslateRequest>,
) -> ApiResult<Json<TranslateResponse>> {
    req.validate()
        .map_err(|e| ApiError::validation_error(e.to_string()))?;
    let dialect = Dialect::parse(&req.dialect)?;
    let kg = state.graph_service.snapshot(&req.kg_name).await?;

    let (intent, sql) = state
        .query_service
        .translate(&req.definition, &kg, req.use_llm, dialect, req.limit)
        .await?;

    Ok(Json(TranslateResponse { intent, sql }))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ExecuteQueriesRequest {
    #[validate(length(min = 1, message = "at least one definition is required"))]
    pub definitions: Vec<String>,
    #[validate(length(min = 1, message = "kg_name must not be empty"))]
    pub kg_name: String,
    #[serde(default = "default_dialect")]
    pub dialect: String,
    #[serde(default = "default_use_llm")]
    pub use_llm: bool,
    #[serde(default)]
    pub limit: Option<u32>,
    /// Connection for the datastore; falls back to `SOURCE_DB_*` env config
    /// when `USE_ENV_DB_CONFIGS` is set.
    #[serde(default)]
    pub source_db: Option<DbConnectionConfig>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ExecuteQueriesResponse {
    pub results: Vec<QueryResult>,
    pub succeeded: usize,
    pub failed: usize,
}

/// Execute a batch of business definitions against the source datastore.
/// Partial failure is the norm: failed definitions carry an error on their
/// result while the rest proceed.
#[utoipa::path(
    post,
    path = "/api/queries/execute",
    request_body = ExecuteQueriesRequest,
    responses(
        (status = 200, description = "Per-definition results", body = ExecuteQueriesResponse),
        (status = 400, description = "Missing connection config"),
        (status = 404, description = "Graph not found"),
    ),
    tag = "Queries"
)]
pub async fn execute_queries(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ExecuteQueriesRequest>,
) -> ApiResult<Json<ExecuteQueriesResponse>> {
    req.validate()
        .map_err(|e| ApiError::validation_error(e.to_string()))?;
    let dialect = Dialect::parse(&req.dialect)?;
    let kg = Arc::new(state.graph_service.snapshot(&req.kg_name).await?);

    let db_config = resolve_source_config(&state, req.source_db)?;
    let backend = state.backend_factory.connect(&db_config).await?;
    let schema_prefix =
        (!db_config.database.is_empty()).then(|| db_config.database.clone());

    let results = state
        .query_service
        .execute_batch(
            &req.definitions,
            kg,
            backend,
            req.use_llm,
            dialect,
            schema_prefix,
            req.limit,
        )
        .await;

    let failed = results.iter().filter(|r| r.error.is_some()).count();
    let succeeded = results.len() - failed;
    Ok(Json(ExecuteQueriesResponse { results, succeeded, failed }))
}

pub(crate) fn resolve_source_config(
    state: &AppState,
    from_request: Option<DbConnectionConfig>,
) -> Result<DbConnectionConfig, ApiError> {
    if let Some(config) = from_request {
        return Ok(config);
    }
    if state.config.databases.use_env_configs
        && let Some(config) = state.config.databases.source.clone()
    {
        return Ok(config);
    }
    Err(ApiError::validation_error(
        "No source database config: provide source_db or set USE_ENV_DB_CONFIGS with SOURCE_DB_*",
    ))
}
