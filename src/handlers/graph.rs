//! Knowledge graph handlers: build, inspect, integrate NL relationships,
//! manage aliases.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use utoipa::ToSchema;
use validator::Validate;

use crate::AppState;
use crate::models::{GraphMetadata, GraphNode, GraphRelationship, GraphStatistics};
use crate::utils::{ApiError, ApiResult};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct BuildGraphRequest {
    #[validate(length(min = 1, message = "at least one schema is required"))]
    pub schemas: Vec<String>,
    #[validate(length(min = 1, message = "kg_name must not be empty"))]
    pub kg_name: String,
    #[serde(default)]
    pub use_llm: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BuildGraphResponse {
    pub kg_name: String,
    pub schemas: Vec<String>,
    pub statistics: GraphStatistics,
}

/// Build a merged knowledge graph from schema descriptors
#[utoipa::path(
    post,
    path = "/api/graphs/build",
    request_body = BuildGraphRequest,
    responses(
        (status = 201, description = "Graph built", body = BuildGraphResponse),
        (status = 404, description = "Schema not found"),
    ),
    tag = "Knowledge Graph"
)]
pub async fn build_graph(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BuildGraphRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()
        .map_err(|e| ApiError::validation_error(e.to_string()))?;

    let schemas = state.schema_store.load_many(&req.schemas).await?;
    let statistics = state
        .graph_service
        .build(&schemas, &req.kg_name, req.use_llm)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(BuildGraphResponse { kg_name: req.kg_name, schemas: req.schemas, statistics }),
    ))
}

/// List knowledge graph names
#[utoipa::path(
    get,
    path = "/api/graphs",
    responses((status = 200, description = "Graph names", body = Vec<String>)),
    tag = "Knowledge Graph"
)]
pub async fn list_graphs(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(state.graph_service.list()?))
}

/// Renderable graph view: orphan relationships are already dropped.
#[derive(Debug, Serialize, ToSchema)]
pub struct GraphView {
    pub nodes: Vec<GraphNode>,
    pub relationships: Vec<GraphRelationship>,
    pub table_aliases: BTreeMap<String, Vec<String>>,
    pub metadata: GraphMetadata,
}

/// Fetch one knowledge graph
#[utoipa::path(
    get,
    path = "/api/graphs/{name}",
    params(("name" = String, Path, description = "Graph name")),
    responses(
        (status = 200, description = "Graph document", body = GraphView),
        (status = 404, description = "Graph not found"),
    ),
    tag = "Knowledge Graph"
)]
pub async fn get_graph(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<GraphView>> {
    let kg = state.graph_service.snapshot(&name).await?;
    let relationships = kg.render_relationships().into_iter().cloned().collect();
    Ok(Json(GraphView {
        nodes: kg.nodes.clone(),
        relationships,
        table_aliases: kg.table_aliases.clone(),
        metadata: kg.metadata.clone(),
    }))
}

/// Delete a knowledge graph
#[utoipa::path(
    delete,
    path = "/api/graphs/{name}",
    params(("name" = String, Path, description = "Graph name")),
    responses(
        (status = 204, description = "Graph deleted"),
        (status = 404, description = "Graph not found"),
    ),
    tag = "Knowledge Graph"
)]
pub async fn delete_graph(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.graph_service.delete(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Graph statistics
#[utoipa::path(
    get,
    path = "/api/graphs/{name}/statistics",
    params(("name" = String, Path, description = "Graph name")),
    responses(
        (status = 200, description = "Statistics", body = GraphStatistics),
        (status = 404, description = "Graph not found"),
    ),
    tag = "Knowledge Graph"
)]
pub async fn get_statistics(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<GraphStatistics>> {
    Ok(Json(state.graph_service.statistics(&name).await?))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddRelationshipsRequest {
    #[validate(length(min = 1, message = "at least one statement is required"))]
    pub statements: Vec<String>,
    #[validate(length(min = 1, message = "at least one schema is required"))]
    pub schemas: Vec<String>,
    #[serde(default = "default_true")]
    pub use_llm: bool,
    #[serde(default = "default_min_confidence")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_confidence: f64,
    #[serde(default = "default_strategy")]
    pub strategy: String,
}

fn default_true() -> bool {
    true
}

fn default_min_confidence() -> f64 {
    0.5
}

fn default_strategy() -> String {
    "deduplicate".to_string()
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AddRelationshipsResponse {
    pub parsed: usize,
    pub added: usize,
    pub statistics: GraphStatistics,
}

/// Parse NL relationship statements and merge them into the graph
#[utoipa::path(
    post,
    path = "/api/graphs/{name}/relationships",
    params(("name" = String, Path, description = "Graph name")),
    request_body = AddRelationshipsRequest,
    responses(
        (status = 200, description = "Relationships integrated", body = AddRelationshipsResponse),
        (status = 404, description = "Graph or schema not found"),
    ),
    tag = "Knowledge Graph"
)]
pub async fn add_relationships(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(req): Json<AddRelationshipsRequest>,
) -> ApiResult<Json<AddRelationshipsResponse>> {
    req.validate()
        .map_err(|e| ApiError::validation_error(e.to_string()))?;
    let strategy = crate::services::MergeStrategy::parse(&req.strategy)?;

    let schemas = state.schema_store.load_many(&req.schemas).await?;

    let mut edges = Vec::new();
    for statement in &req.statements {
        let parsed = state
            .nl_parser
            .parse(statement, &schemas, req.use_llm, req.min_confidence)
            .await;
        edges.extend(parsed);
    }

    let parsed = edges.len();
    let (added, statistics) = state
        .graph_service
        .add_nl_relationships(&name, edges, strategy)
        .await?;

    Ok(Json(AddRelationshipsResponse { parsed, added, statistics }))
}

/// Learned table aliases
#[utoipa::path(
    get,
    path = "/api/graphs/{name}/aliases",
    params(("name" = String, Path, description = "Graph name")),
    responses(
        (status = 200, description = "Aliases per table"),
        (status = 404, description = "Graph not found"),
    ),
    tag = "Knowledge Graph"
)]
pub async fn get_aliases(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<BTreeMap<String, Vec<String>>>> {
    let kg = state.graph_service.snapshot(&name).await?;
    Ok(Json(kg.table_aliases))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LearnAliasesRequest {
    #[validate(length(min = 1, message = "at least one schema is required"))]
    pub schemas: Vec<String>,
    #[serde(default = "default_true")]
    pub use_llm: bool,
}

/// Re-run alias learning for the graph's tables
#[utoipa::path(
    post,
    path = "/api/graphs/{name}/aliases/learn",
    params(("name" = String, Path, description = "Graph name")),
    request_body = LearnAliasesRequest,
    responses(
        (status = 200, description = "Aliases learned"),
        (status = 404, description = "Graph or schema not found"),
    ),
    tag = "Knowledge Graph"
)]
pub async fn learn_aliases(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(req): Json<LearnAliasesRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    req.validate()
        .map_err(|e| ApiError::validation_error(e.to_string()))?;
    let schemas = state.schema_store.load_many(&req.schemas).await?;
    let alias_count = state
        .graph_service
        .learn_aliases(&name, &schemas, req.use_llm)
        .await?;
    Ok(Json(serde_json::json!({ "kg_name": name, "alias_count": alias_count })))
}
