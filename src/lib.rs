//! Tessera Library
//!
//! Data reconciliation and analytics engine over a schema-derived knowledge
//! graph: schema ingestion and merging, NL relationship and alias
//! integration, reconciliation rule generation, NL-to-SQL translation, and
//! execution with KPI computation.

use std::sync::Arc;

pub mod config;
pub mod handlers;
pub mod models;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use services::llm::{LLMError, LlmService, LlmStatus};
pub use services::{
    AliasLearner, BackendFactory, Executor, FileStore, GraphBuilder, GraphService, KpiService,
    MySqlPoolManager, NlRelationshipParser, QueryParser, QueryService, RuleGenerator, SchemaStore,
};
pub use utils::{ApiError, ApiResult, EngineError, EngineResult};

/// Application shared state
///
/// Design Philosophy: Keep it simple - Rust's type system IS our DI
/// container. All services are wrapped in Arc for cheap cloning and thread
/// safety.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,

    pub schema_store: Arc<SchemaStore>,
    pub store: Arc<FileStore>,

    pub graph_service: Arc<GraphService>,
    pub nl_parser: Arc<NlRelationshipParser>,
    pub rule_generator: Arc<RuleGenerator>,
    pub query_service: Arc<QueryService>,

    pub executor: Arc<Executor>,
    pub backend_factory: Arc<BackendFactory>,
    pub kpi_service: Arc<KpiService>,

    pub llm_service: Arc<LlmService>,
}

#[cfg(test)]
mod tests;
