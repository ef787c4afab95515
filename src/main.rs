use axum::{
    Router,
    routing::{delete, get, post},
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tessera::config::Config;
use tessera::services::{
    AliasLearner, BackendFactory, Executor, FileStore, GraphBuilder, GraphService, KpiService,
    LlmService, MySqlPoolManager, NlRelationshipParser, QueryParser, QueryService, RuleGenerator,
    SchemaStore,
};
use tessera::{AppState, handlers, models};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::graph::build_graph,
        handlers::graph::list_graphs,
        handlers::graph::get_graph,
        handlers::graph::delete_graph,
        handlers::graph::get_statistics,
        handlers::graph::add_relationships,
        handlers::graph::get_aliases,
        handlers::graph::learn_aliases,

        handlers::rules::generate_rules,
        handlers::rules::list_rulesets,
        handlers::rules::get_ruleset,

        handlers::query::translate,
        handlers::query::execute_queries,

        handlers::reconciliation::execute_reconciliation,

        handlers::kpi::create_kpi_config,
        handlers::kpi::get_kpi_config,
        handlers::kpi::compute_kpis,

        handlers::llm::get_status,
    ),
    components(
        schemas(
            models::Schema,
            models::Table,
            models::Column,
            models::ForeignKey,
            models::GraphNode,
            models::GraphRelationship,
            models::GraphStatistics,
            models::GraphMetadata,
            models::KnowledgeGraph,
            models::NodeKind,
            models::RelationshipOrigin,
            models::ReconciliationRule,
            models::Ruleset,
            models::FieldPreference,
            models::MatchType,
            models::ValidationStatus,
            models::QueryIntent,
            models::QueryType,
            models::Operation,
            models::QueryFilter,
            models::AdditionalColumn,
            models::QueryResult,
            models::ExecutionOutcome,
            models::GeneratedSql,
            models::RuleMatchStat,
            models::RuleError,
            models::ReconQueryType,
            models::RcrKpi,
            models::DqcsKpi,
            models::ReiKpi,
            models::KpiHeader,
            models::KpiConfig,
            models::KpiEvidence,
            models::KpiKind,
            models::CoverageStatus,
            models::ConfidenceStatus,
        )
    ),
    tags(
        (name = "Knowledge Graph", description = "Schema ingestion and graph management"),
        (name = "Rules", description = "Reconciliation rule generation"),
        (name = "Queries", description = "Natural language query pipeline"),
        (name = "Reconciliation", description = "Ruleset execution"),
        (name = "KPIs", description = "KPI configuration and computation"),
        (name = "LLM", description = "LLM service status"),
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    let log_filter = tracing_subscriber::EnvFilter::new(&config.logging.level);
    let registry = tracing_subscriber::registry().with(log_filter);

    if let Some(log_file) = &config.logging.file {
        let log_path = std::path::Path::new(log_file);
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let log_dir = log_path.parent().and_then(|p| p.to_str()).unwrap_or("logs");
        let file_name = log_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("tessera.log");
        let file_prefix = file_name.strip_suffix(".log").unwrap_or(file_name);

        let file_appender = tracing_appender::rolling::daily(log_dir, file_prefix);
        let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
            .with(tracing_subscriber::fmt::layer())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
    tracing::info!("Tessera starting up");
    tracing::info!("Configuration loaded successfully");

    let store = Arc::new(FileStore::new(
        config.storage.root_dir.clone(),
        config.storage.result_dir.clone(),
    ));
    let schema_store = Arc::new(SchemaStore::new(config.storage.schema_dir.clone()));

    let llm_service = Arc::new(LlmService::new(config.llm.clone()));
    tracing::info!(
        "LLM service initialized (enabled: {}, model: {})",
        config.llm.enabled,
        config.llm.model
    );

    let alias_learner = Arc::new(AliasLearner::new(Arc::clone(&llm_service)));
    let graph_service = Arc::new(GraphService::new(
        Arc::clone(&store),
        GraphBuilder::new(Arc::clone(&alias_learner)),
        Arc::clone(&alias_learner),
    ));

    let nl_parser = Arc::new(NlRelationshipParser::new(Arc::clone(&llm_service)));
    let rule_generator = Arc::new(RuleGenerator::new(Arc::clone(&llm_service)));

    let pool_manager = Arc::new(MySqlPoolManager::new(config.engine.db_pool_size));
    let backend_factory = Arc::new(BackendFactory::new(Arc::clone(&pool_manager)));

    let executor = Arc::new(Executor::new(
        config.engine.worker_pool_size,
        Duration::from_secs(config.engine.query_timeout_secs),
        config.engine.default_record_limit,
    ));

    let query_service = Arc::new(QueryService::new(
        QueryParser::new(Arc::clone(&llm_service)),
        Arc::clone(&executor),
        config.engine.worker_pool_size,
    ));

    let kpi_service = Arc::new(KpiService::new(Arc::clone(&store)));

    let app_state = Arc::new(AppState {
        config: config.clone(),
        schema_store,
        store,
        graph_service,
        nl_parser,
        rule_generator,
        query_service,
        executor,
        backend_factory,
        kpi_service,
        llm_service,
    });

    let api_routes = Router::new()
        .route("/api/graphs/build", post(handlers::graph::build_graph))
        .route("/api/graphs", get(handlers::graph::list_graphs))
        .route(
            "/api/graphs/:name",
            get(handlers::graph::get_graph).delete(handlers::graph::delete_graph),
        )
        .route("/api/graphs/:name/statistics", get(handlers::graph::get_statistics))
        .route("/api/graphs/:name/relationships", post(handlers::graph::add_relationships))
        .route("/api/graphs/:name/aliases", get(handlers::graph::get_aliases))
        .route("/api/graphs/:name/aliases/learn", post(handlers::graph::learn_aliases))
        .route("/api/rules/generate", post(handlers::rules::generate_rules))
        .route("/api/rules", get(handlers::rules::list_rulesets))
        .route("/api/rules/:ruleset_id", get(handlers::rules::get_ruleset))
        .route("/api/queries/translate", post(handlers::query::translate))
        .route("/api/queries/execute", post(handlers::query::execute_queries))
        .route(
            "/api/reconciliation/execute",
            post(handlers::reconciliation::execute_reconciliation),
        )
        .route("/api/kpi/configs", post(handlers::kpi::create_kpi_config))
        .route("/api/kpi/configs/:kpi_id", get(handlers::kpi::get_kpi_config))
        .route("/api/kpi/compute", post(handlers::kpi::compute_kpis))
        .route("/api/llm/status", get(handlers::llm::get_status))
        .with_state(Arc::clone(&app_state));

    let health_routes = Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check));

    let app = Router::new()
        .merge(SwaggerUi::new("/api-docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_routes)
        .merge(health_routes)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("API documentation available at http://{}/api-docs", addr);
    tracing::info!("Tessera is ready to serve requests");

    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn ready_check() -> &'static str {
    "READY"
}
