pub mod alias;
pub mod db;
pub mod executor;
pub mod graph_builder;
pub mod graph_service;
pub mod join_planner;
pub mod kpi;
pub mod llm;
pub mod nl_parser;
pub mod query_parser;
pub mod query_service;
pub mod rule_generator;
pub mod schema_store;
pub mod sql_generator;
pub mod storage;

pub use alias::{AliasLearner, resolve_table};
pub use db::{BackendFactory, MySqlBackend, MySqlPoolManager, QueryBackend};
pub use executor::Executor;
pub use graph_builder::GraphBuilder;
pub use graph_service::{GraphService, MergeStrategy};
pub use join_planner::{find_join_path, join_condition};
pub use kpi::{KpiInputs, KpiService, compute_dqcs, compute_rcr, compute_rei};
pub use llm::{LLMError, LlmService, LlmStatus};
pub use nl_parser::NlRelationshipParser;
pub use query_parser::{QueryParser, classify};
pub use query_service::QueryService;
pub use rule_generator::RuleGenerator;
pub use schema_store::{SchemaStore, extract_database_name};
pub use sql_generator::{Dialect, TablePrefixes, generate, generate_with_prefixes, rule_sql};
pub use storage::FileStore;
