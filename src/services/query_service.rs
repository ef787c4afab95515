//! NL Query Pipeline
//!
//! Orchestrates classify -> parse -> resolve -> plan -> generate -> execute
//! for business definitions. Single-definition flow is strictly sequential;
//! batches fan out over a bounded worker pool and results are reassembled in
//! input order. Per-definition failures are captured on the result, never
//! thrown.

use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::models::{KnowledgeGraph, QueryIntent, QueryResult};
use crate::services::db::QueryBackend;
use crate::services::executor::{Executor, rows_to_records};
use crate::services::query_parser::QueryParser;
use crate::services::sql_generator::{Dialect, TablePrefixes, generate_with_prefixes};
use crate::utils::EngineResult;

pub struct QueryService {
    parser: QueryParser,
    executor: Arc<Executor>,
    worker_pool_size: usize,
}

impl QueryService {
    pub fn new(parser: QueryParser, executor: Arc<Executor>, worker_pool_size: usize) -> Self {
        Self { parser, executor, worker_pool_size }
    }

    /// Parse a definition and generate its SQL without executing (preview).
    pub async fn translate(
        &self,
        definition: &str,
        kg: &KnowledgeGraph,
        use_llm: bool,
        dialect: Dialect,
        limit: Option<u32>,
    ) -> EngineResult<(QueryIntent, String)> {
        let intent = self.parser.parse(definition, kg, use_llm, limit).await?;
        let sql = generate_with_prefixes(&intent, dialect, kg, &TablePrefixes::new())?;
        Ok((intent, sql))
    }

    /// Full pipeline for one definition. Failures land in
    /// `QueryResult::error` so other items of a batch proceed.
    #[allow(clippy::too_many_arguments)]
    pub async fn execute_definition(
        &self,
        definition: &str,
        kg: &KnowledgeGraph,
        backend: &Arc<dyn QueryBackend>,
        use_llm: bool,
        dialect: Dialect,
        schema_prefix: Option<&str>,
        limit: Option<u32>,
    ) -> QueryResult {
        let started = std::time::Instant::now();

        let intent = match self.parser.parse(definition, kg, use_llm, limit).await {
            Ok(intent) => intent,
            Err(e) => {
                tracing::warn!("Definition '{}' failed to parse: {}", definition, e);
                return failed_result(definition, e.to_string(), started.elapsed().as_millis() as u64);
            },
        };

        let prefixes = prefixes_for(&intent, schema_prefix);
        let prefixed_sql = match generate_with_prefixes(&intent, dialect, kg, &prefixes) {
            Ok(sql) => sql,
            Err(e) => {
                return failed_result(definition, e.to_string(), started.elapsed().as_millis() as u64);
            },
        };
        let plain_sql =
            match generate_with_prefixes(&intent, dialect, kg, &TablePrefixes::new()) {
                Ok(sql) => sql,
                Err(e) => {
                    return failed_result(
                        definition,
                        e.to_string(),
                        started.elapsed().as_millis() as u64,
                    );
                },
            };

        match self
            .executor
            .run_with_fallback(backend, &prefixed_sql, &plain_sql, "NL", definition)
            .await
        {
            Ok((columns, rows, final_sql)) => {
                let record_count = rows.len();
                let cap = limit.map(|n| n as usize).unwrap_or(self.executor.record_limit());
                let records = rows_to_records(&columns, rows, cap);
                QueryResult {
                    definition: definition.to_string(),
                    query_type: intent.query_type,
                    operation: intent.operation,
                    sql: final_sql,
                    record_count,
                    records,
                    join_columns: intent.join_columns.clone(),
                    filters: intent.filters.clone(),
                    source_table: intent.source_table.clone(),
                    target_table: intent.target_table.clone(),
                    confidence: intent.confidence,
                    execution_time_ms: started.elapsed().as_millis() as u64,
                    error: None,
                }
            },
            Err(e) => {
                tracing::error!("Definition '{}' failed to execute: {}", definition, e);
                let mut result =
                    failed_result(definition, e.to_string(), started.elapsed().as_millis() as u64);
                result.query_type = intent.query_type;
                result.operation = intent.operation;
                result.sql = plain_sql;
                result.source_table = intent.source_table.clone();
                result.target_table = intent.target_table.clone();
                result.confidence = intent.confidence;
                result
            },
        }
    }

    /// Execute a batch of definitions with bounded parallelism. Results come
    /// back in input order.
    #[allow(clippy::too_many_arguments)]
    pub async fn execute_batch(
        self: &Arc<Self>,
        definitions: &[String],
        kg: Arc<KnowledgeGraph>,
        backend: Arc<dyn QueryBackend>,
        use_llm: bool,
        dialect: Dialect,
        schema_prefix: Option<String>,
        limit: Option<u32>,
    ) -> Vec<QueryResult> {
        let semaphore = Arc::new(Semaphore::new(self.worker_pool_size));
        let mut handles = Vec::with_capacity(definitions.len());

        for definition in definitions {
            let service = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            let kg = Arc::clone(&kg);
            let backend = Arc::clone(&backend);
            let definition = definition.clone();
            let schema_prefix = schema_prefix.clone();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                service
                    .execute_definition(
                        &definition,
                        &kg,
                        &backend,
                        use_llm,
                        dialect,
                        schema_prefix.as_deref(),
                        limit,
                    )
                    .await
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (i, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    tracing::error!("Definition task {} panicked: {}", i, e);
                    results.push(failed_result(
                        &definitions[i],
                        format!("internal task failure: {}", e),
                        0,
                    ));
                },
            }
        }
        results
    }
}

/// All tables of the intent share the source connection's schema prefix.
fn prefixes_for(intent: &QueryIntent, schema_prefix: Option<&str>) -> TablePrefixes {
    let mut prefixes = TablePrefixes::new();
    let Some(prefix) = schema_prefix.filter(|p| !p.is_empty()) else {
        return prefixes;
    };
    prefixes.insert(intent.source_table.to_lowercase(), prefix.to_string());
    if let Some(target) = &intent.target_table {
        prefixes.insert(target.to_lowercase(), prefix.to_string());
    }
    for col in &intent.additional_columns {
        for table in &col.join_path {
            prefixes.insert(table.to_lowercase(), prefix.to_string());
        }
    }
    prefixes
}

fn failed_result(definition: &str, error: String, elapsed_ms: u64) -> QueryResult {
    QueryResult {
        definition: definition.to_string(),
        query_type: crate::models::QueryType::DataQuery,
        operation: None,
        sql: String::new(),
        record_count: 0,
        records: Vec::new(),
        join_columns: Vec::new(),
        filters: Vec::new(),
        source_table: String::new(),
        target_table: None,
        confidence: 0.0,
        execution_time_ms: elapsed_ms,
        error: Some(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use crate::models::{GraphRelationship, RelationshipOrigin, table_node_id};
    use crate::services::llm::LlmService;
    use crate::utils::EngineError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;

    struct StaticBackend;

    #[async_trait]
    impl QueryBackend for StaticBackend {
        async fn query(&self, sql: &str) -> EngineResult<(Vec<String>, Vec<Vec<String>>)> {
            // prefixed attempt fails to exercise the fallback
            if sql.contains("`newdq`.") {
                return Err(EngineError::SchemaObjectNotFound(
                    "Unknown database 'newdq'".to_string(),
                ));
            }
            Ok((
                vec!["Material".to_string()],
                vec![vec!["MAT1".to_string()], vec!["MAT2".to_string()]],
            ))
        }

        async fn close(&self) {}
    }

    fn graph() -> KnowledgeGraph {
        let mut kg = KnowledgeGraph::new("demo", vec![]);
        kg.add_table_node("brz_lnd_RBP_GPU", HashMap::new());
        kg.add_table_node("brz_lnd_OPS_EXCEL_GPU", HashMap::new());
        kg.add_alias("brz_lnd_RBP_GPU", "RBP");
        kg.add_alias("brz_lnd_OPS_EXCEL_GPU", "OPS Excel");
        kg.add_relationship(GraphRelationship {
            source_id: table_node_id("brz_lnd_RBP_GPU"),
            target_id: table_node_id("brz_lnd_OPS_EXCEL_GPU"),
            relationship_type: "CROSS_SCHEMA_REFERENCE".to_string(),
            properties: HashMap::new(),
            source_column: Some("Material".to_string()),
            target_column: Some("PLANNING_SKU".to_string()),
            confidence: 0.9,
            origin: RelationshipOrigin::AutoDetected,
            cardinality: None,
            reasoning: None,
        });
        kg
    }

    fn service() -> Arc<QueryService> {
        let llm = Arc::new(LlmService::new(LlmConfig::default()));
        Arc::new(QueryService::new(
            QueryParser::new(llm),
            Arc::new(Executor::new(4, Duration::from_secs(5), 1000)),
            4,
        ))
    }

    #[tokio::test]
    async fn translate_produces_sql_without_executing() {
        let kg = graph();
        let (intent, sql) = service()
            .translate(
                "Show me all products in RBP which are not in OPS Excel",
                &kg,
                false,
                Dialect::MySql,
                Some(1000),
            )
            .await
            .expect("translate");
        assert_eq!(intent.source_table, "brz_lnd_RBP_GPU");
        assert!(sql.contains("LEFT JOIN"));
        assert!(sql.ends_with("LIMIT 1000"));
    }

    #[tokio::test]
    async fn execute_definition_uses_prefix_fallback() {
        let kg = graph();
        let backend: Arc<dyn QueryBackend> = Arc::new(StaticBackend);
        let result = service()
            .execute_definition(
                "Show me all products in RBP which are in OPS Excel",
                &kg,
                &backend,
                false,
                Dialect::MySql,
                Some("newdq"),
                None,
            )
            .await;

        assert!(result.error.is_none(), "unexpected error: {:?}", result.error);
        assert_eq!(result.record_count, 2);
        // the reported SQL is the unprefixed retry
        assert!(!result.sql.contains("newdq"));
    }

    #[tokio::test]
    async fn batch_results_keep_input_order_with_partial_failure() {
        let kg = Arc::new(graph());
        let backend: Arc<dyn QueryBackend> = Arc::new(StaticBackend);
        let definitions = vec![
            "Show me all products in RBP which are in OPS Excel".to_string(),
            "completely unresolvable definition".to_string(),
            "Show me all products in RBP which are not in OPS Excel".to_string(),
        ];
        let results = service()
            .execute_batch(&definitions, kg, backend, false, Dialect::MySql, None, None)
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].definition, definitions[0]);
        assert!(results[0].error.is_none());
        assert!(results[1].error.is_some());
        assert_eq!(results[2].definition, definitions[2]);
        assert!(results[2].error.is_none());
    }
}
