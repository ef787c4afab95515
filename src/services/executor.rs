//! Executor
//!
//! Runs reconciliation rulesets (matched / unmatched_source /
//! unmatched_target per rule) and single NL queries against backends.
//! Every query is first attempted with schema-prefixed table identifiers;
//! an unknown-object failure triggers exactly one unprefixed retry. Per-rule
//! failures are recorded and never abort the batch.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::models::{
    ExecutionOutcome, GeneratedSql, ReconQueryType, ReconciliationRule, Row, RuleError,
    RuleMatchStat, Ruleset,
};
use crate::services::db::QueryBackend;
use crate::services::sql_generator::{Dialect, rule_sql};
use crate::utils::{EngineError, EngineResult, is_excluded};

/// Queue depth multiplier over the worker pool before callers get `busy`.
const HIGH_WATER_FACTOR: usize = 64;

pub struct Executor {
    worker_pool_size: usize,
    query_timeout: Duration,
    record_limit: usize,
}

impl Executor {
    pub fn new(worker_pool_size: usize, query_timeout: Duration, record_limit: usize) -> Self {
        Self { worker_pool_size, query_timeout, record_limit }
    }

    /// Execute every rule of the ruleset. Rules fan out over a bounded worker
    /// pool; results are reassembled in rule order.
    pub async fn execute_ruleset(
        &self,
        ruleset: &Ruleset,
        source: Arc<dyn QueryBackend>,
        target: Arc<dyn QueryBackend>,
        dialect: Dialect,
        limit: Option<u32>,
        execution_id: &str,
    ) -> EngineResult<ExecutionOutcome> {
        if ruleset.rules.len() > self.worker_pool_size * HIGH_WATER_FACTOR {
            return Err(EngineError::Busy(format!(
                "Ruleset has {} rules, exceeding the queue high-water mark",
                ruleset.rules.len()
            )));
        }

        let started = std::time::Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.worker_pool_size));
        let mut handles = Vec::with_capacity(ruleset.rules.len());

        for rule in ruleset.rules.clone() {
            let semaphore = Arc::clone(&semaphore);
            let source = Arc::clone(&source);
            let target = Arc::clone(&target);
            let timeout = self.query_timeout;
            let record_limit = effective_limit(limit, self.record_limit);

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                run_rule(&rule, source, target, dialect, record_limit, timeout).await
            }));
        }

        let mut outcome = ExecutionOutcome {
            ruleset_id: ruleset.ruleset_id.clone(),
            execution_id: execution_id.to_string(),
            execution_timestamp: Utc::now(),
            matched_count: 0,
            unmatched_source_count: 0,
            unmatched_target_count: 0,
            matched_records: Vec::new(),
            unmatched_source: Vec::new(),
            unmatched_target: Vec::new(),
            execution_time_ms: 0,
            generated_sql: Vec::new(),
            rule_match_stats: Vec::new(),
            rule_errors: Vec::new(),
        };

        // await in spawn order: results keep rule order
        for handle in handles {
            let rule_outcome = handle.await.map_err(|e| {
                EngineError::ExecutionError(format!("Rule execution task panicked: {}", e))
            })?;
            outcome.matched_count += rule_outcome.matched_count;
            outcome.unmatched_source_count += rule_outcome.unmatched_source_count;
            outcome.unmatched_target_count += rule_outcome.unmatched_target_count;
            merge_capped(&mut outcome.matched_records, rule_outcome.matched, self.record_limit);
            merge_capped(
                &mut outcome.unmatched_source,
                rule_outcome.unmatched_source,
                self.record_limit,
            );
            merge_capped(
                &mut outcome.unmatched_target,
                rule_outcome.unmatched_target,
                self.record_limit,
            );
            outcome.generated_sql.extend(rule_outcome.generated_sql);
            outcome.rule_match_stats.extend(rule_outcome.match_stats);
            outcome.rule_errors.extend(rule_outcome.errors);
        }

        outcome.execution_time_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            "Executed ruleset {} ({} rules): matched={}, unmatched_source={}, unmatched_target={}, errors={}, {}ms",
            ruleset.ruleset_id,
            ruleset.rules.len(),
            outcome.matched_count,
            outcome.unmatched_source_count,
            outcome.unmatched_target_count,
            outcome.rule_errors.len(),
            outcome.execution_time_ms
        );
        Ok(outcome)
    }

    /// Run one SQL with schema-prefix fallback: `first_sql` is attempted,
    /// and on an unknown-object failure `retry_sql` (unprefixed) runs
    /// exactly once. Returns the rows and the SQL that actually succeeded.
    pub async fn run_with_fallback(
        &self,
        backend: &Arc<dyn QueryBackend>,
        first_sql: &str,
        retry_sql: &str,
        query_type: &str,
        rule_name: &str,
    ) -> EngineResult<(Vec<String>, Vec<Vec<String>>, String)> {
        run_with_fallback_inner(
            backend,
            first_sql,
            retry_sql,
            query_type,
            rule_name,
            self.query_timeout,
        )
        .await
    }

    pub fn record_limit(&self) -> usize {
        self.record_limit
    }
}

fn effective_limit(limit: Option<u32>, default_limit: usize) -> usize {
    limit.map(|n| n as usize).unwrap_or(default_limit)
}

fn merge_capped(into: &mut Vec<Row>, mut rows: Vec<Row>, cap: usize) {
    let room = cap.saturating_sub(into.len());
    rows.truncate(room);
    into.append(&mut rows);
}

#[derive(Default)]
struct RuleOutcome {
    matched_count: usize,
    unmatched_source_count: usize,
    unmatched_target_count: usize,
    matched: Vec<Row>,
    unmatched_source: Vec<Row>,
    unmatched_target: Vec<Row>,
    generated_sql: Vec<GeneratedSql>,
    match_stats: Vec<RuleMatchStat>,
    errors: Vec<RuleError>,
}

async fn run_rule(
    rule: &ReconciliationRule,
    source: Arc<dyn QueryBackend>,
    target: Arc<dyn QueryBackend>,
    dialect: Dialect,
    record_limit: usize,
    timeout: Duration,
) -> RuleOutcome {
    let mut outcome = RuleOutcome::default();

    let modes = [
        (ReconQueryType::Matched, &source),
        (ReconQueryType::UnmatchedSource, &source),
        (ReconQueryType::UnmatchedTarget, &target),
    ];

    for (mode, backend) in modes {
        let prefixed = match rule_sql(rule, mode, dialect, true, None) {
            Ok(sql) => sql,
            Err(e) => {
                outcome.errors.push(rule_error(rule, &e));
                continue;
            },
        };
        let unprefixed = match rule_sql(rule, mode, dialect, false, None) {
            Ok(sql) => sql,
            Err(e) => {
                outcome.errors.push(rule_error(rule, &e));
                continue;
            },
        };

        match run_with_fallback_inner(
            backend,
            &prefixed,
            &unprefixed,
            mode.as_str(),
            &rule.rule_name,
            timeout,
        )
        .await
        {
            Ok((columns, rows, final_sql)) => {
                tracing::info!(
                    "{} query for rule '{}' returned {} rows",
                    mode.as_str(),
                    rule.rule_name,
                    rows.len()
                );
                let total = rows.len();
                let records = rows_to_records(&columns, rows, record_limit);
                match mode {
                    ReconQueryType::Matched => {
                        outcome.matched_count = total;
                        outcome.matched = records;
                        outcome.match_stats.push(RuleMatchStat {
                            rule_id: rule.rule_id.clone(),
                            rule_name: rule.rule_name.clone(),
                            matched_count: total,
                            rule_confidence: rule.confidence,
                        });
                    },
                    ReconQueryType::UnmatchedSource => {
                        outcome.unmatched_source_count = total;
                        outcome.unmatched_source = records;
                    },
                    ReconQueryType::UnmatchedTarget => {
                        outcome.unmatched_target_count = total;
                        outcome.unmatched_target = records;
                    },
                }
                outcome.generated_sql.push(GeneratedSql {
                    rule_id: rule.rule_id.clone(),
                    rule_name: rule.rule_name.clone(),
                    query_type: mode,
                    source_sql: final_sql,
                    target_sql: None,
                    description: describe_mode(mode, rule),
                });
            },
            Err(e) => {
                tracing::error!(
                    "{} query for rule '{}' failed: {}",
                    mode.as_str(),
                    rule.rule_name,
                    e
                );
                outcome.errors.push(rule_error(rule, &e));
            },
        }
    }

    outcome
}

async fn run_with_fallback_inner(
    backend: &Arc<dyn QueryBackend>,
    first_sql: &str,
    retry_sql: &str,
    query_type: &str,
    rule_name: &str,
    timeout: Duration,
) -> EngineResult<(Vec<String>, Vec<Vec<String>>, String)> {
    log_framed("FIRST", query_type, rule_name, first_sql);

    match query_with_timeout(backend, first_sql, timeout).await {
        Ok((columns, rows)) => Ok((columns, rows, first_sql.to_string())),
        Err(e) if e.is_schema_object_error() && first_sql != retry_sql => {
            tracing::warn!(
                "Schema-prefixed query failed ({}), retrying without schema prefix",
                e
            );
            log_framed("RETRY", query_type, rule_name, retry_sql);
            match query_with_timeout(backend, retry_sql, timeout).await {
                Ok((columns, rows)) => Ok((columns, rows, retry_sql.to_string())),
                Err(retry_err) => Err(EngineError::ExecutionError(format!(
                    "Both prefixed and unprefixed attempts failed: {}",
                    retry_err
                ))),
            }
        },
        Err(e) => Err(e),
    }
}

async fn query_with_timeout(
    backend: &Arc<dyn QueryBackend>,
    sql: &str,
    timeout: Duration,
) -> EngineResult<(Vec<String>, Vec<Vec<String>>)> {
    let started = std::time::Instant::now();
    match tokio::time::timeout(timeout, backend.query(sql)).await {
        Ok(result) => {
            let (columns, rows) = result?;
            tracing::info!("Query returned {} rows in {}ms", rows.len(), started.elapsed().as_millis());
            Ok((columns, rows))
        },
        Err(_) => {
            backend.close().await;
            Err(EngineError::Timeout(timeout.as_millis() as u64))
        },
    }
}

/// The framed SQL logging contract: every attempt logs a bordered record.
fn log_framed(attempt: &str, query_type: &str, rule_name: &str, sql: &str) {
    tracing::info!(
        "==== [{}] {} QUERY - Rule: {} ====\nSQL:\n{}\n====",
        attempt,
        query_type,
        rule_name,
        sql
    );
}

/// Convert raw rows into column->value maps, dropping excluded columns
/// (post-filter for `SELECT s.*` expansions) and capping at `limit`.
pub fn rows_to_records(columns: &[String], rows: Vec<Vec<String>>, limit: usize) -> Vec<Row> {
    rows.into_iter()
        .take(limit)
        .map(|row| {
            let mut record = Row::new();
            for (i, column) in columns.iter().enumerate() {
                if is_excluded(column) {
                    continue;
                }
                let value = row.get(i).cloned().unwrap_or_default();
                let value = if value == "NULL" {
                    serde_json::Value::Null
                } else {
                    serde_json::Value::String(value)
                };
                record.insert(column.clone(), value);
            }
            record
        })
        .collect()
}

fn describe_mode(mode: ReconQueryType, rule: &ReconciliationRule) -> String {
    match mode {
        ReconQueryType::Matched => format!(
            "Records of {} with a counterpart in {}",
            rule.source_table, rule.target_table
        ),
        ReconQueryType::UnmatchedSource => format!(
            "Records of {} missing from {}",
            rule.source_table, rule.target_table
        ),
        ReconQueryType::UnmatchedTarget => format!(
            "Records of {} missing from {} (executed against the target connection)",
            rule.target_table, rule.source_table
        ),
    }
}

fn rule_error(rule: &ReconciliationRule, error: &EngineError) -> RuleError {
    let kind = match error {
        EngineError::SchemaObjectNotFound(_) => "schema_object_not_found",
        EngineError::Timeout(_) => "timeout",
        EngineError::InvalidRequest(_) => "invalid_rule",
        EngineError::NoJoinPath { .. } => "no_join_path",
        _ => "execution_error",
    };
    RuleError {
        rule_id: rule.rule_id.clone(),
        rule_name: rule.rule_name.clone(),
        kind: kind.to_string(),
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MatchType, ValidationStatus};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Fake backend: maps SQL substrings to canned results or errors.
    struct FakeBackend {
        rows_by_marker: HashMap<&'static str, usize>,
        fail_prefixed: bool,
        log: Mutex<Vec<String>>,
    }

    impl FakeBackend {
        fn new(rows_by_marker: HashMap<&'static str, usize>, fail_prefixed: bool) -> Self {
            Self { rows_by_marker, fail_prefixed, log: Mutex::new(Vec::new()) }
        }

        fn executed(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl QueryBackend for FakeBackend {
        async fn query(&self, sql: &str) -> EngineResult<(Vec<String>, Vec<Vec<String>>)> {
            self.log.lock().unwrap().push(sql.to_string());
            // prefixed identifiers look like `schema`.`table`
            if self.fail_prefixed && sql.contains("`.`") {
                return Err(EngineError::SchemaObjectNotFound(
                    "Table 'newdqschema.x' doesn't exist".to_string(),
                ));
            }
            let count = self
                .rows_by_marker
                .iter()
                .find(|(marker, _)| sql.contains(**marker))
                .map(|(_, n)| *n)
                .unwrap_or(0);
            let columns = vec!["Material".to_string(), "Product_Line".to_string()];
            let rows = (0..count)
                .map(|i| vec![format!("MAT{:04}", i), "Compute".to_string()])
                .collect();
            Ok((columns, rows))
        }

        async fn close(&self) {}
    }

    fn rule() -> ReconciliationRule {
        ReconciliationRule {
            rule_id: "RULE_00000001".to_string(),
            rule_name: "material_match".to_string(),
            source_schema: "newdqschema".to_string(),
            source_table: "brz_lnd_RBP_GPU".to_string(),
            source_columns: vec!["Material".to_string()],
            target_schema: "newdqschema".to_string(),
            target_table: "hana_material_master".to_string(),
            target_columns: vec!["MATERIAL".to_string()],
            match_type: MatchType::Exact,
            confidence: 0.9,
            reasoning: String::new(),
            validation_status: ValidationStatus::Valid,
            llm_generated: false,
            created_at: Utc::now(),
        }
    }

    fn ruleset(rules: Vec<ReconciliationRule>) -> Ruleset {
        Ruleset {
            ruleset_id: "RECON_00000001".to_string(),
            name: "test".to_string(),
            kg_name: "kg".to_string(),
            schemas: vec!["newdqschema".to_string()],
            rules,
            created_at: Utc::now(),
        }
    }

    fn executor() -> Executor {
        Executor::new(4, Duration::from_secs(5), 1000)
    }

    #[tokio::test]
    async fn schema_prefix_fallback_retries_once_and_reports_unprefixed_sql() {
        // 1247 matched rows, prefixed attempts always fail
        let backend = Arc::new(FakeBackend::new(
            HashMap::from([("INNER JOIN", 1247)]),
            true,
        ));
        let source: Arc<dyn QueryBackend> = backend.clone();
        let target: Arc<dyn QueryBackend> = backend.clone();

        let outcome = executor()
            .execute_ruleset(
                &ruleset(vec![rule()]),
                source,
                target,
                Dialect::MySql,
                None,
                "EXEC_test0001",
            )
            .await
            .expect("execute");

        assert_eq!(outcome.matched_count, 1247);
        assert!(outcome.rule_errors.is_empty());

        // the recorded SQL is the unprefixed retry
        let matched_sql = outcome
            .generated_sql
            .iter()
            .find(|g| g.query_type == ReconQueryType::Matched)
            .expect("matched entry");
        assert!(!matched_sql.source_sql.contains("newdqschema"));

        // each of the 3 modes attempted prefixed then retried unprefixed
        let executed = backend.executed();
        assert_eq!(executed.len(), 6);
        assert!(executed[0].contains("`newdqschema`."));
        assert!(!executed[1].contains("`newdqschema`."));
    }

    #[tokio::test]
    async fn per_rule_errors_do_not_abort_the_batch() {
        let good = rule();
        let mut bad = rule();
        bad.rule_id = "RULE_00000002".to_string();
        bad.rule_name = "broken".to_string();
        bad.source_columns = vec![]; // invalid: empty columns

        let backend = Arc::new(FakeBackend::new(HashMap::from([("INNER JOIN", 3)]), false));
        let source: Arc<dyn QueryBackend> = backend.clone();
        let target: Arc<dyn QueryBackend> = backend;

        let outcome = executor()
            .execute_ruleset(
                &ruleset(vec![good, bad]),
                source,
                target,
                Dialect::MySql,
                None,
                "EXEC_test0002",
            )
            .await
            .expect("execute");

        assert_eq!(outcome.matched_count, 3);
        assert!(!outcome.rule_errors.is_empty());
        assert!(outcome.rule_errors.iter().all(|e| e.rule_name == "broken"));
    }

    #[tokio::test]
    async fn records_are_capped_and_post_filtered() {
        let backend = Arc::new(FakeBackend::new(HashMap::from([("INNER JOIN", 50)]), false));
        let source: Arc<dyn QueryBackend> = backend.clone();
        let target: Arc<dyn QueryBackend> = backend;

        let outcome = executor()
            .execute_ruleset(
                &ruleset(vec![rule()]),
                source,
                target,
                Dialect::MySql,
                Some(10),
                "EXEC_test0003",
            )
            .await
            .expect("execute");

        // counts reflect the real row count, records are capped by limit
        assert_eq!(outcome.matched_count, 50);
        assert_eq!(outcome.matched_records.len(), 10);
        // excluded column is post-filtered out of record maps
        for record in &outcome.matched_records {
            assert!(record.contains_key("Material"));
            assert!(!record.contains_key("Product_Line"));
        }
    }

    #[tokio::test]
    async fn null_values_map_to_json_null() {
        let records = rows_to_records(
            &["a".to_string(), "b".to_string()],
            vec![vec!["NULL".to_string(), "x".to_string()]],
            10,
        );
        assert_eq!(records[0]["a"], serde_json::Value::Null);
        assert_eq!(records[0]["b"], serde_json::Value::String("x".to_string()));
    }
}
