//! Execution artifacts: generated SQL, per-rule errors, outcomes, NL query
//! results. Artifacts are immutable once produced and persisted as
//! timestamped JSON files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::intent::{Operation, QueryFilter, QueryType};

/// A result row as column -> value map.
pub type Row = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReconQueryType {
    Matched,
    UnmatchedSource,
    UnmatchedTarget,
}

impl ReconQueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Matched => "MATCHED",
            Self::UnmatchedSource => "UNMATCHED_SOURCE",
            Self::UnmatchedTarget => "UNMATCHED_TARGET",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GeneratedSql {
    pub rule_id: String,
    pub rule_name: String,
    pub query_type: ReconQueryType,
    pub source_sql: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_sql: Option<String>,
    pub description: String,
}

/// Per-rule match statistics, carried on the outcome so KPI computation can
/// weight confidences without consulting any store.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RuleMatchStat {
    pub rule_id: String,
    pub rule_name: String,
    pub matched_count: usize,
    pub rule_confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RuleError {
    pub rule_id: String,
    pub rule_name: String,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExecutionOutcome {
    pub ruleset_id: String,
    pub execution_id: String,
    pub execution_timestamp: DateTime<Utc>,
    pub matched_count: usize,
    pub unmatched_source_count: usize,
    pub unmatched_target_count: usize,
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub matched_records: Vec<Row>,
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub unmatched_source: Vec<Row>,
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub unmatched_target: Vec<Row>,
    pub execution_time_ms: u64,
    pub generated_sql: Vec<GeneratedSql>,
    #[serde(default)]
    pub rule_match_stats: Vec<RuleMatchStat>,
    #[serde(default)]
    pub rule_errors: Vec<RuleError>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QueryResult {
    pub definition: String,
    pub query_type: QueryType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,
    pub sql: String,
    pub record_count: usize,
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub records: Vec<Row>,
    #[serde(default)]
    #[schema(value_type = Vec<Vec<String>>)]
    pub join_columns: Vec<(String, String)>,
    #[serde(default)]
    pub filters: Vec<QueryFilter>,
    pub source_table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_table: Option<String>,
    pub confidence: f64,
    pub execution_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
