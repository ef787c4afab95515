//! Query intent - the typed output of NL parsing, input to SQL generation.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    ComparisonQuery,
    FilterQuery,
    AggregationQuery,
    DataQuery,
    Relationship,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    In,
    NotIn,
    Equals,
    Contains,
    Count,
    Sum,
    Avg,
    Aggregate,
}

impl Operation {
    pub fn aggregate_fn(&self) -> Option<&'static str> {
        match self {
            Self::Count => Some("COUNT"),
            Self::Sum => Some("SUM"),
            Self::Avg => Some("AVG"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QueryFilter {
    pub column: String,
    pub value: String,
    /// Table the filter should attach to; for comparison queries this is the
    /// target table so SQL places the predicate on the joined side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparator: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AdditionalColumn {
    pub table: String,
    pub column_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Ordered table labels from the source table to `table`, computed by the
    /// join planner. Empty means no path was found and the projection must be
    /// dropped (never joined with a fabricated condition).
    #[serde(default)]
    pub join_path: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QueryIntent {
    pub query_type: QueryType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,
    pub source_table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_table: Option<String>,
    /// (source column, target column) pairs for the main join
    #[serde(default)]
    #[schema(value_type = Vec<Vec<String>>)]
    pub join_columns: Vec<(String, String)>,
    #[serde(default)]
    pub filters: Vec<QueryFilter>,
    #[serde(default)]
    pub additional_columns: Vec<AdditionalColumn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    pub confidence: f64,
    pub original_text: String,
}

impl QueryIntent {
    pub fn new(query_type: QueryType, source_table: impl Into<String>, text: &str) -> Self {
        Self {
            query_type,
            operation: None,
            source_table: source_table.into(),
            target_table: None,
            join_columns: Vec::new(),
            filters: Vec::new(),
            additional_columns: Vec::new(),
            group_by: None,
            limit: None,
            confidence: 0.0,
            original_text: text.to_string(),
        }
    }
}
