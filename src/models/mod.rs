pub mod execution;
pub mod graph;
pub mod intent;
pub mod kpi;
pub mod rule;
pub mod schema;

pub use execution::{
    ExecutionOutcome, GeneratedSql, QueryResult, ReconQueryType, Row, RuleError, RuleMatchStat,
};
pub use graph::{
    GraphMetadata, GraphNode, GraphRelationship, GraphStatistics, KnowledgeGraph, NodeKind,
    REL_CROSS_SCHEMA, REL_REFERENCES, RelationshipOrigin, table_node_id,
};
pub use intent::{AdditionalColumn, Operation, QueryFilter, QueryIntent, QueryType};
pub use kpi::{
    ConfidenceStatus, CoverageStatus, DqcsKpi, KpiConfig, KpiEvidence, KpiHeader, KpiKind, RcrKpi,
    ReiKpi,
};
pub use rule::{FieldPreference, MatchType, ReconciliationRule, Ruleset, ValidationStatus};
pub use schema::{Column, ForeignKey, Schema, Table};
