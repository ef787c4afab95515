//! KPI documents: RCR, DQCS and REI.
//!
//! All three carry the `{ruleset_id, execution_id, timestamp, lineage}`
//! header so drill-down can walk from a KPI number back to the execution
//! artifacts it was computed from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::execution::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum CoverageStatus {
    Healthy,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceStatus {
    Good,
    Acceptable,
    Poor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum KpiKind {
    Rcr,
    Dqcs,
    Rei,
}

impl KpiKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rcr => "rcr",
            Self::Dqcs => "dqcs",
            Self::Rei => "rei",
        }
    }
}

/// Shared KPI document header.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct KpiHeader {
    pub kpi_id: String,
    pub ruleset_id: String,
    pub execution_id: String,
    pub timestamp: DateTime<Utc>,
    /// Paths / ids of the artifacts this KPI was derived from
    #[serde(default)]
    pub lineage: Vec<String>,
}

/// Reconciliation Coverage Rate
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RcrKpi {
    #[serde(flatten)]
    pub header: KpiHeader,
    pub coverage_rate: f64,
    pub matched_count: usize,
    pub total_source_count: usize,
    pub status: CoverageStatus,
}

/// Data Quality Confidence Score
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DqcsKpi {
    #[serde(flatten)]
    pub header: KpiHeader,
    pub overall_confidence_score: f64,
    pub high_confidence_count: usize,
    pub medium_confidence_count: usize,
    pub low_confidence_count: usize,
    pub status: ConfidenceStatus,
}

/// Reconciliation Efficiency Index
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReiKpi {
    #[serde(flatten)]
    pub header: KpiHeader,
    pub efficiency_index: f64,
    pub match_success_rate: f64,
    pub rule_utilization: f64,
    pub speed_factor: f64,
}

/// Configured KPI definition, persisted under `kpi_configs/`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct KpiConfig {
    pub kpi_id: String,
    pub name: String,
    pub kind: KpiKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

/// Drill-down evidence attached to a KPI computation, persisted under
/// `kpi_evidence/`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct KpiEvidence {
    pub kpi_id: String,
    pub ruleset_id: String,
    pub execution_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub sample_matched: Vec<Row>,
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub sample_unmatched_source: Vec<Row>,
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub sample_unmatched_target: Vec<Row>,
    #[serde(default)]
    pub generated_sql: Vec<String>,
}
