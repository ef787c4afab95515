//! Rule Generation Scenario
//!
//! LLM enrichment pass over the pattern-generated reconciliation rules.

use serde::{Deserialize, Serialize};

use super::{SchemaDigest, content_hash};
use crate::models::FieldPreference;
use crate::services::llm::models::LlmScenario;
use crate::services::llm::service::LlmRequest;

const PROMPT: &str = include_str!("rules_prompt.md");

#[derive(Debug, Clone, Serialize)]
pub struct RuleGenerationRequest {
    pub schemas: Vec<SchemaDigest>,
    pub cross_schema_edges: Vec<EdgeDigest>,
    pub field_preferences: Vec<FieldPreference>,
    pub single_schema: bool,
    pub min_confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeDigest {
    pub source_table: String,
    #[serde(default)]
    pub source_column: Option<String>,
    pub target_table: String,
    #[serde(default)]
    pub target_column: Option<String>,
    pub confidence: f64,
}

impl LlmRequest for RuleGenerationRequest {
    fn scenario(&self) -> LlmScenario {
        LlmScenario::RuleGeneration
    }

    fn system_prompt(&self) -> String {
        PROMPT.into()
    }

    fn cache_key(&self) -> String {
        let schema_names: Vec<&str> = self.schemas.iter().map(|s| s.name.as_str()).collect();
        let pref_tables: Vec<&str> =
            self.field_preferences.iter().map(|p| p.table.as_str()).collect();
        content_hash(&[
            &schema_names.join(","),
            &pref_tables.join(","),
            &format!("{}", self.cross_schema_edges.len()),
        ])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RuleGenerationResponse {
    #[serde(default)]
    pub rules: Vec<SuggestedRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestedRule {
    #[serde(default)]
    pub rule_name: String,
    #[serde(default)]
    pub source_schema: String,
    #[serde(default)]
    pub source_table: String,
    #[serde(default)]
    pub source_columns: Vec<String>,
    #[serde(default)]
    pub target_schema: String,
    #[serde(default)]
    pub target_table: String,
    #[serde(default)]
    pub target_columns: Vec<String>,
    #[serde(default = "default_match_type")]
    pub match_type: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
}

fn default_match_type() -> String {
    "exact".to_string()
}

fn default_confidence() -> f64 {
    0.7
}
