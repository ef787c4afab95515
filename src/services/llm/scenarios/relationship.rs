//! Relationship Extraction Scenario
//!
//! Turns a free-form relationship statement into structured edges.

use serde::{Deserialize, Serialize};

use super::{SchemaDigest, content_hash};
use crate::services::llm::models::LlmScenario;
use crate::services::llm::service::LlmRequest;

const PROMPT: &str = include_str!("relationship_prompt.md");

#[derive(Debug, Clone, Serialize)]
pub struct RelationshipExtractionRequest {
    pub statement: String,
    pub valid_tables: Vec<String>,
    pub schemas: Vec<SchemaDigest>,
    pub excluded_words: Vec<String>,
    pub min_confidence: f64,
}

impl LlmRequest for RelationshipExtractionRequest {
    fn scenario(&self) -> LlmScenario {
        LlmScenario::RelationshipExtraction
    }

    fn system_prompt(&self) -> String {
        PROMPT.into()
    }

    fn cache_key(&self) -> String {
        content_hash(&[&self.statement, &self.valid_tables.join(",")])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RelationshipExtractionResponse {
    #[serde(default)]
    pub relationships: Vec<ExtractedRelationship>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedRelationship {
    #[serde(default)]
    pub source_table: String,
    #[serde(default)]
    pub source_column: String,
    #[serde(default)]
    pub target_table: String,
    #[serde(default)]
    pub target_column: String,
    #[serde(default = "default_relationship_type")]
    pub relationship_type: String,
    #[serde(default)]
    pub cardinality: Option<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: Option<String>,
}

fn default_relationship_type() -> String {
    "RELATED_TO".to_string()
}

fn default_confidence() -> f64 {
    0.7
}
