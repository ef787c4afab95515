//! Intent Parsing Scenario
//!
//! NL definition -> structured query intent candidate. The deterministic
//! parser validates and completes whatever comes back.

use serde::{Deserialize, Serialize};

use super::content_hash;
use crate::services::llm::models::LlmScenario;
use crate::services::llm::service::LlmRequest;

const PROMPT: &str = include_str!("intent_prompt.md");

#[derive(Debug, Clone, Serialize)]
pub struct IntentParsingRequest {
    pub definition: String,
    pub tables: Vec<TableWithAliases>,
    pub stop_words: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableWithAliases {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl LlmRequest for IntentParsingRequest {
    fn scenario(&self) -> LlmScenario {
        LlmScenario::IntentParsing
    }

    fn system_prompt(&self) -> String {
        PROMPT.into()
    }

    fn cache_key(&self) -> String {
        let tables: Vec<&str> = self.tables.iter().map(|t| t.name.as_str()).collect();
        content_hash(&[&self.definition, &tables.join(",")])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IntentParsingResponse {
    #[serde(default)]
    pub query_type: String,
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub source_table: Option<String>,
    #[serde(default)]
    pub target_table: Option<String>,
    #[serde(default)]
    pub filters: Vec<LlmFilter>,
    #[serde(default)]
    pub additional_columns: Vec<LlmAdditionalColumn>,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmFilter {
    #[serde(default)]
    pub column: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub table: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmAdditionalColumn {
    #[serde(default)]
    pub table: String,
    #[serde(default)]
    pub column: String,
}
