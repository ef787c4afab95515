//! Alias Learning Scenario
//!
//! Learns business-friendly aliases for one table at a time.

use serde::{Deserialize, Serialize};

use super::content_hash;
use crate::services::llm::models::LlmScenario;
use crate::services::llm::service::LlmRequest;

const PROMPT: &str = include_str!("alias_prompt.md");

#[derive(Debug, Clone, Serialize)]
pub struct AliasLearningRequest {
    pub table_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub columns: Vec<String>,
}

impl LlmRequest for AliasLearningRequest {
    fn scenario(&self) -> LlmScenario {
        LlmScenario::AliasLearning
    }

    fn system_prompt(&self) -> String {
        PROMPT.into()
    }

    fn cache_key(&self) -> String {
        content_hash(&[&self.table_name])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AliasLearningResponse {
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub confidence: f64,
}
