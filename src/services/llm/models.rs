//! LLM data models and errors.

use serde::{Deserialize, Serialize};

/// LLM analysis scenario type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmScenario {
    /// Free-form relationship statement -> structured edges
    RelationshipExtraction,
    /// Table alias learning
    AliasLearning,
    /// Reconciliation rule enrichment
    RuleGeneration,
    /// NL definition -> query intent
    IntentParsing,
}

impl LlmScenario {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RelationshipExtraction => "relationship_extraction",
            Self::AliasLearning => "alias_learning",
            Self::RuleGeneration => "rule_generation",
            Self::IntentParsing => "intent_parsing",
        }
    }
}

/// Status info for the LLM surface (no secrets).
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct LlmStatus {
    pub enabled: bool,
    pub configured: bool,
    pub model: String,
    pub api_base: String,
}

/// LLM service errors
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("LLM service disabled")]
    Disabled,

    #[error("LLM API key not configured")]
    NotConfigured,

    #[error("LLM API error: {0}")]
    ApiError(String),

    #[error("LLM response parsing error: {0}")]
    ParseError(String),

    #[error("LLM timeout after {0}s")]
    Timeout(u64),

    #[error("LLM rate limited, retry after {0}s")]
    RateLimited(u64),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl LLMError {
    /// Every LLM failure is recoverable for the engine: callers degrade to
    /// the deterministic path and annotate the response.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::RateLimited(_) | Self::ApiError(_))
    }
}
