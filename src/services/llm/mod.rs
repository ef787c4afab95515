//! LLM Service Module
//!
//! Provides LLM-enhanced analysis for the reconciliation pipeline. Every
//! scenario degrades to a deterministic fallback in its calling service, so
//! nothing in here is load-bearing for correctness - only for quality.
//!
//! # Supported Scenarios
//! - Relationship extraction (NL statement -> structured edges)
//! - Alias learning (table -> business-friendly names)
//! - Rule generation (schema + KG -> reconciliation rule suggestions)
//! - Intent parsing (NL definition -> query intent candidate)

mod client;
mod models;
mod scenarios;
mod service;

pub use models::{LLMError, LlmScenario, LlmStatus};
pub use scenarios::alias::{AliasLearningRequest, AliasLearningResponse};
pub use scenarios::intent::{
    IntentParsingRequest, IntentParsingResponse, LlmAdditionalColumn, LlmFilter, TableWithAliases,
};
pub use scenarios::relationship::{
    ExtractedRelationship, RelationshipExtractionRequest, RelationshipExtractionResponse,
};
pub use scenarios::rules::{
    EdgeDigest, RuleGenerationRequest, RuleGenerationResponse, SuggestedRule,
};
pub use scenarios::{SchemaDigest, TableDigest};
pub use service::{LlmRequest, LlmService};

#[allow(unused_imports)]
pub(crate) use client::LlmClient;
