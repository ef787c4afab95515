pub mod graph;
pub mod kpi;
pub mod llm;
pub mod query;
pub mod reconciliation;
pub mod rules;
