//! NL Query Classifier & Parser
//!
//! Classifies a business definition (comparison / filter / aggregation /
//! data) and extracts a typed `QueryIntent`: source/target tables resolved
//! through learned aliases, join columns from the KG, filters and additional
//! projected columns. LLM-assisted with a deterministic extractor fallback.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;

use crate::models::{
    AdditionalColumn, KnowledgeGraph, Operation, QueryFilter, QueryIntent, QueryType,
};
use crate::services::alias::resolve_table;
use crate::services::join_planner::{find_join_path, join_condition};
use crate::services::llm::{
    IntentParsingRequest, IntentParsingResponse, LlmService, TableWithAliases,
};
use crate::utils::{EngineError, EngineResult};

/// Tokens that must never be returned as table candidates.
pub static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "show", "me", "all", "the", "which", "are", "is", "a", "an", "and", "or", "not", "active",
        "inactive", "status", "where", "that", "this", "from", "to", "for", "with", "by", "on",
        "at", "of", "find", "get", "list", "display", "retrieve", "fetch", "select", "give",
        "compare", "difference", "missing", "mismatch", "unmatched", "count", "sum", "average",
        "total", "in", "products", "product", "data", "records", "items", "entries", "include",
        "rows", "values", "between", "group", "per", "each",
    ]
    .into_iter()
    .collect()
});

static FILTER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b([A-Za-z_][A-Za-z0-9_]*)\s*=\s*'([^']*)'").expect("valid regex")
});

static ADDITIONAL_COLUMN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\binclude\s+([A-Za-z_][A-Za-z0-9_]*)\s+from\s+([A-Za-z0-9_ ]+?)(?:,|\s+and\b|\s+include\b|$)")
        .expect("valid regex")
});

static GROUP_BY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bgroup\s+by\s+([A-Za-z_][A-Za-z0-9_]*)").expect("valid regex"));

/// Rule-based classification over case-insensitive token sets.
pub fn classify(text: &str) -> (QueryType, Option<Operation>) {
    let lower = text.to_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .collect();
    let has = |word: &str| tokens.contains(&word);
    let has_phrase = |phrase: &str| lower.contains(phrase);

    // comparison keywords take priority: a comparison may carry filters
    let comparison = has("in")
        || has("missing")
        || has("mismatch")
        || has("unmatched")
        || has("difference");
    if comparison {
        let operation = if has_phrase("not in") { Operation::NotIn } else { Operation::In };
        return (QueryType::ComparisonQuery, Some(operation));
    }

    if has("count") || has("sum") || has("average") || has("total") || has_phrase("group by")
        || has("statistics")
    {
        let operation = if has("count") {
            Operation::Count
        } else if has("sum") || has("total") {
            Operation::Sum
        } else if has("average") {
            Operation::Avg
        } else {
            Operation::Aggregate
        };
        return (QueryType::AggregationQuery, Some(operation));
    }

    if has("where") || has("with") || has("active") || has("inactive") || has("status") {
        let operation = if has_phrase("contains") { Operation::Contains } else { Operation::Equals };
        return (QueryType::FilterQuery, Some(operation));
    }

    (QueryType::DataQuery, None)
}

pub struct QueryParser {
    llm: Arc<LlmService>,
}

impl QueryParser {
    pub fn new(llm: Arc<LlmService>) -> Self {
        Self { llm }
    }

    /// Parse a definition into a `QueryIntent` over the given KG.
    ///
    /// Fails with `InvalidRequest` when no source table can be resolved and
    /// with `NoJoinPath` when a comparison query's tables share no KG edge.
    pub async fn parse(
        &self,
        text: &str,
        kg: &KnowledgeGraph,
        use_llm: bool,
        limit: Option<u32>,
    ) -> EngineResult<QueryIntent> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EngineError::InvalidRequest("Empty definition".to_string()));
        }

        let (query_type, operation) = classify(text);

        let mut llm_used = false;
        let mut source: Option<String> = None;
        let mut target: Option<String> = None;
        let mut llm_filters: Vec<QueryFilter> = Vec::new();
        let mut llm_additional: Vec<(String, String)> = Vec::new();

        if use_llm && self.llm.is_enabled() {
            match self.parse_with_llm(text, kg).await {
                Ok(response) => {
                    llm_used = true;
                    source = response
                        .source_table
                        .as_deref()
                        .and_then(|t| resolve_candidate(kg, t));
                    target = response
                        .target_table
                        .as_deref()
                        .and_then(|t| resolve_candidate(kg, t));
                    for f in response.filters {
                        if !f.column.is_empty() {
                            llm_filters.push(QueryFilter {
                                column: f.column,
                                value: f.value,
                                table_hint: f.table.and_then(|t| resolve_table(kg, &t)),
                                comparator: Some("=".to_string()),
                            });
                        }
                    }
                    for col in response.additional_columns {
                        if !col.table.is_empty() && !col.column.is_empty() {
                            llm_additional.push((col.table, col.column));
                        }
                    }
                },
                Err(e) => {
                    tracing::warn!("LLM intent parsing failed, using heuristics: {}", e);
                },
            }
        }

        // heuristic extraction fills whatever the LLM did not provide
        if source.is_none() || (target.is_none() && query_type == QueryType::ComparisonQuery) {
            let candidates = extract_table_candidates(text, kg);
            let mut it = candidates.into_iter();
            if source.is_none() {
                source = it.next();
            }
            if target.is_none() {
                target = it.find(|t| Some(t) != source.as_ref());
            }
        }

        let Some(source_table) = source else {
            return Err(EngineError::InvalidRequest(format!(
                "Could not resolve a source table from definition '{}'",
                text
            )));
        };
        if target.as_deref() == Some(source_table.as_str()) {
            target = None;
        }

        let mut intent = QueryIntent::new(query_type, source_table.clone(), text);
        intent.operation = operation;
        intent.target_table = target.clone();
        intent.limit = limit;
        intent.group_by = GROUP_BY_RE
            .captures(text)
            .map(|cap| cap[1].to_string());

        // join columns: comparison queries must have a real KG join
        let mut join_found = false;
        if query_type == QueryType::ComparisonQuery {
            let Some(target_table) = target.clone() else {
                return Err(EngineError::InvalidRequest(format!(
                    "Comparison definition needs both tables: '{}'",
                    text
                )));
            };
            let Some((src_col, tgt_col)) = join_condition(kg, &source_table, &target_table)
            else {
                return Err(EngineError::NoJoinPath {
                    source_table,
                    target: target_table,
                });
            };
            intent.join_columns.push((src_col, tgt_col));
            join_found = true;
        } else if let Some(target_table) = &target
            && let Some(pair) = join_condition(kg, &source_table, target_table)
        {
            intent.join_columns.push(pair);
            join_found = true;
        }

        // filters: prefer LLM output, complete with deterministic extraction
        intent.filters = if llm_filters.is_empty() {
            extract_filters(text, &intent)
        } else {
            llm_filters
        };

        // additional projected columns with planner-computed join paths
        let mut additional = parse_additional_columns(text, kg);
        for (table, column) in llm_additional {
            if let Some(label) = resolve_table(kg, &table)
                && !additional
                    .iter()
                    .any(|(t, c): &(String, String)| *t == label && c.eq_ignore_ascii_case(&column))
            {
                additional.push((label, column));
            }
        }
        for (table, column) in additional {
            let join_path = find_join_path(kg, &source_table, &table);
            if join_path.is_empty() {
                tracing::warn!(
                    "No join path from '{}' to '{}' for additional column '{}'",
                    source_table,
                    table,
                    column
                );
            } else {
                join_found = true;
            }
            let alias = format!("{}_{}", table, column);
            intent.additional_columns.push(AdditionalColumn {
                table,
                column_name: column,
                alias: Some(alias),
                join_path,
            });
        }

        // confidence: base + LLM bonus + resolved endpoints + join path
        let mut confidence: f64 = 0.6;
        if llm_used {
            confidence += 0.15;
        }
        confidence += 0.05; // source resolved
        if intent.target_table.is_some() {
            confidence += 0.05;
        }
        if join_found {
            confidence += 0.1;
        }
        intent.confidence = confidence.min(0.95);

        Ok(intent)
    }

    async fn parse_with_llm(
        &self,
        text: &str,
        kg: &KnowledgeGraph,
    ) -> Result<IntentParsingResponse, crate::services::llm::LLMError> {
        let tables: Vec<TableWithAliases> = kg
            .table_labels()
            .into_iter()
            .map(|name| {
                let aliases = kg.table_aliases.get(&name).cloned().unwrap_or_default();
                TableWithAliases { name, aliases }
            })
            .collect();
        let request = IntentParsingRequest {
            definition: text.to_string(),
            tables,
            stop_words: STOP_WORDS.iter().map(|w| w.to_string()).collect(),
        };
        self.llm.analyze(&request).await
    }
}

/// Resolve an LLM-returned table candidate, dropping stop-words defensively.
fn resolve_candidate(kg: &KnowledgeGraph, term: &str) -> Option<String> {
    if STOP_WORDS.contains(term.to_lowercase().as_str()) {
        return None;
    }
    resolve_table(kg, term)
}

/// Heuristic table extraction: strip filter/include phrases, then resolve
/// runs of non-stopword tokens against labels and aliases.
fn extract_table_candidates(text: &str, kg: &KnowledgeGraph) -> Vec<String> {
    let mut cleaned = ADDITIONAL_COLUMN_RE.replace_all(text, " ").to_string();
    cleaned = FILTER_RE.replace_all(&cleaned, " ").to_string();

    let tokens: Vec<&str> = cleaned
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .collect();

    // group consecutive non-stopword tokens into candidate phrases
    let mut phrases: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for token in tokens {
        if STOP_WORDS.contains(token.to_lowercase().as_str()) {
            if !current.is_empty() {
                phrases.push(std::mem::take(&mut current));
            }
        } else {
            current.push(token);
        }
    }
    if !current.is_empty() {
        phrases.push(current);
    }

    let mut resolved: Vec<String> = Vec::new();
    let mut push_unique = |label: Option<String>, resolved: &mut Vec<String>| {
        if let Some(label) = label
            && !resolved.contains(&label)
        {
            resolved.push(label);
        }
    };

    for phrase in phrases {
        let joined = phrase.join(" ");
        if let Some(label) = resolve_table(kg, &joined) {
            push_unique(Some(label), &mut resolved);
            continue;
        }
        // fall back to individual tokens of an unresolved phrase
        for token in phrase {
            push_unique(resolve_table(kg, token), &mut resolved);
        }
    }
    resolved
}

/// Explicit `X = 'Y'` patterns plus the active/inactive shorthand. For
/// comparison queries the table hint is the target table so SQL attaches the
/// predicate to the joined side.
fn extract_filters(text: &str, intent: &QueryIntent) -> Vec<QueryFilter> {
    let mut filters = Vec::new();
    let hint_table = if intent.query_type == QueryType::ComparisonQuery {
        intent.target_table.clone()
    } else {
        Some(intent.source_table.clone())
    };

    for cap in FILTER_RE.captures_iter(text) {
        filters.push(QueryFilter {
            column: cap[1].to_string(),
            value: cap[2].to_string(),
            table_hint: hint_table.clone(),
            comparator: Some("=".to_string()),
        });
    }

    let lower = text.to_lowercase();
    let has_word = |w: &str| {
        lower
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .any(|t| t == w)
    };
    if has_word("inactive") {
        filters.push(QueryFilter {
            column: "Active_Inactive".to_string(),
            value: "Inactive".to_string(),
            table_hint: hint_table.clone(),
            comparator: Some("=".to_string()),
        });
    } else if has_word("active") {
        filters.push(QueryFilter {
            column: "Active_Inactive".to_string(),
            value: "Active".to_string(),
            table_hint: hint_table,
            comparator: Some("=".to_string()),
        });
    }

    filters
}

/// `include <col> from <table>` phrases, with `<table>` resolved through
/// aliases.
fn parse_additional_columns(text: &str, kg: &KnowledgeGraph) -> Vec<(String, String)> {
    let mut columns = Vec::new();
    for cap in ADDITIONAL_COLUMN_RE.captures_iter(text) {
        let column = cap[1].to_string();
        let table_term = cap[2].trim();
        match resolve_table(kg, table_term) {
            Some(label) => columns.push((label, column)),
            None => {
                tracing::warn!("Could not resolve table '{}' for additional column", table_term)
            },
        }
    }
    columns
}
