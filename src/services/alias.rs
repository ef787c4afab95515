//! Alias Learner & Resolver
//!
//! Learns business-friendly aliases per table (LLM with a token-splitting
//! heuristic fallback) and resolves free-form terms back to table labels.
//! Resolution over a fixed KG state is deterministic.

use std::sync::Arc;

use crate::models::{KnowledgeGraph, Table, table_node_id};
use crate::services::llm::{AliasLearningRequest, AliasLearningResponse, LlmService};
use crate::utils::{identifier_tokens, token_similarity};

/// Confidence recorded for heuristic-derived aliases; an LLM result must beat
/// the stored value to overwrite an earlier learner's output.
const HEURISTIC_CONFIDENCE: f64 = 0.5;

/// Technical tokens stripped before deriving aliases (layer markers, object
/// kind prefixes).
const TECHNICAL_TOKENS: &[&str] = &[
    "brz", "slv", "gld", "lnd", "stg", "raw", "tmp", "ods", "dwh", "dim", "fact", "tbl", "vw",
    "src", "tgt",
];

pub struct AliasLearner {
    llm: Arc<LlmService>,
}

impl AliasLearner {
    pub fn new(llm: Arc<LlmService>) -> Self {
        Self { llm }
    }

    /// Learn aliases for `table` and store them on the graph. Existing
    /// aliases are only replaced when the new learner reports higher
    /// confidence. LLM failure is non-fatal and falls back to heuristics.
    pub async fn learn_into(&self, kg: &mut KnowledgeGraph, table: &Table, use_llm: bool) {
        let (aliases, confidence) = if use_llm && self.llm.is_enabled() {
            match self.learn_with_llm(table).await {
                Ok((aliases, confidence)) if !aliases.is_empty() => (aliases, confidence),
                Ok(_) => (heuristic_aliases(&table.name), HEURISTIC_CONFIDENCE),
                Err(e) => {
                    tracing::warn!(
                        "Alias learning via LLM failed for '{}', using heuristics: {}",
                        table.name,
                        e
                    );
                    (heuristic_aliases(&table.name), HEURISTIC_CONFIDENCE)
                },
            }
        } else {
            (heuristic_aliases(&table.name), HEURISTIC_CONFIDENCE)
        };

        let stored = stored_confidence(kg, &table.name);
        if stored >= confidence && kg.table_aliases.contains_key(&table.name) {
            tracing::debug!(
                "Keeping existing aliases for '{}' (stored confidence {:.2} >= {:.2})",
                table.name,
                stored,
                confidence
            );
            return;
        }

        kg.table_aliases.remove(&table.name);
        for alias in &aliases {
            kg.add_alias(&table.name, alias);
        }
        set_stored_confidence(kg, &table.name, confidence);
        tracing::debug!("Learned aliases for '{}': {:?}", table.name, aliases);
    }

    async fn learn_with_llm(
        &self,
        table: &Table,
    ) -> Result<(Vec<String>, f64), crate::services::llm::LLMError> {
        let request = AliasLearningRequest {
            table_name: table.name.clone(),
            description: table.description.clone(),
            columns: table.column_names(),
        };
        let response: AliasLearningResponse = self.llm.analyze(&request).await?;
        let mut aliases: Vec<String> = Vec::new();
        for alias in response.aliases {
            let alias = alias.trim().to_string();
            if alias.is_empty() || alias.eq_ignore_ascii_case(&table.name) {
                continue;
            }
            if !aliases.iter().any(|a| a.eq_ignore_ascii_case(&alias)) {
                aliases.push(alias);
            }
        }
        Ok((aliases, response.confidence.clamp(0.0, 1.0)))
    }
}

fn stored_confidence(kg: &KnowledgeGraph, table: &str) -> f64 {
    kg.node(&table_node_id(table))
        .and_then(|n| n.properties.get("alias_confidence"))
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0)
}

fn set_stored_confidence(kg: &mut KnowledgeGraph, table: &str, confidence: f64) {
    let id = table_node_id(table);
    if let Some(node) = kg.nodes.iter_mut().find(|n| n.id == id) {
        node.properties
            .insert("alias_confidence".to_string(), serde_json::json!(confidence));
    }
}

/// Derive aliases from the table name alone: drop technical prefix tokens,
/// then offer the first business token and the joined business tokens.
/// `brz_lnd_RBP_GPU` -> `["RBP", "RBP GPU"]`.
pub fn heuristic_aliases(table_name: &str) -> Vec<String> {
    let raw_tokens: Vec<&str> = table_name
        .split(['_', ' ', '-'])
        .filter(|t| !t.is_empty())
        .collect();

    let meaningful: Vec<&str> = raw_tokens
        .iter()
        .copied()
        .filter(|t| !TECHNICAL_TOKENS.contains(&t.to_lowercase().as_str()))
        .collect();

    if meaningful.is_empty() {
        return Vec::new();
    }

    let mut aliases = Vec::new();
    let first = meaningful[0].to_string();
    let joined = meaningful.join(" ");

    if !first.eq_ignore_ascii_case(table_name) {
        aliases.push(first.clone());
    }
    if joined != first && !joined.eq_ignore_ascii_case(table_name) {
        aliases.push(joined);
    }
    aliases
}

// ============================================================================
// Resolution
// ============================================================================

/// Resolve a free-form term to a table label using, in order: exact
/// case-insensitive label match, exact alias match, fuzzy token similarity
/// (>= 0.6), substring containment. Returns None when nothing qualifies.
pub fn resolve_table(kg: &KnowledgeGraph, term: &str) -> Option<String> {
    let term = term.trim();
    if term.is_empty() {
        return None;
    }

    // deterministic candidate order
    let mut labels = kg.table_labels();
    labels.sort();

    // 1. exact case-insensitive label
    if let Some(label) = labels.iter().find(|l| l.eq_ignore_ascii_case(term)) {
        return Some(label.clone());
    }

    // 2. exact alias match
    let mut alias_hit: Option<(&String, usize)> = None;
    for label in &labels {
        if let Some(aliases) = kg.table_aliases.get(label) {
            for alias in aliases {
                if alias.eq_ignore_ascii_case(term) {
                    // most specific (longest) alias wins ties across tables
                    let len = alias.len();
                    if alias_hit.map(|(_, best)| len > best).unwrap_or(true) {
                        alias_hit = Some((label, len));
                    }
                }
            }
        }
    }
    if let Some((label, _)) = alias_hit {
        return Some(label.clone());
    }

    // 3. fuzzy token similarity against labels and aliases
    let mut best: Option<(f64, usize, &String)> = None;
    for label in &labels {
        let mut score = token_similarity(term, label);
        let mut matched_len = label.len();
        if let Some(aliases) = kg.table_aliases.get(label) {
            for alias in aliases {
                let s = token_similarity(term, alias);
                if s > score {
                    score = s;
                    matched_len = alias.len();
                }
            }
        }
        if score >= 0.6 {
            let replace = match best {
                None => true,
                Some((bs, bl, _)) => score > bs || (score == bs && matched_len > bl),
            };
            if replace {
                best = Some((score, matched_len, label));
            }
        }
    }
    if let Some((_, _, label)) = best {
        return Some(label.clone());
    }

    // 4. substring containment after normalization
    let norm_term = normalize(term);
    if norm_term.len() >= 3 {
        for label in &labels {
            let norm_label = normalize(label);
            if norm_label.contains(&norm_term) || norm_term.contains(&norm_label) {
                return Some(label.clone());
            }
            if let Some(aliases) = kg.table_aliases.get(label) {
                for alias in aliases {
                    let norm_alias = normalize(alias);
                    if !norm_alias.is_empty()
                        && (norm_alias.contains(&norm_term) || norm_term.contains(&norm_alias))
                    {
                        return Some(label.clone());
                    }
                }
            }
        }
    }

    None
}

fn normalize(s: &str) -> String {
    identifier_tokens(s).join("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn test_graph() -> KnowledgeGraph {
        let mut kg = KnowledgeGraph::new("test", vec![]);
        kg.add_table_node("brz_lnd_RBP_GPU", HashMap::new());
        kg.add_table_node("brz_lnd_OPS_EXCEL_GPU", HashMap::new());
        kg.add_table_node("hana_material_master", HashMap::new());
        kg.add_alias("brz_lnd_RBP_GPU", "RBP");
        kg.add_alias("brz_lnd_RBP_GPU", "RBP GPU");
        kg.add_alias("brz_lnd_OPS_EXCEL_GPU", "OPS Excel");
        kg
    }

    #[test]
    fn heuristic_strips_technical_prefixes() {
        assert_eq!(heuristic_aliases("brz_lnd_RBP_GPU"), vec!["RBP", "RBP GPU"]);
        assert_eq!(heuristic_aliases("dim_customer"), vec!["customer"]);
    }

    #[test]
    fn resolve_exact_label_is_case_insensitive() {
        let kg = test_graph();
        assert_eq!(resolve_table(&kg, "BRZ_LND_RBP_GPU"), Some("brz_lnd_RBP_GPU".to_string()));
    }

    #[test]
    fn resolve_alias_exact() {
        let kg = test_graph();
        assert_eq!(resolve_table(&kg, "rbp"), Some("brz_lnd_RBP_GPU".to_string()));
        assert_eq!(resolve_table(&kg, "OPS EXCEL"), Some("brz_lnd_OPS_EXCEL_GPU".to_string()));
    }

    #[test]
    fn resolve_fuzzy_and_substring() {
        let kg = test_graph();
        // fuzzy token overlap
        assert_eq!(
            resolve_table(&kg, "material master"),
            Some("hana_material_master".to_string())
        );
        // substring containment after normalization
        assert_eq!(resolve_table(&kg, "rbpgpu"), Some("brz_lnd_RBP_GPU".to_string()));
    }

    #[test]
    fn resolve_unknown_returns_none() {
        let kg = test_graph();
        assert_eq!(resolve_table(&kg, "payroll"), None);
        assert_eq!(resolve_table(&kg, ""), None);
    }

    #[test]
    fn alias_round_trip_property() {
        let kg = test_graph();
        for label in kg.table_labels() {
            assert_eq!(resolve_table(&kg, &label), Some(label.clone()));
            if let Some(aliases) = kg.table_aliases.get(&label) {
                for alias in aliases {
                    assert_eq!(resolve_table(&kg, alias), Some(label.clone()));
                }
            }
        }
    }

    #[test]
    fn resolver_is_deterministic() {
        let kg = test_graph();
        let a = resolve_table(&kg, "gpu");
        let b = resolve_table(&kg, "gpu");
        assert_eq!(a, b);
    }
}
