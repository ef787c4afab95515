//! Rule Generator
//!
//! Produces reconciliation rulesets from KG relationships. Pattern rules are
//! always generated; LLM enrichment is optional and non-fatal. User field
//! preferences steer candidate ordering, exclusion and hint seeding.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::models::{
    FieldPreference, KnowledgeGraph, MatchType, ReconciliationRule, RelationshipOrigin, Ruleset,
    Schema, Table, ValidationStatus,
};
use crate::services::llm::{
    EdgeDigest, LlmService, RuleGenerationRequest, RuleGenerationResponse, SchemaDigest,
};
use crate::utils::{id, is_excluded};

/// Pattern rules never report below this confidence; an edge's own higher
/// confidence wins.
const PATTERN_BASE_CONFIDENCE: f64 = 0.75;

/// Confidence assigned to user-provided field hints after column validation.
const HINT_CONFIDENCE: f64 = 0.9;

pub struct RuleGenerator {
    llm: Arc<LlmService>,
}

impl RuleGenerator {
    pub fn new(llm: Arc<LlmService>) -> Self {
        Self { llm }
    }

    /// Generate a ruleset for `schemas` from the KG. Empty input yields an
    /// empty ruleset, not an error.
    pub async fn generate(
        &self,
        kg: &KnowledgeGraph,
        schemas: &[Arc<Schema>],
        use_llm: bool,
        min_confidence: f64,
        preferences: &[FieldPreference],
    ) -> Ruleset {
        let tables = table_index(schemas);
        let prefs_by_table: HashMap<String, &FieldPreference> = preferences
            .iter()
            .map(|p| (p.table.to_lowercase(), p))
            .collect();

        let mut rules = self.pattern_rules(kg, &tables, &prefs_by_table);

        rules.extend(hint_rules(schemas, &tables, preferences));

        if use_llm && self.llm.is_enabled() {
            match self.llm_rules(kg, schemas, &tables, preferences).await {
                Ok(llm_rules) => {
                    tracing::info!("LLM suggested {} rules", llm_rules.len());
                    rules.extend(llm_rules);
                },
                Err(e) => {
                    tracing::warn!("LLM rule generation failed, keeping pattern rules only: {}", e);
                },
            }
        }

        // excluded fields, confidence floor, dedup keeping highest confidence
        rules.retain(|rule| {
            let excluded = rule
                .source_columns
                .iter()
                .chain(rule.target_columns.iter())
                .any(|c| is_excluded(c));
            if excluded {
                tracing::info!("Dropping rule '{}' touching an excluded field", rule.rule_name);
                return false;
            }
            rule.confidence >= min_confidence
        });

        let mut by_key: HashMap<String, ReconciliationRule> = HashMap::new();
        for rule in rules {
            match by_key.get_mut(&rule.dedup_key()) {
                Some(existing) if existing.confidence >= rule.confidence => {},
                Some(existing) => *existing = rule,
                None => {
                    by_key.insert(rule.dedup_key(), rule);
                },
            }
        }

        let mut rules: Vec<ReconciliationRule> = by_key.into_values().collect();
        rules.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.rule_name.cmp(&b.rule_name))
        });

        let mut taken = HashSet::new();
        for rule in &mut rules {
            rule.rule_id = id::unique_rule_id(&mut taken);
        }

        let kg_name = kg.metadata.name.clone();
        Ruleset {
            ruleset_id: id::ruleset_id(),
            name: format!("{}_rules", kg_name),
            kg_name,
            schemas: schemas.iter().map(|s| s.name.clone()).collect(),
            rules,
            created_at: Utc::now(),
        }
    }

    /// Pattern rules: one exact-match rule per KG edge that carries both
    /// column refs and connects tables of the requested schemas. Candidates
    /// are ordered by (priority fields first, then alphabetically).
    fn pattern_rules(
        &self,
        kg: &KnowledgeGraph,
        tables: &TableIndex,
        prefs: &HashMap<String, &FieldPreference>,
    ) -> Vec<ReconciliationRule> {
        let mut candidates: Vec<(&str, Candidate)> = Vec::new();

        for rel in &kg.relationships {
            let (Some(src_col), Some(tgt_col)) = (&rel.source_column, &rel.target_column) else {
                continue;
            };
            let src_label = rel.source_id.strip_prefix("table_").unwrap_or(&rel.source_id);
            let tgt_label = rel.target_id.strip_prefix("table_").unwrap_or(&rel.target_id);
            let (Some((src_schema, src_table)), Some((tgt_schema, tgt_table))) =
                (tables.get(src_label), tables.get(tgt_label))
            else {
                continue;
            };

            if let Some(pref) = prefs.get(&src_table.name.to_lowercase())
                && (pref.exclude_fields.iter().any(|f| f == src_col))
            {
                tracing::debug!(
                    "Preference excludes '{}' on '{}', skipping candidate",
                    src_col,
                    src_table.name
                );
                continue;
            }
            if let Some(pref) = prefs.get(&tgt_table.name.to_lowercase())
                && (pref.exclude_fields.iter().any(|f| f == tgt_col))
            {
                continue;
            }

            let priority_rank = prefs
                .get(&src_table.name.to_lowercase())
                .and_then(|p| p.priority_fields.iter().position(|f| f == src_col))
                .unwrap_or(usize::MAX);

            candidates.push((
                src_col,
                Candidate {
                    priority_rank,
                    rule: build_rule(
                        src_schema,
                        &src_table.name,
                        src_col,
                        tgt_schema,
                        &tgt_table.name,
                        tgt_col,
                        MatchType::Exact,
                        PATTERN_BASE_CONFIDENCE.max(rel.confidence),
                        pattern_reasoning(rel.origin),
                        false,
                    ),
                },
            ));
        }

        candidates.sort_by(|(col_a, a), (col_b, b)| {
            a.priority_rank
                .cmp(&b.priority_rank)
                .then_with(|| col_a.cmp(col_b))
        });
        candidates.into_iter().map(|(_, c)| c.rule).collect()
    }

    async fn llm_rules(
        &self,
        kg: &KnowledgeGraph,
        schemas: &[Arc<Schema>],
        tables: &TableIndex,
        preferences: &[FieldPreference],
    ) -> Result<Vec<ReconciliationRule>, crate::services::llm::LLMError> {
        let cross_schema_edges: Vec<EdgeDigest> = kg
            .relationships
            .iter()
            .filter(|r| r.relationship_type == crate::models::REL_CROSS_SCHEMA)
            .map(|r| EdgeDigest {
                source_table: r
                    .source_id
                    .strip_prefix("table_")
                    .unwrap_or(&r.source_id)
                    .to_string(),
                source_column: r.source_column.clone(),
                target_table: r
                    .target_id
                    .strip_prefix("table_")
                    .unwrap_or(&r.target_id)
                    .to_string(),
                target_column: r.target_column.clone(),
                confidence: r.confidence,
            })
            .collect();

        let request = RuleGenerationRequest {
            schemas: schemas.iter().map(|s| SchemaDigest::from_schema(s)).collect(),
            cross_schema_edges,
            field_preferences: preferences.to_vec(),
            single_schema: schemas.len() == 1,
            min_confidence: 0.0,
        };

        let response: RuleGenerationResponse = self.llm.analyze(&request).await?;

        let mut rules = Vec::new();
        for suggestion in response.rules {
            let Some(match_type) = MatchType::parse(&suggestion.match_type) else {
                tracing::warn!(
                    "LLM rule '{}' has unknown match type '{}', dropping",
                    suggestion.rule_name,
                    suggestion.match_type
                );
                continue;
            };
            if suggestion.source_columns.is_empty() || suggestion.target_columns.is_empty() {
                tracing::warn!("LLM rule '{}' has empty columns, dropping", suggestion.rule_name);
                continue;
            }
            let (Some((src_schema, src_table)), Some((tgt_schema, tgt_table))) = (
                tables.get(&suggestion.source_table.to_lowercase()),
                tables.get(&suggestion.target_table.to_lowercase()),
            ) else {
                tracing::warn!(
                    "LLM rule '{}' references unknown tables, dropping",
                    suggestion.rule_name
                );
                continue;
            };
            let columns_exist = suggestion
                .source_columns
                .iter()
                .all(|c| src_table.column(c).is_some())
                && suggestion
                    .target_columns
                    .iter()
                    .all(|c| tgt_table.column(c).is_some());
            if !columns_exist {
                tracing::warn!(
                    "LLM rule '{}' references unknown columns, dropping",
                    suggestion.rule_name
                );
                continue;
            }

            let mut rule = build_rule(
                src_schema,
                &src_table.name,
                &suggestion.source_columns[0],
                tgt_schema,
                &tgt_table.name,
                &suggestion.target_columns[0],
                match_type,
                suggestion.confidence.clamp(0.0, 1.0),
                suggestion.reasoning.clone(),
                true,
            );
            rule.source_columns = suggestion.source_columns.clone();
            rule.target_columns = suggestion.target_columns.clone();
            if !suggestion.rule_name.trim().is_empty() {
                rule.rule_name = suggestion.rule_name.trim().to_string();
            }
            rules.push(rule);
        }
        Ok(rules)
    }
}

struct Candidate {
    priority_rank: usize,
    rule: ReconciliationRule,
}

/// lowercase table name -> (schema name, table)
type TableIndex = HashMap<String, (String, Table)>;

fn table_index(schemas: &[Arc<Schema>]) -> TableIndex {
    let mut index = HashMap::new();
    for schema in schemas {
        for table in &schema.tables {
            index
                .entry(table.name.to_lowercase())
                .or_insert_with(|| (schema.name.clone(), table.clone()));
        }
    }
    index
}

fn pattern_reasoning(origin: RelationshipOrigin) -> String {
    match origin {
        RelationshipOrigin::AutoDetected => {
            "derived from a detected schema relationship".to_string()
        },
        RelationshipOrigin::NaturalLanguage => {
            "derived from a user-stated relationship".to_string()
        },
    }
}

#[allow(clippy::too_many_arguments)]
fn build_rule(
    source_schema: &str,
    source_table: &str,
    source_column: &str,
    target_schema: &str,
    target_table: &str,
    target_column: &str,
    match_type: MatchType,
    confidence: f64,
    reasoning: String,
    llm_generated: bool,
) -> ReconciliationRule {
    ReconciliationRule {
        rule_id: String::new(), // assigned after dedup
        rule_name: format!(
            "{}_{}_to_{}_{}",
            source_table.to_lowercase(),
            source_column.to_lowercase(),
            target_table.to_lowercase(),
            target_column.to_lowercase()
        ),
        source_schema: source_schema.to_string(),
        source_table: source_table.to_string(),
        source_columns: vec![source_column.to_string()],
        target_schema: target_schema.to_string(),
        target_table: target_table.to_string(),
        target_columns: vec![target_column.to_string()],
        match_type,
        confidence,
        reasoning,
        validation_status: ValidationStatus::from_confidence(confidence),
        llm_generated,
        created_at: Utc::now(),
    }
}

/// Seed rules from user field hints after validating both columns exist.
/// Single-schema inputs pair the hinted column with *other tables of the
/// same schema*; multi-schema inputs search the other schemas.
fn hint_rules(
    schemas: &[Arc<Schema>],
    tables: &TableIndex,
    preferences: &[FieldPreference],
) -> Vec<ReconciliationRule> {
    let single_schema = schemas.len() == 1;
    let mut rules = Vec::new();

    for pref in preferences {
        let Some((src_schema, src_table)) = tables.get(&pref.table.to_lowercase()) else {
            tracing::warn!("Field hints for unknown table '{}', skipping", pref.table);
            continue;
        };

        for (src_col, tgt_col) in &pref.field_hints {
            if src_table.column(src_col).is_none() {
                tracing::warn!(
                    "Hint column '{}' does not exist on '{}', skipping",
                    src_col,
                    src_table.name
                );
                continue;
            }

            for schema in schemas {
                // single-schema: intra-schema pairings across other tables;
                // multi-schema: cross-schema only
                if single_schema {
                    if schema.name != *src_schema {
                        continue;
                    }
                } else if schema.name == *src_schema {
                    continue;
                }

                for table in &schema.tables {
                    if table.name.eq_ignore_ascii_case(&src_table.name) {
                        continue;
                    }
                    if let Some(column) = table.column(tgt_col) {
                        rules.push(build_rule(
                            src_schema,
                            &src_table.name,
                            src_col,
                            &schema.name,
                            &table.name,
                            &column.name,
                            MatchType::Exact,
                            HINT_CONFIDENCE,
                            "user-provided field hint".to_string(),
                            false,
                        ));
                    }
                }
            }
        }
    }
    rules
}
