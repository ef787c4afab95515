//! NL Relationship Parser
//!
//! Parses free-form relationship statements ("orders.customer_id matches
//! customers.cust_id") into structured KG edges. LLM-assisted with a
//! deterministic token-rule fallback; never raises on malformed input.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{GraphRelationship, RelationshipOrigin, Schema, table_node_id};
use crate::services::llm::{
    LlmService, RelationshipExtractionRequest, RelationshipExtractionResponse, SchemaDigest,
};
use crate::services::query_parser::STOP_WORDS;
use crate::utils::is_excluded;

/// The deterministic fallback never reports more than this confidence.
const FALLBACK_CONFIDENCE_CAP: f64 = 0.75;

static TABLE_COLUMN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\.([A-Za-z_][A-Za-z0-9_]*)\b").expect("valid regex")
});

pub struct NlRelationshipParser {
    llm: Arc<LlmService>,
}

impl NlRelationshipParser {
    pub fn new(llm: Arc<LlmService>) -> Self {
        Self { llm }
    }

    /// Parse one statement into KG-ready edges. Edges referencing tables not
    /// present in `schemas` and edges below `min_confidence` are filtered
    /// out.
    pub async fn parse(
        &self,
        statement: &str,
        schemas: &[Arc<Schema>],
        use_llm: bool,
        min_confidence: f64,
    ) -> Vec<GraphRelationship> {
        let statement = statement.trim();
        if statement.is_empty() {
            return Vec::new();
        }

        let tables = known_tables(schemas);

        let mut edges = if use_llm && self.llm.is_enabled() {
            match self.parse_with_llm(statement, schemas).await {
                Ok(edges) => edges,
                Err(e) => {
                    tracing::warn!(
                        "LLM relationship parsing failed, using fallback parser: {}",
                        e
                    );
                    parse_fallback(statement, &tables)
                },
            }
        } else {
            parse_fallback(statement, &tables)
        };

        edges.retain(|edge| {
            let source_name = edge.source_id.strip_prefix("table_").unwrap_or(&edge.source_id);
            let target_name = edge.target_id.strip_prefix("table_").unwrap_or(&edge.target_id);
            let known = tables.contains_key(source_name) && tables.contains_key(target_name);
            if !known {
                tracing::warn!(
                    "Dropping relationship with unknown table: {} -> {}",
                    edge.source_id,
                    edge.target_id
                );
                return false;
            }
            if edge.confidence < min_confidence {
                tracing::debug!(
                    "Dropping low-confidence relationship {} -> {} ({:.2} < {:.2})",
                    edge.source_id,
                    edge.target_id,
                    edge.confidence,
                    min_confidence
                );
                return false;
            }
            let excluded = edge.source_column.as_deref().is_some_and(is_excluded)
                || edge.target_column.as_deref().is_some_and(is_excluded);
            if excluded {
                tracing::info!(
                    "Dropping relationship touching an excluded field: {} -> {}",
                    edge.source_id,
                    edge.target_id
                );
                return false;
            }
            true
        });

        edges
    }

    async fn parse_with_llm(
        &self,
        statement: &str,
        schemas: &[Arc<Schema>],
    ) -> Result<Vec<GraphRelationship>, crate::services::llm::LLMError> {
        let valid_tables: Vec<String> = schemas
            .iter()
            .flat_map(|s| s.table_names())
            .collect();
        let mut excluded_words: Vec<String> =
            STOP_WORDS.iter().map(|w| w.to_string()).collect();
        excluded_words.extend(crate::utils::EXCLUDED_FIELDS.iter().map(|f| f.to_string()));

        let request = RelationshipExtractionRequest {
            statement: statement.to_string(),
            valid_tables,
            schemas: schemas.iter().map(|s| SchemaDigest::from_schema(s)).collect(),
            excluded_words,
            min_confidence: 0.0,
        };

        let response: RelationshipExtractionResponse = self.llm.analyze(&request).await?;

        let tables = known_tables(schemas);
        let mut edges = Vec::new();
        for rel in response.relationships {
            let Some((source_label, _)) = tables.get(&rel.source_table.to_lowercase()) else {
                tracing::warn!("LLM returned unknown source table '{}'", rel.source_table);
                continue;
            };
            let Some((target_label, _)) = tables.get(&rel.target_table.to_lowercase()) else {
                tracing::warn!("LLM returned unknown target table '{}'", rel.target_table);
                continue;
            };

            // columns must exist on their tables when present
            let source_column = validate_column(schemas, source_label, &rel.source_column);
            let target_column = validate_column(schemas, target_label, &rel.target_column);

            edges.push(build_edge(
                source_label,
                target_label,
                source_column,
                target_column,
                &rel.relationship_type,
                rel.cardinality.clone(),
                rel.confidence.clamp(0.0, 1.0),
                rel.reasoning.clone(),
            ));
        }
        Ok(edges)
    }
}

fn validate_column(schemas: &[Arc<Schema>], table_label: &str, column: &str) -> Option<String> {
    if column.trim().is_empty() {
        return None;
    }
    for schema in schemas {
        if let Some(table) = schema.table(table_label)
            && let Some(col) = table.column(column)
        {
            return Some(col.name.clone());
        }
    }
    tracing::warn!("Column '{}' not found on table '{}', dropping column ref", column, table_label);
    None
}

/// lowercase table name -> (original label, schema name)
fn known_tables(schemas: &[Arc<Schema>]) -> HashMap<String, (String, String)> {
    let mut map = HashMap::new();
    for schema in schemas {
        for table in &schema.tables {
            map.entry(table.name.to_lowercase())
                .or_insert_with(|| (table.name.clone(), schema.name.clone()));
        }
    }
    map
}

#[allow(clippy::too_many_arguments)]
fn build_edge(
    source_label: &str,
    target_label: &str,
    source_column: Option<String>,
    target_column: Option<String>,
    relationship_type: &str,
    cardinality: Option<String>,
    confidence: f64,
    reasoning: Option<String>,
) -> GraphRelationship {
    GraphRelationship {
        source_id: table_node_id(source_label),
        target_id: table_node_id(target_label),
        relationship_type: relationship_type.to_string(),
        properties: HashMap::new(),
        source_column,
        target_column,
        confidence,
        origin: RelationshipOrigin::NaturalLanguage,
        cardinality,
        reasoning,
    }
}

/// Deterministic parser: split the statement on connectives, look for
/// `table.column` forms against known tables, pick up relationship verbs and
/// cardinality keywords.
fn parse_fallback(
    statement: &str,
    tables: &HashMap<String, (String, String)>,
) -> Vec<GraphRelationship> {
    let mut edges = Vec::new();

    for clause in split_clauses(statement) {
        let refs: Vec<(String, String)> = TABLE_COLUMN_RE
            .captures_iter(&clause)
            .filter_map(|cap| {
                let table = cap[1].to_lowercase();
                tables
                    .get(&table)
                    .map(|(label, _)| (label.clone(), cap[2].to_string()))
            })
            .collect();

        let rel_type = relationship_type_of(&clause);
        let cardinality = cardinality_of(&clause);

        if refs.len() >= 2 {
            let (source_label, source_column) = refs[0].clone();
            let (target_label, target_column) = refs[1].clone();
            edges.push(build_edge(
                &source_label,
                &target_label,
                Some(source_column),
                Some(target_column),
                rel_type,
                cardinality,
                FALLBACK_CONFIDENCE_CAP,
                Some("explicit table.column pair in statement".to_string()),
            ));
            continue;
        }

        // no explicit column pairs: look for two bare table mentions
        let mentions = bare_table_mentions(&clause, tables);
        if mentions.len() >= 2 {
            edges.push(build_edge(
                &mentions[0],
                &mentions[1],
                None,
                None,
                rel_type,
                cardinality,
                0.6,
                Some("table names mentioned together in statement".to_string()),
            ));
        }
    }

    edges
}

fn split_clauses(statement: &str) -> Vec<String> {
    statement
        .split(';')
        .flat_map(|part| part.split(" and "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn relationship_type_of(clause: &str) -> &'static str {
    let lower = clause.to_lowercase();
    if lower.contains("match") {
        "MATCHES"
    } else if lower.contains("referenc") {
        "REFERENCES"
    } else if lower.contains("join") {
        "JOINS"
    } else {
        "RELATED_TO"
    }
}

fn cardinality_of(clause: &str) -> Option<String> {
    let lower = clause.to_lowercase().replace('-', " ");
    if lower.contains("one to one") {
        Some("1:1".to_string())
    } else if lower.contains("one to many") {
        Some("1:N".to_string())
    } else if lower.contains("many to one") {
        Some("N:1".to_string())
    } else if lower.contains("many to many") {
        Some("N:M".to_string())
    } else {
        None
    }
}

fn bare_table_mentions(clause: &str, tables: &HashMap<String, (String, String)>) -> Vec<String> {
    let mut seen = Vec::new();
    for word in clause.split(|c: char| !c.is_alphanumeric() && c != '_') {
        let lower = word.to_lowercase();
        if lower.is_empty() || STOP_WORDS.contains(lower.as_str()) {
            continue;
        }
        if let Some((label, _)) = tables.get(&lower)
            && !seen.contains(label)
        {
            seen.push(label.clone());
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use crate::models::{Column, Table};

    fn schema(name: &str, tables: Vec<(&str, Vec<&str>)>) -> Arc<Schema> {
        Arc::new(Schema {
            name: name.to_string(),
            connection_url: None,
            tables: tables
                .into_iter()
                .map(|(t, cols)| Table {
                    name: t.to_string(),
                    description: None,
                    columns: cols
                        .into_iter()
                        .map(|c| Column {
                            name: c.to_string(),
                            data_type: "varchar".to_string(),
                            nullable: true,
                            primary_key: false,
                            foreign_key: None,
                            description: None,
                        })
                        .collect(),
                })
                .collect(),
        })
    }

    fn parser() -> NlRelationshipParser {
        NlRelationshipParser::new(Arc::new(LlmService::new(LlmConfig::default())))
    }

    #[tokio::test]
    async fn fallback_parses_explicit_column_pair() {
        let schemas = vec![schema(
            "catalog",
            vec![("orders", vec!["customer_id"]), ("customers", vec!["cust_id"])],
        )];
        let edges = parser()
            .parse("orders.customer_id matches customers.cust_id", &schemas, false, 0.5)
            .await;

        assert_eq!(edges.len(), 1);
        let edge = &edges[0];
        assert_eq!(edge.source_id, table_node_id("orders"));
        assert_eq!(edge.target_id, table_node_id("customers"));
        assert_eq!(edge.source_column.as_deref(), Some("customer_id"));
        assert_eq!(edge.target_column.as_deref(), Some("cust_id"));
        assert_eq!(edge.relationship_type, "MATCHES");
        assert_eq!(edge.origin, RelationshipOrigin::NaturalLanguage);
        assert!(edge.confidence <= FALLBACK_CONFIDENCE_CAP);
    }

    #[tokio::test]
    async fn fallback_handles_cardinality_and_bare_tables() {
        let schemas = vec![schema(
            "sales",
            vec![("orders", vec!["id"]), ("invoices", vec!["id"])],
        )];
        let edges = parser()
            .parse("orders relates to invoices one-to-many", &schemas, false, 0.5)
            .await;
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].cardinality.as_deref(), Some("1:N"));
        assert!(edges[0].source_column.is_none());
    }

    #[tokio::test]
    async fn unknown_tables_are_filtered() {
        let schemas = vec![schema("s", vec![("orders", vec!["id"])])];
        let edges = parser()
            .parse("orders.id matches ghosts.id", &schemas, false, 0.0)
            .await;
        assert!(edges.is_empty());
    }

    #[tokio::test]
    async fn min_confidence_filters_edges() {
        let schemas = vec![schema(
            "s",
            vec![("orders", vec!["customer_id"]), ("customers", vec!["cust_id"])],
        )];
        let edges = parser()
            .parse("orders.customer_id matches customers.cust_id", &schemas, false, 0.9)
            .await;
        assert!(edges.is_empty());
    }

    #[tokio::test]
    async fn excluded_columns_never_pass() {
        let schemas = vec![schema(
            "s",
            vec![("facts", vec!["product_line"]), ("dims", vec!["code"])],
        )];
        let edges = parser()
            .parse("facts.product_line matches dims.code", &schemas, false, 0.0)
            .await;
        assert!(edges.is_empty());
    }

    #[tokio::test]
    async fn malformed_statement_degrades_to_empty() {
        let schemas = vec![schema("s", vec![("orders", vec!["id"])])];
        let edges = parser().parse("???", &schemas, false, 0.5).await;
        assert!(edges.is_empty());
    }
}
