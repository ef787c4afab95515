//! KG Assembler
//!
//! Builds the merged knowledge graph from schema descriptors: one table node
//! per table, intra-schema REFERENCES edges from declared foreign keys, and
//! inferred CROSS_SCHEMA_REFERENCE edges from referential column-name
//! patterns. Nodes dedup by canonical id, edges by (source, target, type).

use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{
    GraphRelationship, KnowledgeGraph, REL_CROSS_SCHEMA, REL_REFERENCES, RelationshipOrigin,
    Schema, Table, table_node_id,
};
use crate::services::alias::AliasLearner;
use crate::utils::is_excluded;

pub struct GraphBuilder {
    alias_learner: Arc<AliasLearner>,
}

/// Referential column-name patterns, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefPattern {
    IdSuffix,
    UidSuffix,
    CodeSuffix,
    BareName,
}

impl RefPattern {
    fn confidence(&self) -> f64 {
        match self {
            Self::IdSuffix => 0.85,
            Self::UidSuffix => 0.80,
            Self::CodeSuffix => 0.70,
            Self::BareName => 0.60,
        }
    }

    /// Column name on the referenced table this pattern points at.
    fn target_column(&self, target: &Table) -> Option<String> {
        let preferred = match self {
            Self::IdSuffix => Some("id"),
            Self::UidSuffix => Some("uid"),
            Self::CodeSuffix => Some("code"),
            Self::BareName => None,
        };
        if let Some(name) = preferred
            && let Some(col) = target.column(name)
        {
            return Some(col.name.clone());
        }
        target
            .columns
            .iter()
            .find(|c| c.primary_key)
            .map(|c| c.name.clone())
    }
}

impl GraphBuilder {
    pub fn new(alias_learner: Arc<AliasLearner>) -> Self {
        Self { alias_learner }
    }

    /// Build a merged KG from the given schemas. Alias learning (when
    /// `use_llm` is set) never aborts the build; its failures degrade to
    /// heuristics inside the learner.
    pub async fn build_merged(
        &self,
        schemas: &[Arc<Schema>],
        kg_name: &str,
        use_llm: bool,
    ) -> KnowledgeGraph {
        let schema_names: Vec<String> = schemas.iter().map(|s| s.name.clone()).collect();
        let mut kg = KnowledgeGraph::new(kg_name, schema_names);

        for schema in schemas {
            let database = schema
                .connection_url
                .as_deref()
                .map(crate::services::schema_store::extract_database_name)
                .filter(|db| !db.is_empty());
            for table in &schema.tables {
                let mut props = HashMap::new();
                props.insert("schema".to_string(), serde_json::json!(schema.name));
                props.insert("columns".to_string(), serde_json::json!(table.column_names()));
                if let Some(db) = &database {
                    props.insert("database".to_string(), serde_json::json!(db));
                }
                if let Some(desc) = &table.description {
                    props.insert("description".to_string(), serde_json::json!(desc));
                }
                kg.add_table_node(&table.name, props);
            }
        }

        for schema in schemas {
            self.add_foreign_key_edges(&mut kg, schema);
        }

        self.infer_cross_schema_edges(&mut kg, schemas);

        if use_llm {
            for schema in schemas {
                for table in &schema.tables {
                    self.alias_learner.learn_into(&mut kg, table, true).await;
                }
            }
        }

        let stats = kg.compute_statistics();
        tracing::info!(
            "Built KG '{}': {} nodes, {} relationships ({} schemas)",
            kg_name,
            kg.nodes.len(),
            stats.total_relationships,
            kg.metadata.schemas_merged.len()
        );
        kg.metadata.statistics = Some(stats);
        kg
    }

    /// Declared foreign keys become REFERENCES edges at confidence 1.0.
    fn add_foreign_key_edges(&self, kg: &mut KnowledgeGraph, schema: &Schema) {
        for table in &schema.tables {
            for column in &table.columns {
                let Some(fk) = &column.foreign_key else { continue };
                if schema.table(&fk.target_table).is_none() {
                    tracing::warn!(
                        "Foreign key {}.{} points at unknown table '{}', skipping",
                        table.name,
                        column.name,
                        fk.target_table
                    );
                    continue;
                }
                if is_excluded(&column.name) || is_excluded(&fk.target_column) {
                    tracing::info!(
                        "Excluded field in foreign key {}.{} -> {}.{}, skipping edge",
                        table.name,
                        column.name,
                        fk.target_table,
                        fk.target_column
                    );
                    continue;
                }

                let mut props = HashMap::new();
                props.insert("schema".to_string(), serde_json::json!(schema.name));
                props.insert("inferred".to_string(), serde_json::json!(false));

                kg.add_relationship(GraphRelationship {
                    source_id: table_node_id(&table.name),
                    target_id: table_node_id(&fk.target_table),
                    relationship_type: REL_REFERENCES.to_string(),
                    properties: props,
                    source_column: Some(column.name.clone()),
                    target_column: Some(fk.target_column.clone()),
                    confidence: 1.0,
                    origin: RelationshipOrigin::AutoDetected,
                    cardinality: Some("N:1".to_string()),
                    reasoning: None,
                });
            }
        }
    }

    /// Scan column names for `<X>_id` / `<X>_uid` / `<X>_code` / `<X>` where
    /// a table `<X>` exists in a *different* schema.
    fn infer_cross_schema_edges(&self, kg: &mut KnowledgeGraph, schemas: &[Arc<Schema>]) {
        for schema in schemas {
            for table in &schema.tables {
                for column in &table.columns {
                    let Some((base, pattern)) = match_ref_pattern(&column.name) else {
                        continue;
                    };

                    for other in schemas {
                        if other.name == schema.name {
                            continue;
                        }
                        let Some(target) = other.table(&base) else { continue };
                        let Some(target_column) = pattern.target_column(target) else {
                            continue;
                        };

                        if is_excluded(&column.name) || is_excluded(&target_column) {
                            tracing::info!(
                                "Excluded field in inferred pair {}.{} -> {}.{}, dropping",
                                table.name,
                                column.name,
                                target.name,
                                target_column
                            );
                            continue;
                        }

                        let mut props = HashMap::new();
                        props.insert("inferred".to_string(), serde_json::json!(true));
                        props
                            .insert("source_schema".to_string(), serde_json::json!(schema.name));
                        props.insert("target_schema".to_string(), serde_json::json!(other.name));

                        kg.add_relationship(GraphRelationship {
                            source_id: table_node_id(&table.name),
                            target_id: table_node_id(&target.name),
                            relationship_type: REL_CROSS_SCHEMA.to_string(),
                            properties: props,
                            source_column: Some(column.name.clone()),
                            target_column: Some(target_column),
                            confidence: pattern.confidence(),
                            origin: RelationshipOrigin::AutoDetected,
                            cardinality: None,
                            reasoning: Some(format!(
                                "column '{}' matches referential pattern for table '{}'",
                                column.name, target.name
                            )),
                        });
                    }
                }
            }
        }
    }
}

/// Match a column name against the referential patterns, returning the
/// referenced table base name and the pattern kind.
fn match_ref_pattern(column: &str) -> Option<(String, RefPattern)> {
    let lower = column.to_lowercase();
    for (suffix, pattern) in [
        ("_id", RefPattern::IdSuffix),
        ("_uid", RefPattern::UidSuffix),
        ("_code", RefPattern::CodeSuffix),
    ] {
        if let Some(base) = lower.strip_suffix(suffix)
            && !base.is_empty()
        {
            return Some((base.to_string(), pattern));
        }
    }
    Some((lower, RefPattern::BareName))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use crate::models::{Column, ForeignKey};
    use crate::services::llm::LlmService;

    fn builder() -> GraphBuilder {
        let llm = Arc::new(LlmService::new(LlmConfig::default()));
        GraphBuilder::new(Arc::new(AliasLearner::new(llm)))
    }

    fn column(name: &str) -> Column {
        Column {
            name: name.to_string(),
            data_type: "varchar".to_string(),
            nullable: true,
            primary_key: false,
            foreign_key: None,
            description: None,
        }
    }

    fn pk(name: &str) -> Column {
        Column { primary_key: true, ..column(name) }
    }

    fn schema(name: &str, tables: Vec<Table>) -> Arc<Schema> {
        Arc::new(Schema { name: name.to_string(), connection_url: None, tables })
    }

    fn table(name: &str, columns: Vec<Column>) -> Table {
        Table { name: name.to_string(), description: None, columns }
    }

    #[tokio::test]
    async fn cross_schema_inference_from_uid_suffix() {
        let a = schema(
            "a",
            vec![table("catalog", vec![pk("id"), column("product_name"), column("vendor_uid")])],
        );
        let b = schema("b", vec![table("vendor", vec![pk("uid"), column("vendor_name")])]);

        let kg = builder().build_merged(&[a, b], "merged", false).await;

        assert_eq!(kg.nodes.len(), 2);
        let edges: Vec<_> = kg
            .relationships
            .iter()
            .filter(|r| r.relationship_type == REL_CROSS_SCHEMA)
            .collect();
        assert_eq!(edges.len(), 1);
        let edge = edges[0];
        assert_eq!(edge.source_id, table_node_id("catalog"));
        assert_eq!(edge.target_id, table_node_id("vendor"));
        assert_eq!(edge.source_column.as_deref(), Some("vendor_uid"));
        assert_eq!(edge.target_column.as_deref(), Some("uid"));
        assert!(edge.confidence >= 0.6 && edge.confidence <= 0.85);
        assert_eq!(edge.origin, RelationshipOrigin::AutoDetected);
        assert_eq!(edge.properties.get("inferred"), Some(&serde_json::json!(true)));
    }

    #[tokio::test]
    async fn foreign_keys_become_references_edges() {
        let s = schema(
            "sales",
            vec![
                table(
                    "orders",
                    vec![pk("id"), {
                        let mut c = column("customer_id");
                        c.foreign_key = Some(ForeignKey {
                            target_table: "customers".to_string(),
                            target_column: "id".to_string(),
                        });
                        c
                    }],
                ),
                table("customers", vec![pk("id")]),
            ],
        );

        let kg = builder().build_merged(&[s], "sales_kg", false).await;
        let edge = kg
            .relationships
            .iter()
            .find(|r| r.relationship_type == REL_REFERENCES)
            .expect("REFERENCES edge");
        assert_eq!(edge.confidence, 1.0);
        assert_eq!(edge.source_column.as_deref(), Some("customer_id"));
    }

    #[tokio::test]
    async fn excluded_fields_never_produce_edges() {
        let a = schema("a", vec![table("facts", vec![column("product_line")])]);
        let b = schema("b", vec![table("product_line", vec![pk("id")])]);

        let kg = builder().build_merged(&[a, b], "kg", false).await;
        // bare-name pattern would match table `product_line`, but the source
        // column is excluded
        assert!(kg.relationships.is_empty());
    }

    #[tokio::test]
    async fn no_intra_schema_inference() {
        let s = schema(
            "one",
            vec![
                table("orders", vec![column("customer_id")]),
                table("customer", vec![pk("id")]),
            ],
        );
        let kg = builder().build_merged(&[s], "kg", false).await;
        assert!(
            kg.relationships
                .iter()
                .all(|r| r.relationship_type != REL_CROSS_SCHEMA)
        );
    }

    #[tokio::test]
    async fn duplicate_inference_keeps_highest_confidence() {
        // vendor_id and vendor_code both point at vendor from the same table:
        // same (source, target, type) key, so one edge at the stronger 0.85
        let a = schema(
            "a",
            vec![table("catalog", vec![column("vendor_id"), column("vendor_code")])],
        );
        let b = schema("b", vec![table("vendor", vec![pk("id"), column("code")])]);

        let kg = builder().build_merged(&[a, b], "kg", false).await;
        let edges: Vec<_> = kg
            .relationships
            .iter()
            .filter(|r| r.relationship_type == REL_CROSS_SCHEMA)
            .collect();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].confidence, 0.85);
    }
}
