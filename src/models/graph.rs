//! Knowledge graph model
//!
//! A directed, typed multigraph. Table nodes stand for relations; edges
//! encode discovered or declared joinability between columns. Node ids are
//! lowercased canonical forms (`table_` prefix for tables) while labels keep
//! the original case - SQL generation depends on that round-trip.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use utoipa::ToSchema;

pub const REL_REFERENCES: &str = "REFERENCES";
pub const REL_CROSS_SCHEMA: &str = "CROSS_SCHEMA_REFERENCE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Table,
    Column,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipOrigin {
    AutoDetected,
    NaturalLanguage,
}

impl RelationshipOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoDetected => "auto_detected",
            Self::NaturalLanguage => "natural_language",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GraphNode {
    /// Stable canonical id: lowercased, `table_` prefix for table nodes
    pub id: String,
    /// Original-case name
    pub label: String,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    #[schema(value_type = Object)]
    pub properties: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GraphRelationship {
    pub source_id: String,
    pub target_id: String,
    pub relationship_type: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    #[schema(value_type = Object)]
    pub properties: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_column: Option<String>,
    pub confidence: f64,
    pub origin: RelationshipOrigin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cardinality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl GraphRelationship {
    /// Uniqueness key: no duplicate `(source, target, type)` edge may exist.
    pub fn dedup_key(&self) -> (String, String, String) {
        (self.source_id.clone(), self.target_id.clone(), self.relationship_type.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GraphStatistics {
    pub total_relationships: usize,
    pub by_origin: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
    pub unique_source_tables: usize,
    pub average_confidence: f64,
    pub high_confidence_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GraphMetadata {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub schemas_merged: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<GraphStatistics>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct KnowledgeGraph {
    pub nodes: Vec<GraphNode>,
    pub relationships: Vec<GraphRelationship>,
    /// table label -> ordered aliases (LLM-learned + heuristic)
    #[serde(default)]
    pub table_aliases: BTreeMap<String, Vec<String>>,
    pub metadata: GraphMetadata,
}

/// Canonical node id for a table name.
pub fn table_node_id(name: &str) -> String {
    format!("table_{}", name.to_lowercase())
}

impl KnowledgeGraph {
    pub fn new(name: &str, schemas_merged: Vec<String>) -> Self {
        Self {
            nodes: Vec::new(),
            relationships: Vec::new(),
            table_aliases: BTreeMap::new(),
            metadata: GraphMetadata {
                name: name.to_string(),
                created_at: Utc::now(),
                schemas_merged,
                statistics: None,
            },
        }
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Original-case label for a table name, resolved case-insensitively.
    pub fn table_label(&self, name: &str) -> Option<String> {
        let id = table_node_id(name);
        self.node(&id).map(|n| n.label.clone())
    }

    pub fn table_labels(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Table)
            .map(|n| n.label.clone())
            .collect()
    }

    /// Insert a table node if absent (dedup by canonical id). Returns the id.
    pub fn add_table_node(
        &mut self,
        label: &str,
        properties: HashMap<String, serde_json::Value>,
    ) -> String {
        let id = table_node_id(label);
        if self.node(&id).is_none() {
            self.nodes.push(GraphNode {
                id: id.clone(),
                label: label.to_string(),
                kind: NodeKind::Table,
                properties,
            });
        }
        id
    }

    /// Insert an edge under the dedup policy: an existing `(source, target,
    /// type)` edge is kept, upgrading its confidence if the incoming one is
    /// higher. Returns true when a new edge was appended.
    pub fn add_relationship(&mut self, rel: GraphRelationship) -> bool {
        let key = rel.dedup_key();
        if let Some(existing) = self.relationships.iter_mut().find(|r| r.dedup_key() == key) {
            if rel.confidence > existing.confidence {
                existing.confidence = rel.confidence;
                existing.source_column = rel.source_column.or(existing.source_column.take());
                existing.target_column = rel.target_column.or(existing.target_column.take());
                if existing.reasoning.is_none() {
                    existing.reasoning = rel.reasoning;
                }
            }
            return false;
        }
        self.relationships.push(rel);
        true
    }

    /// Relationships whose both endpoints exist in `nodes`. Orphan edges are
    /// dropped with a warning and never reach rendering output.
    pub fn render_relationships(&self) -> Vec<&GraphRelationship> {
        let ids: HashSet<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();
        self.relationships
            .iter()
            .filter(|r| {
                let ok = ids.contains(r.source_id.as_str()) && ids.contains(r.target_id.as_str());
                if !ok {
                    tracing::warn!(
                        "Dropping orphan relationship {} -> {} ({})",
                        r.source_id,
                        r.target_id,
                        r.relationship_type
                    );
                }
                ok
            })
            .collect()
    }

    /// Append an alias for a table label, keeping the list an ordered set.
    pub fn add_alias(&mut self, table_label: &str, alias: &str) {
        let alias = alias.trim();
        if alias.is_empty() {
            return;
        }
        let entry = self.table_aliases.entry(table_label.to_string()).or_default();
        if !entry.iter().any(|a| a.eq_ignore_ascii_case(alias)) {
            entry.push(alias.to_string());
        }
    }

    /// Compute statistics in a single pass over the edges.
    pub fn compute_statistics(&self) -> GraphStatistics {
        let mut by_origin: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
        let mut sources: HashSet<&str> = HashSet::new();
        let mut confidence_sum = 0.0;
        let mut high = 0usize;

        for rel in &self.relationships {
            *by_origin.entry(rel.origin.as_str().to_string()).or_default() += 1;
            *by_type.entry(rel.relationship_type.clone()).or_default() += 1;
            sources.insert(rel.source_id.as_str());
            confidence_sum += rel.confidence;
            if rel.confidence >= 0.7 {
                high += 1;
            }
        }

        let total = self.relationships.len();
        GraphStatistics {
            total_relationships: total,
            by_origin,
            by_type,
            unique_source_tables: sources.len(),
            average_confidence: if total == 0 { 0.0 } else { confidence_sum / total as f64 },
            high_confidence_count: high,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(src: &str, tgt: &str, rel_type: &str, confidence: f64) -> GraphRelationship {
        GraphRelationship {
            source_id: table_node_id(src),
            target_id: table_node_id(tgt),
            relationship_type: rel_type.to_string(),
            properties: HashMap::new(),
            source_column: None,
            target_column: None,
            confidence,
            origin: RelationshipOrigin::AutoDetected,
            cardinality: None,
            reasoning: None,
        }
    }

    #[test]
    fn table_node_id_round_trip() {
        let mut kg = KnowledgeGraph::new("test", vec![]);
        kg.add_table_node("brz_lnd_RBP_GPU", HashMap::new());
        assert_eq!(kg.table_label("BRZ_LND_rbp_gpu"), Some("brz_lnd_RBP_GPU".to_string()));
        // id is case-insensitive canonical
        assert!(kg.node("table_brz_lnd_rbp_gpu").is_some());
    }

    #[test]
    fn duplicate_edge_keeps_highest_confidence() {
        let mut kg = KnowledgeGraph::new("test", vec![]);
        kg.add_table_node("a", HashMap::new());
        kg.add_table_node("b", HashMap::new());
        assert!(kg.add_relationship(edge("a", "b", REL_REFERENCES, 0.6)));
        assert!(!kg.add_relationship(edge("a", "b", REL_REFERENCES, 0.9)));
        assert_eq!(kg.relationships.len(), 1);
        assert_eq!(kg.relationships[0].confidence, 0.9);
        // lower confidence duplicate does not downgrade
        assert!(!kg.add_relationship(edge("a", "b", REL_REFERENCES, 0.5)));
        assert_eq!(kg.relationships[0].confidence, 0.9);
    }

    #[test]
    fn render_drops_orphan_edges() {
        let mut kg = KnowledgeGraph::new("test", vec![]);
        kg.add_table_node("a", HashMap::new());
        kg.add_table_node("b", HashMap::new());
        kg.add_relationship(edge("a", "b", REL_REFERENCES, 1.0));
        // force an orphan in (bypassing add_relationship checks)
        kg.relationships.push(edge("a", "ghost", REL_REFERENCES, 1.0));
        let rendered = kg.render_relationships();
        assert_eq!(rendered.len(), 1);
        assert_eq!(rendered[0].target_id, table_node_id("b"));
    }

    #[test]
    fn alias_list_is_an_ordered_set() {
        let mut kg = KnowledgeGraph::new("test", vec![]);
        kg.add_alias("brz_lnd_RBP_GPU", "RBP");
        kg.add_alias("brz_lnd_RBP_GPU", "RBP GPU");
        kg.add_alias("brz_lnd_RBP_GPU", "rbp");
        assert_eq!(
            kg.table_aliases.get("brz_lnd_RBP_GPU").unwrap(),
            &vec!["RBP".to_string(), "RBP GPU".to_string()]
        );
    }

    #[test]
    fn statistics_single_pass() {
        let mut kg = KnowledgeGraph::new("test", vec![]);
        kg.add_table_node("a", HashMap::new());
        kg.add_table_node("b", HashMap::new());
        kg.add_table_node("c", HashMap::new());
        kg.add_relationship(edge("a", "b", REL_REFERENCES, 1.0));
        kg.add_relationship(edge("a", "c", REL_CROSS_SCHEMA, 0.6));
        let stats = kg.compute_statistics();
        assert_eq!(stats.total_relationships, 2);
        assert_eq!(stats.unique_source_tables, 1);
        assert_eq!(stats.high_confidence_count, 1);
        assert!((stats.average_confidence - 0.8).abs() < 1e-9);
        assert_eq!(stats.by_type.get(REL_REFERENCES), Some(&1));
    }
}
