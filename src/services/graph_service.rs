//! KG Integrator & Registry
//!
//! Owns the in-memory knowledge graphs (one RwLock per KG inside a DashMap
//! registry - integration writes serialize per KG, reads clone a snapshot)
//! and merges NL-parsed edges under a duplicate-safe policy. Updated graphs
//! (including `table_aliases`) are written through the file store so later
//! sessions skip re-learning.

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::models::{GraphRelationship, GraphStatistics, KnowledgeGraph, Schema};
use crate::services::alias::AliasLearner;
use crate::services::graph_builder::GraphBuilder;
use crate::services::storage::FileStore;
use crate::utils::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Append all incoming edges (the dedup key still applies)
    Union,
    /// Union, keeping the higher confidence on duplicate keys
    Deduplicate,
    /// Deduplicate, then drop incoming edges below 0.7 confidence
    HighConfidence,
}

impl MergeStrategy {
    pub fn parse(s: &str) -> EngineResult<Self> {
        match s.to_lowercase().as_str() {
            "union" => Ok(Self::Union),
            "deduplicate" => Ok(Self::Deduplicate),
            "high_confidence" => Ok(Self::HighConfidence),
            other => {
                Err(EngineError::InvalidRequest(format!("Unknown merge strategy: {}", other)))
            },
        }
    }
}

pub struct GraphService {
    store: Arc<FileStore>,
    builder: GraphBuilder,
    alias_learner: Arc<AliasLearner>,
    graphs: DashMap<String, Arc<RwLock<KnowledgeGraph>>>,
}

impl GraphService {
    pub fn new(
        store: Arc<FileStore>,
        builder: GraphBuilder,
        alias_learner: Arc<AliasLearner>,
    ) -> Self {
        Self { store, builder, alias_learner, graphs: DashMap::new() }
    }

    /// Build a merged KG from schemas, persist it and register it in memory.
    pub async fn build(
        &self,
        schemas: &[Arc<Schema>],
        kg_name: &str,
        use_llm: bool,
    ) -> EngineResult<GraphStatistics> {
        let kg = self.builder.build_merged(schemas, kg_name, use_llm).await;
        let stats = kg.metadata.statistics.clone().unwrap_or_else(|| kg.compute_statistics());
        self.store.save_graph(&kg)?;
        self.graphs.insert(kg_name.to_string(), Arc::new(RwLock::new(kg)));
        Ok(stats)
    }

    /// Lock-free read: a snapshot clone of the graph. Falls back to the file
    /// store when the graph is not resident.
    pub async fn snapshot(&self, kg_name: &str) -> EngineResult<KnowledgeGraph> {
        let handle = self.handle(kg_name).await?;
        let guard = handle.read().await;
        Ok(guard.clone())
    }

    pub fn list(&self) -> EngineResult<Vec<String>> {
        // the store is the source of truth for existence
        self.store.list_graphs()
    }

    pub async fn delete(&self, kg_name: &str) -> EngineResult<()> {
        self.graphs.remove(kg_name);
        self.store.delete_graph(kg_name)
    }

    /// Merge NL-parsed edges into the KG under the strategy, recompute
    /// statistics and persist. Returns (edges added, statistics).
    pub async fn add_nl_relationships(
        &self,
        kg_name: &str,
        edges: Vec<GraphRelationship>,
        strategy: MergeStrategy,
    ) -> EngineResult<(usize, GraphStatistics)> {
        let handle = self.handle(kg_name).await?;
        let mut kg = handle.write().await;

        let node_ids: HashSet<String> = kg.nodes.iter().map(|n| n.id.clone()).collect();
        let mut added = 0usize;

        for edge in edges {
            // render guard: an edge referring to an unknown node is dropped,
            // never surfaced as an error
            if !node_ids.contains(&edge.source_id) || !node_ids.contains(&edge.target_id) {
                tracing::warn!(
                    "Dropping relationship with unknown node: {} -> {}",
                    edge.source_id,
                    edge.target_id
                );
                continue;
            }
            if strategy == MergeStrategy::HighConfidence && edge.confidence < 0.7 {
                tracing::debug!(
                    "high_confidence strategy drops edge {} -> {} ({:.2})",
                    edge.source_id,
                    edge.target_id,
                    edge.confidence
                );
                continue;
            }
            if kg.add_relationship(edge) {
                added += 1;
            }
        }

        let stats = kg.compute_statistics();
        kg.metadata.statistics = Some(stats.clone());
        self.store.save_graph(&kg)?;
        tracing::info!(
            "Integrated {} NL relationships into '{}' ({} total edges)",
            added,
            kg_name,
            stats.total_relationships
        );
        Ok((added, stats))
    }

    /// O(|edges|) statistics over the current graph state.
    pub async fn statistics(&self, kg_name: &str) -> EngineResult<GraphStatistics> {
        let handle = self.handle(kg_name).await?;
        let guard = handle.read().await;
        Ok(guard.compute_statistics())
    }

    /// Re-run alias learning for every table of the given schemas. Existing
    /// aliases survive unless the new learner reports higher confidence.
    pub async fn learn_aliases(
        &self,
        kg_name: &str,
        schemas: &[Arc<Schema>],
        use_llm: bool,
    ) -> EngineResult<usize> {
        let handle = self.handle(kg_name).await?;
        let mut kg = handle.write().await;

        for schema in schemas {
            for table in &schema.tables {
                self.alias_learner.learn_into(&mut kg, table, use_llm).await;
            }
        }
        let learned = kg.table_aliases.values().map(|v| v.len()).sum();
        self.store.save_graph(&kg)?;
        Ok(learned)
    }

    async fn handle(&self, kg_name: &str) -> EngineResult<Arc<RwLock<KnowledgeGraph>>> {
        if let Some(handle) = self.graphs.get(kg_name) {
            return Ok(Arc::clone(&handle));
        }
        // not resident: load from storage and register
        let kg = self.store.load_graph(kg_name)?;
        let handle = Arc::new(RwLock::new(kg));
        self.graphs.insert(kg_name.to_string(), Arc::clone(&handle));
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use crate::models::{RelationshipOrigin, table_node_id};
    use crate::services::llm::LlmService;
    use std::collections::HashMap;

    fn service() -> (GraphService, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!("tessera_gs_{}", uuid::Uuid::new_v4()));
        let store = Arc::new(FileStore::new(&dir, None));
        let llm = Arc::new(LlmService::new(LlmConfig::default()));
        let learner = Arc::new(AliasLearner::new(Arc::clone(&llm)));
        (
            GraphService::new(store, GraphBuilder::new(Arc::clone(&learner)), learner),
            dir,
        )
    }

    fn seeded_graph() -> KnowledgeGraph {
        let mut kg = KnowledgeGraph::new("demo", vec!["a".to_string()]);
        kg.add_table_node("orders", HashMap::new());
        kg.add_table_node("customers", HashMap::new());
        kg
    }

    fn nl_edge(src: &str, tgt: &str, confidence: f64) -> GraphRelationship {
        GraphRelationship {
            source_id: table_node_id(src),
            target_id: table_node_id(tgt),
            relationship_type: "MATCHES".to_string(),
            properties: HashMap::new(),
            source_column: Some("customer_id".to_string()),
            target_column: Some("cust_id".to_string()),
            confidence,
            origin: RelationshipOrigin::NaturalLanguage,
            cardinality: None,
            reasoning: None,
        }
    }

    #[tokio::test]
    async fn integrate_persists_and_deduplicates() {
        let (service, dir) = service();
        let kg = seeded_graph();
        service.store.save_graph(&kg).unwrap();

        let (added, stats) = service
            .add_nl_relationships(
                "demo",
                vec![nl_edge("orders", "customers", 0.9), nl_edge("orders", "customers", 0.8)],
                MergeStrategy::Deduplicate,
            )
            .await
            .expect("integrate");

        assert_eq!(added, 1);
        assert_eq!(stats.total_relationships, 1);
        assert_eq!(stats.by_origin.get("natural_language"), Some(&1));

        // persisted through the store
        let reloaded = service.store.load_graph("demo").unwrap();
        assert_eq!(reloaded.relationships.len(), 1);
        assert_eq!(reloaded.relationships[0].confidence, 0.9);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn high_confidence_strategy_drops_weak_incoming_edges() {
        let (service, dir) = service();
        service.store.save_graph(&seeded_graph()).unwrap();

        let (added, _) = service
            .add_nl_relationships(
                "demo",
                vec![nl_edge("orders", "customers", 0.65)],
                MergeStrategy::HighConfidence,
            )
            .await
            .expect("integrate");
        assert_eq!(added, 0);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn orphan_edges_are_dropped_silently() {
        let (service, dir) = service();
        service.store.save_graph(&seeded_graph()).unwrap();

        let (added, _) = service
            .add_nl_relationships(
                "demo",
                vec![nl_edge("orders", "ghosts", 0.95)],
                MergeStrategy::Union,
            )
            .await
            .expect("no error for orphans");
        assert_eq!(added, 0);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn missing_graph_is_not_found() {
        let (service, dir) = service();
        let err = service.snapshot("nope").await.unwrap_err();
        assert!(matches!(err, EngineError::GraphNotFound(_)));
        let _ = std::fs::remove_dir_all(dir);
    }
}
