//! Shared fixtures for the end-to-end tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::models::{
    Column, GraphRelationship, KnowledgeGraph, RelationshipOrigin, Schema, Table, table_node_id,
};
use crate::services::db::QueryBackend;
use crate::utils::{EngineError, EngineResult};

pub fn column(name: &str) -> Column {
    Column {
        name: name.to_string(),
        data_type: "varchar".to_string(),
        nullable: true,
        primary_key: false,
        foreign_key: None,
        description: None,
    }
}

pub fn pk(name: &str) -> Column {
    Column { primary_key: true, ..column(name) }
}

pub fn table(name: &str, columns: Vec<Column>) -> Table {
    Table { name: name.to_string(), description: None, columns }
}

pub fn schema(name: &str, tables: Vec<Table>) -> Arc<Schema> {
    Arc::new(Schema { name: name.to_string(), connection_url: None, tables })
}

pub fn edge(src: &str, sc: &str, tgt: &str, tc: &str, confidence: f64) -> GraphRelationship {
    GraphRelationship {
        source_id: table_node_id(src),
        target_id: table_node_id(tgt),
        relationship_type: "CROSS_SCHEMA_REFERENCE".to_string(),
        properties: HashMap::new(),
        source_column: Some(sc.to_string()),
        target_column: Some(tc.to_string()),
        confidence,
        origin: RelationshipOrigin::AutoDetected,
        cardinality: None,
        reasoning: None,
    }
}

/// The GPU-planning demo graph used by the NL-to-SQL scenarios:
/// RBP -> OPS Excel -> HANA material master, with business aliases.
pub fn gpu_planning_graph() -> KnowledgeGraph {
    let mut kg = KnowledgeGraph::new("gpu_planning", vec!["rbp".to_string(), "ops".to_string()]);
    kg.add_table_node("brz_lnd_RBP_GPU", HashMap::new());
    kg.add_table_node("brz_lnd_OPS_EXCEL_GPU", HashMap::new());
    kg.add_table_node("hana_material_master", HashMap::new());
    kg.add_alias("brz_lnd_RBP_GPU", "RBP");
    kg.add_alias("brz_lnd_RBP_GPU", "RBP GPU");
    kg.add_alias("brz_lnd_OPS_EXCEL_GPU", "OPS Excel");
    kg.add_relationship(edge(
        "brz_lnd_RBP_GPU",
        "Material",
        "brz_lnd_OPS_EXCEL_GPU",
        "PLANNING_SKU",
        0.9,
    ));
    kg.add_relationship(edge(
        "brz_lnd_OPS_EXCEL_GPU",
        "PLANNING_SKU",
        "hana_material_master",
        "MATERIAL",
        0.85,
    ));
    kg
}

/// Backend whose prefixed queries fail with an unknown-object error and whose
/// unprefixed queries return `rows` rows.
pub struct PrefixFallbackBackend {
    rows: usize,
    pub executed: Mutex<Vec<String>>,
}

impl PrefixFallbackBackend {
    pub fn new(rows: usize) -> Self {
        Self { rows, executed: Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl QueryBackend for PrefixFallbackBackend {
    async fn query(&self, sql: &str) -> EngineResult<(Vec<String>, Vec<Vec<String>>)> {
        self.executed.lock().unwrap().push(sql.to_string());
        if sql.contains("`.`") || sql.contains("].[") {
            return Err(EngineError::SchemaObjectNotFound(format!(
                "Table referenced by a schema prefix doesn't exist: {}",
                &sql[..sql.len().min(60)]
            )));
        }
        let columns = vec!["Material".to_string()];
        let rows = (0..self.rows).map(|i| vec![format!("MAT{:05}", i)]).collect();
        Ok((columns, rows))
    }

    async fn close(&self) {}
}
