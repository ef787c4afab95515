//! Join Planner
//!
//! Finds minimal join paths between table nodes with an undirected BFS over
//! KG relationships. Returned path elements are original-case labels, never
//! lowercased ids. When two tables share no edge the caller must fail the
//! query - placeholder `id = id` joins are never produced.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::models::{KnowledgeGraph, NodeKind, RelationshipOrigin};

/// Ordered table labels from `source` to `target` (inclusive), or empty when
/// no path exists. Minimum hop count wins; ties prefer the path with the
/// highest average edge confidence, then the one using NL-originated edges.
pub fn find_join_path(kg: &KnowledgeGraph, source_label: &str, target_label: &str) -> Vec<String> {
    let id_of = |label: &str| crate::models::table_node_id(label);
    let source_id = id_of(source_label);
    let target_id = id_of(target_label);

    if kg.node(&source_id).is_none() || kg.node(&target_id).is_none() {
        return Vec::new();
    }
    if source_id == target_id {
        return vec![label_of(kg, &source_id).unwrap_or_else(|| source_label.to_string())];
    }

    // adjacency over table nodes, undirected
    let mut adjacency: HashMap<&str, Vec<(&str, f64, bool)>> = HashMap::new();
    let table_ids: HashSet<&str> = kg
        .nodes
        .iter()
        .filter(|n| n.kind == NodeKind::Table)
        .map(|n| n.id.as_str())
        .collect();
    for rel in &kg.relationships {
        if !table_ids.contains(rel.source_id.as_str())
            || !table_ids.contains(rel.target_id.as_str())
        {
            continue;
        }
        let nl = rel.origin == RelationshipOrigin::NaturalLanguage;
        adjacency
            .entry(rel.source_id.as_str())
            .or_default()
            .push((rel.target_id.as_str(), rel.confidence, nl));
        adjacency
            .entry(rel.target_id.as_str())
            .or_default()
            .push((rel.source_id.as_str(), rel.confidence, nl));
    }

    // BFS collecting all shortest paths, then rank
    let mut best: Option<(Vec<String>, f64, usize)> = None; // (path ids, conf sum, nl edges)
    let mut depth_of: HashMap<String, usize> = HashMap::new();
    depth_of.insert(source_id.clone(), 0);
    let mut queue: VecDeque<(Vec<String>, f64, usize)> = VecDeque::new();
    queue.push_back((vec![source_id.clone()], 0.0, 0));
    let mut shortest_len: Option<usize> = None;

    while let Some((path, conf_sum, nl_count)) = queue.pop_front() {
        let current = path.last().expect("non-empty path").clone();
        if let Some(limit) = shortest_len
            && path.len() > limit
        {
            break;
        }
        if current == target_id {
            shortest_len = Some(path.len());
            let replace = match &best {
                None => true,
                Some((_, best_conf, best_nl)) => {
                    conf_sum > *best_conf || (conf_sum == *best_conf && nl_count > *best_nl)
                },
            };
            if replace {
                best = Some((path, conf_sum, nl_count));
            }
            continue;
        }
        let Some(neighbors) = adjacency.get(current.as_str()) else { continue };
        for &(next, confidence, nl) in neighbors {
            let next_depth = path.len();
            match depth_of.get(next) {
                // allow revisits at the same BFS depth so ties compete
                Some(&d) if d < next_depth => continue,
                _ => {},
            }
            if path.iter().any(|p| p == next) {
                continue;
            }
            depth_of.insert(next.to_string(), next_depth);
            let mut new_path = path.clone();
            new_path.push(next.to_string());
            queue.push_back((new_path, conf_sum + confidence, nl_count + usize::from(nl)));
        }
    }

    let Some((id_path, _, _)) = best else { return Vec::new() };

    // map ids back to original-case labels, collapsing consecutive repeats
    let mut labels: Vec<String> = Vec::with_capacity(id_path.len());
    for id in &id_path {
        let Some(label) = label_of(kg, id) else { return Vec::new() };
        if labels
            .last()
            .is_some_and(|prev: &String| prev.to_lowercase() == label.to_lowercase())
        {
            continue;
        }
        labels.push(label);
    }
    labels
}

/// The real join columns between two tables, scanning edges in either
/// direction. Returns `(col_on_table1, col_on_table2)` or None when no edge
/// carries column information.
pub fn join_condition(
    kg: &KnowledgeGraph,
    table1: &str,
    table2: &str,
) -> Option<(String, String)> {
    let id1 = crate::models::table_node_id(table1);
    let id2 = crate::models::table_node_id(table2);

    for rel in &kg.relationships {
        if rel.source_id == id1 && rel.target_id == id2 {
            if let (Some(sc), Some(tc)) = (&rel.source_column, &rel.target_column) {
                return Some((sc.clone(), tc.clone()));
            }
        } else if rel.source_id == id2
            && rel.target_id == id1
            && let (Some(sc), Some(tc)) = (&rel.source_column, &rel.target_column)
        {
            // reversed edge: swap column order to match the caller's tables
            return Some((tc.clone(), sc.clone()));
        }
    }
    None
}

fn label_of(kg: &KnowledgeGraph, id: &str) -> Option<String> {
    kg.node(id).map(|n| n.label.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GraphRelationship, KnowledgeGraph};
    use std::collections::HashMap;

    fn edge(src: &str, tgt: &str, sc: &str, tc: &str, confidence: f64) -> GraphRelationship {
        GraphRelationship {
            source_id: crate::models::table_node_id(src),
            target_id: crate::models::table_node_id(tgt),
            relationship_type: "REFERENCES".to_string(),
            properties: HashMap::new(),
            source_column: Some(sc.to_string()),
            target_column: Some(tc.to_string()),
            confidence,
            origin: RelationshipOrigin::AutoDetected,
            cardinality: None,
            reasoning: None,
        }
    }

    fn chain_graph() -> KnowledgeGraph {
        let mut kg = KnowledgeGraph::new("test", vec![]);
        kg.add_table_node("brz_lnd_RBP_GPU", HashMap::new());
        kg.add_table_node("brz_lnd_OPS_EXCEL_GPU", HashMap::new());
        kg.add_table_node("hana_material_master", HashMap::new());
        kg.add_relationship(edge(
            "brz_lnd_RBP_GPU",
            "brz_lnd_OPS_EXCEL_GPU",
            "Material",
            "PLANNING_SKU",
            0.9,
        ));
        kg.add_relationship(edge(
            "brz_lnd_OPS_EXCEL_GPU",
            "hana_material_master",
            "PLANNING_SKU",
            "MATERIAL",
            0.8,
        ));
        kg
    }

    #[test]
    fn direct_path_preserves_case() {
        let kg = chain_graph();
        let path = find_join_path(&kg, "brz_lnd_rbp_gpu", "BRZ_LND_OPS_EXCEL_GPU");
        assert_eq!(path, vec!["brz_lnd_RBP_GPU", "brz_lnd_OPS_EXCEL_GPU"]);
        // every element is a node label, no consecutive self-joins
        for pair in path.windows(2) {
            assert_ne!(pair[0].to_lowercase(), pair[1].to_lowercase());
        }
    }

    #[test]
    fn multi_hop_path() {
        let kg = chain_graph();
        let path = find_join_path(&kg, "brz_lnd_RBP_GPU", "hana_material_master");
        assert_eq!(
            path,
            vec!["brz_lnd_RBP_GPU", "brz_lnd_OPS_EXCEL_GPU", "hana_material_master"]
        );
    }

    #[test]
    fn no_path_returns_empty() {
        let mut kg = chain_graph();
        kg.add_table_node("isolated", HashMap::new());
        assert!(find_join_path(&kg, "brz_lnd_RBP_GPU", "isolated").is_empty());
        assert!(find_join_path(&kg, "brz_lnd_RBP_GPU", "missing_table").is_empty());
    }

    #[test]
    fn shortest_path_wins_over_longer() {
        let mut kg = chain_graph();
        // add a direct low-confidence edge RBP -> hana; 1 hop beats 2 hops
        kg.add_relationship(edge(
            "brz_lnd_RBP_GPU",
            "hana_material_master",
            "Material",
            "MATERIAL",
            0.3,
        ));
        let path = find_join_path(&kg, "brz_lnd_RBP_GPU", "hana_material_master");
        assert_eq!(path.len(), 2);
    }

    #[test]
    fn tie_break_prefers_higher_confidence() {
        let mut kg = KnowledgeGraph::new("test", vec![]);
        for t in ["a", "mid1", "mid2", "z"] {
            kg.add_table_node(t, HashMap::new());
        }
        kg.add_relationship(edge("a", "mid1", "x", "x", 0.4));
        kg.add_relationship(edge("mid1", "z", "x", "x", 0.4));
        kg.add_relationship(edge("a", "mid2", "x", "x", 0.9));
        kg.add_relationship(edge("mid2", "z", "x", "x", 0.9));
        let path = find_join_path(&kg, "a", "z");
        assert_eq!(path, vec!["a", "mid2", "z"]);
    }

    #[test]
    fn join_condition_swaps_reversed_edges() {
        let kg = chain_graph();
        assert_eq!(
            join_condition(&kg, "brz_lnd_RBP_GPU", "brz_lnd_OPS_EXCEL_GPU"),
            Some(("Material".to_string(), "PLANNING_SKU".to_string()))
        );
        assert_eq!(
            join_condition(&kg, "brz_lnd_OPS_EXCEL_GPU", "brz_lnd_RBP_GPU"),
            Some(("PLANNING_SKU".to_string(), "Material".to_string()))
        );
        assert_eq!(join_condition(&kg, "brz_lnd_RBP_GPU", "hana_material_master"), None);
    }

    #[test]
    fn same_table_collapses_to_single_element() {
        let kg = chain_graph();
        let path = find_join_path(&kg, "brz_lnd_RBP_GPU", "BRZ_LND_RBP_GPU");
        assert_eq!(path, vec!["brz_lnd_RBP_GPU"]);
    }
}
