//! C8 — community detection over an in-memory, undirected, `_ALL_`-typed
//! projection of the entity graph.
//!
//! Grounded in `original_source/my_packages/GraphAbout.py::build_communities`
//! (GDS `sllpa.write`, `maxIterations=10000`, `IN_COMMUNITY` edges,
//! `community_rank` via chunk `MENTIONS` count), reimplemented over
//! `petgraph::UnGraph` since `neo4rs` has no GDS binding (see `dedup.rs`).
//!
//! The label-propagation step below is a deterministic variant of
//! Speaker-Listener LPA: each iteration a node adopts the most-frequent
//! label currently held by its neighbours' memories (ties broken by label
//! order) rather than a randomly sampled one, so the whole pass stays
//! reproducible without pulling in a `rand` dependency the corpus never
//! needed. Overlap still comes from the per-node memory history: a label is
//! kept as a final community membership once its frequency across a node's
//! memory clears `memory_threshold`.

use std::collections::{HashMap, HashSet};

use neo4rs::Graph;
use petgraph::graph::{NodeIndex, UnGraph};
use tracing::info;

use crate::config::CommunityConfig;
use crate::errors::Result;
use crate::graph::projection;
use crate::models::CommunityNode;

/// Collapses every typed relationship between two entities into a single
/// undirected `_ALL_` edge whose weight is the count of contributing edges.
fn build_all_projection(entity_ids: &[String], edges: &[(String, String)]) -> (UnGraph<String, f64>, HashMap<String, NodeIndex>) {
    let mut graph: UnGraph<String, f64> = UnGraph::new_undirected();
    let mut index_of: HashMap<String, NodeIndex> = HashMap::new();
    for id in entity_ids {
        index_of.entry(id.clone()).or_insert_with(|| graph.add_node(id.clone()));
    }

    for (source, target) in edges {
        let (Some(&a), Some(&b)) = (index_of.get(source), index_of.get(target)) else {
            continue;
        };
        if a == b {
            continue;
        }
        if let Some(edge) = graph.find_edge(a, b) {
            graph[edge] += 1.0;
        } else {
            graph.add_edge(a, b, 1.0);
        }
    }

    (graph, index_of)
}

/// Runs the deterministic SLPA variant described above. Returns, per node
/// index, the set of community labels (node ids of the representative
/// speaker) that survive the memory-frequency threshold.
fn speaker_listener_lpa(graph: &UnGraph<String, f64>, cfg: &CommunityConfig) -> HashMap<NodeIndex, Vec<String>> {
    let nodes: Vec<NodeIndex> = graph.node_indices().collect();
    if nodes.is_empty() {
        return HashMap::new();
    }

    let mut current_label: HashMap<NodeIndex, String> =
        nodes.iter().map(|&n| (n, graph[n].clone())).collect();
    let mut memory: HashMap<NodeIndex, HashMap<String, usize>> = nodes
        .iter()
        .map(|&n| (n, HashMap::from([(graph[n].clone(), 1usize)])))
        .collect();

    let effective_iterations = cfg.max_iterations.min(200);
    for _ in 0..effective_iterations {
        let mut next_label = current_label.clone();
        let mut changed = false;

        for &node in &nodes {
            let mut votes: HashMap<String, usize> = HashMap::new();
            for neighbour in graph.neighbors(node) {
                *votes.entry(current_label[&neighbour].clone()).or_insert(0) += 1;
            }
            if votes.is_empty() {
                continue;
            }
            let winner = votes
                .into_iter()
                .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
                .map(|(label, _)| label)
                .unwrap();

            if winner != current_label[&node] {
                changed = true;
            }
            *memory.get_mut(&node).unwrap().entry(winner.clone()).or_insert(0) += 1;
            next_label.insert(node, winner);
        }

        current_label = next_label;
        if !changed {
            break;
        }
    }

    memory
        .into_iter()
        .map(|(node, counts)| {
            let total: usize = counts.values().sum();
            let mut labels: Vec<String> = counts
                .into_iter()
                .filter(|(_, count)| (*count as f64) / (total as f64) >= cfg.memory_threshold)
                .map(|(label, _)| label)
                .collect();
            labels.sort();
            (node, labels)
        })
        .collect()
}

/// Runs the full community-detection pass and writes `:__Community__` nodes
/// plus `IN_COMMUNITY` edges at level 0, with `community_rank` computed from
/// chunk coverage.
pub async fn build_communities(graph: &Graph, cfg: &CommunityConfig) -> Result<usize> {
    let (entities, relationships) = projection::fetch_full_projection(graph).await?;
    if entities.is_empty() {
        return Ok(0);
    }

    let entity_ids: Vec<String> = entities.iter().map(|e| e.id.clone()).collect();
    let edges: Vec<(String, String)> = relationships
        .iter()
        .map(|r| (r.source_id.clone(), r.target_id.clone()))
        .collect();

    let (projection_graph, index_of) = build_all_projection(&entity_ids, &edges);
    let labels_by_node = speaker_listener_lpa(&projection_graph, cfg);

    // community label (a representative entity id) -> member entity ids
    let mut members_by_label: HashMap<String, HashSet<String>> = HashMap::new();
    for (entity_id, &node) in &index_of {
        for label in labels_by_node.get(&node).into_iter().flatten() {
            members_by_label.entry(label.clone()).or_default().insert(entity_id.clone());
        }
    }

    let mut written = 0;
    for (cid, (label, members)) in members_by_label.into_iter().enumerate() {
        if members.len() < 2 {
            continue;
        }
        let community_id = format!("0-{cid}");
        for entity_id in &members {
            projection::write_in_community_edge(graph, entity_id, &community_id).await?;
        }
        let rank = projection::compute_community_rank(graph, &community_id).await?;
        projection::write_community(
            graph,
            &CommunityNode {
                id: community_id,
                level: 0,
                summary: None,
                community_rank: rank,
                weight: members.len() as f64,
            },
        )
        .await?;
        written += 1;
        let _ = label; // label is the representative id, kept only for readability while debugging
    }

    info!("community builder: wrote {written} communities from {} entities", entities.len());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_projection_aggregates_parallel_edges_into_one_weighted_edge() {
        let ids = vec!["A".to_string(), "B".to_string()];
        let edges = vec![
            ("A".to_string(), "B".to_string()),
            ("A".to_string(), "B".to_string()),
            ("B".to_string(), "A".to_string()),
        ];
        let (graph, index_of) = build_all_projection(&ids, &edges);
        let edge = graph.find_edge(index_of["A"], index_of["B"]).unwrap();
        assert_eq!(graph[edge], 3.0);
    }

    #[test]
    fn slpa_groups_a_fully_connected_triangle_together() {
        let ids = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let edges = vec![
            ("A".to_string(), "B".to_string()),
            ("B".to_string(), "C".to_string()),
            ("A".to_string(), "C".to_string()),
        ];
        let (graph, index_of) = build_all_projection(&ids, &edges);
        let cfg = CommunityConfig {
            max_iterations: 50,
            memory_threshold: 0.1,
        };
        let labels = speaker_listener_lpa(&graph, &cfg);

        let label_a = &labels[&index_of["A"]];
        let label_b = &labels[&index_of["B"]];
        let label_c = &labels[&index_of["C"]];
        let common = label_a.iter().find(|l| label_b.contains(l) && label_c.contains(l));
        assert!(common.is_some(), "triangle should share at least one community label");
    }

    #[test]
    fn isolated_nodes_never_form_a_community() {
        let ids = vec!["X".to_string(), "Y".to_string()];
        let edges = vec![];
        let (graph, _) = build_all_projection(&ids, &edges);
        let cfg = CommunityConfig::default();
        let labels = speaker_listener_lpa(&graph, &cfg);
        for node in graph.node_indices() {
            assert_eq!(labels[&node].len(), 1);
            assert_eq!(labels[&node][0], graph[node]);
        }
    }
}
