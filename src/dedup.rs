//! C7 — three-stage entity deduplicator: kNN + WCC over embeddings, edit-
//! distance candidate refinement, LLM arbitration.
//!
//! Grounded in `original_source/my_packages/GraphAbout.py::knn_similarity`
//! (GDS `knn.write` + `wcc.write`, reimplemented here over an in-memory
//! `petgraph::UnGraph` since no GDS binding exists for `neo4rs`) and
//! `my_packages/LLMAbout.py::decide_entity_merge` (the arbitration prompt's
//! merge rules). `petgraph` itself is grounded in
//! `other_examples/9b7d1a58_Enderchefcoder-RSN_DB__src-graph_rag.rs.rs`,
//! which builds an analogous `UnGraph` for a RAG entity graph; `strsim` has
//! no pack precedent and is the standard ecosystem crate for edit distance
//! (see DESIGN.md).

use std::collections::{HashMap, HashSet};

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::{Dfs, IntoNodeIdentifiers};
use tracing::info;

use crate::config::{AppConfig, DedupConfig};
use crate::errors::Result;
use crate::graph::projection;
use crate::llm::{self, LlmClient};
use crate::models::EntityNode;

fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Stage 1: build the `SIMILAR` projection and its weakly-connected
/// components. Returns components of size >= 2 (singletons can never merge).
fn knn_components(entities: &[EntityNode], similarity_cutoff: f64) -> Vec<Vec<usize>> {
    let mut graph: UnGraph<usize, f64> = UnGraph::new_undirected();
    let node_indices: Vec<NodeIndex> = (0..entities.len()).map(|i| graph.add_node(i)).collect();

    for i in 0..entities.len() {
        let Some(emb_i) = &entities[i].embedding else { continue };
        for j in (i + 1)..entities.len() {
            let Some(emb_j) = &entities[j].embedding else { continue };
            let score = cosine_similarity(emb_i, emb_j);
            if score >= similarity_cutoff {
                graph.add_edge(node_indices[i], node_indices[j], score);
            }
        }
    }

    let mut visited: HashSet<NodeIndex> = HashSet::new();
    let mut components: Vec<Vec<usize>> = Vec::new();
    for start in graph.node_identifiers() {
        if visited.contains(&start) {
            continue;
        }
        let mut dfs = Dfs::new(&graph, start);
        let mut component = Vec::new();
        while let Some(node) = dfs.next(&graph) {
            if visited.insert(node) {
                component.push(graph[node]);
            }
        }
        if component.len() >= 2 {
            components.push(component);
        }
    }
    components
}

/// Stage 2: within each kNN component, keep pairs whose case-insensitive
/// edit distance is below the threshold; union overlapping refined pairs
/// into disjoint candidate sets. Components with no concrete label in
/// common (every member `未知`) are rejected outright.
fn refine_candidates(entities: &[EntityNode], components: &[Vec<usize>], cfg: &DedupConfig) -> Vec<Vec<usize>> {
    let mut candidates = Vec::new();

    for component in components {
        let has_concrete_label = component
            .iter()
            .any(|&i| entities[i].entity_type != EntityNode::UNKNOWN_TYPE);
        if !has_concrete_label {
            continue;
        }

        // Union-find restricted to this component's refined pairs.
        let mut parent: HashMap<usize, usize> = component.iter().map(|&i| (i, i)).collect();
        fn find(parent: &mut HashMap<usize, usize>, x: usize) -> usize {
            if parent[&x] != x {
                let root = find(parent, parent[&x]);
                parent.insert(x, root);
            }
            parent[&x]
        }

        for a in 0..component.len() {
            for b in (a + 1)..component.len() {
                let (i, j) = (component[a], component[b]);
                let name_i = entities[i].id.to_lowercase();
                let name_j = entities[j].id.to_lowercase();
                let distance = strsim::levenshtein(&name_i, &name_j);
                if distance < cfg.word_edit_distance {
                    let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                    if ri != rj {
                        parent.insert(ri, rj);
                    }
                }
            }
        }

        let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
        for &i in component {
            let root = find(&mut parent, i);
            groups.entry(root).or_default().push(i);
        }
        for group in groups.into_values() {
            if group.len() >= 2 {
                candidates.push(group);
            }
        }
    }

    candidates
}

fn build_arbitration_prompt(names: &[&str]) -> (String, String) {
    let system = "你是一个医学实体消歧助手。给定一组候选实体名称，判断它们中哪些真正指向同一个现实世界的实体。\n\
        规则：\n\
        1. 纯数字、日期或型号（如剂量、批号）不与其他实体合并。\n\
        2. 纯概念实体与纯具体对象实体不互相合并。\n\
        3. 只有语义等价的名称变体（同义词、缩写、全称/简称）才合并。\n\
        4. 如果不确定，不要合并。\n\
        5. 每一行输出一个应合并的子组，成员用 \" | \" 分隔；不应合并的实体不要输出。"
        .to_string();
    let user = format!("候选实体：{}", names.join("、"));
    (system, user)
}

/// Stage 3: ask the LLM which subgroups of a candidate set are the same
/// real-world entity. Returns disjoint merge groups (survivor first).
async fn arbitrate(client: &LlmClient, entities: &[EntityNode], candidate: &[usize]) -> Vec<Vec<String>> {
    let names: Vec<&str> = candidate.iter().map(|&i| entities[i].id.as_str()).collect();
    let (system, user) = build_arbitration_prompt(&names);

    match client.complete_with_mode(&system, &user, crate::llm::ChatMode::Deterministic).await {
        Ok(raw) => raw
            .lines()
            .filter_map(|line| {
                let members: Vec<String> = line
                    .split('|')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                (members.len() >= 2).then_some(members)
            })
            .collect(),
        Err(e) => {
            llm::log_skip("entity merge arbitration", &e);
            Vec::new()
        }
    }
}

/// Runs the full three-stage deduplication pass and applies confirmed
/// merges. Returns the number of merge groups applied.
pub async fn deduplicate_entities(graph: &neo4rs::Graph, client: &LlmClient, cfg: &AppConfig) -> Result<usize> {
    let entities = projection::fetch_embedded_entities(graph).await?;
    if entities.len() < 2 {
        return Ok(0);
    }

    let components = knn_components(&entities, cfg.dedup.similarity_cutoff);
    let candidates = refine_candidates(&entities, &components, &cfg.dedup);
    info!(
        "dedup: {} kNN components, {} refined candidate sets",
        components.len(),
        candidates.len()
    );

    let mut merge_count = 0;
    for candidate in &candidates {
        let groups = arbitrate(client, &entities, candidate).await;
        for group in groups {
            if group.len() < 2 {
                continue;
            }
            let survivor = group[0].clone();
            let duplicates = group[1..].to_vec();
            projection::merge_entities(graph, &survivor, &duplicates).await?;
            merge_count += 1;
        }
    }

    crate::embedder::embed_pending_entities(graph, client, cfg.concurrency.max_concurrency).await?;
    Ok(merge_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(id: &str, entity_type: &str, embedding: Vec<f64>) -> EntityNode {
        EntityNode {
            id: id.to_string(),
            entity_type: entity_type.to_string(),
            description: String::new(),
            embedding: Some(embedding),
        }
    }

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn knn_components_groups_only_above_cutoff() {
        let entities = vec![
            entity("A", "药物", vec![1.0, 0.0]),
            entity("B", "药物", vec![0.999, 0.001]),
            entity("C", "疾病", vec![0.0, 1.0]),
        ];
        let components = knn_components(&entities, 0.94);
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].len(), 2);
    }

    #[test]
    fn components_with_only_unknown_type_are_rejected() {
        let entities = vec![
            entity("X", EntityNode::UNKNOWN_TYPE, vec![1.0, 0.0]),
            entity("Y", EntityNode::UNKNOWN_TYPE, vec![0.999, 0.001]),
        ];
        let cfg = DedupConfig::default();
        let components = knn_components(&entities, 0.9);
        let candidates = refine_candidates(&entities, &components, &cfg);
        assert!(candidates.is_empty());
    }

    #[test]
    fn refine_candidates_keeps_close_names() {
        let entities = vec![
            entity("阿司匹林", "药物", vec![1.0, 0.0]),
            entity("阿斯匹林", "药物", vec![0.999, 0.001]),
        ];
        let cfg = DedupConfig::default();
        let components = knn_components(&entities, 0.9);
        let candidates = refine_candidates(&entities, &components, &cfg);
        assert_eq!(candidates.len(), 1);
    }
}
