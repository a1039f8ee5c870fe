//! C10 — local retriever: vector search over entities, 1-hop graph
//! expansion, LLM answer grounded in the assembled context.
//!
//! Grounded in `original_source/query.py`'s `lc_retrieval_query` revision
//! (the one carrying the `Reports` field) and `my_packages/AgentAbout.py`'s
//! `lc_system_prompt`, whose citation schema fixes the `Entities / Reports /
//! Relationships / Chunks` field names reused as section headers below.

use neo4rs::Graph;

use crate::config::{AppConfig, LocalRetrievalConfig};
use crate::errors::Result;
use crate::graph::retrieval_io::{self, LocalContext};
use crate::llm::LlmClient;

const LOCAL_SYSTEM_PROMPT: &str = "你是一个医学知识图谱问答助手。下面提供了与用户问题相关的实体、关系、来源文本片段和社区摘要。请仅依据这些材料用中文回答问题；如果材料不足以回答，请明确说明不知道。";

fn format_context(ctx: &LocalContext) -> String {
    let entities = ctx
        .neighbour_entities
        .iter()
        .map(|e| format!("- {}（{}）：{}", e.id, e.entity_type, e.description))
        .collect::<Vec<_>>()
        .join("\n");

    let inside = ctx
        .inside_relationships
        .iter()
        .map(|r| format!("- {} —[{}]→ {}：{}（权重 {}）", r.source_id, r.rel_type, r.target_id, r.description, r.weight))
        .collect::<Vec<_>>()
        .join("\n");
    let outside = ctx
        .outside_relationships
        .iter()
        .map(|r| format!("- {} —[{}]→ {}：{}（权重 {}）", r.source_id, r.rel_type, r.target_id, r.description, r.weight))
        .collect::<Vec<_>>()
        .join("\n");

    let chunks = ctx
        .chunks
        .iter()
        .map(|c| format!("- [{}] {}", c.file_name, c.text))
        .collect::<Vec<_>>()
        .join("\n");

    let reports = ctx
        .communities
        .iter()
        .filter_map(|c| c.summary.as_ref().map(|s| format!("- [{}] {}", c.id, s)))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Entities:\n{entities}\n\nRelationships:\n{inside}\n{outside}\n\nChunks:\n{chunks}\n\nReports:\n{reports}"
    )
}

/// Runs the full local-retrieval algorithm and returns the
/// generated answer text.
pub async fn answer_local(graph: &Graph, client: &LlmClient, cfg: &AppConfig, question: &str) -> Result<String> {
    let LocalRetrievalConfig {
        top_entities,
        top_chunks,
        top_communities,
        top_outside_rels,
        top_inside_rels,
    } = cfg.local_retrieval;

    let query_embedding = client
        .embed_texts(std::slice::from_ref(&question.to_string()))
        .await?
        .into_iter()
        .next()
        .unwrap_or_default();

    let seeds = retrieval_io::vector_search_entities(graph, &query_embedding, top_entities).await?;
    let seed_ids: Vec<String> = seeds.iter().map(|s| s.entity.id.clone()).collect();
    if seed_ids.is_empty() {
        return Ok("未能在知识图谱中找到与问题相关的实体。".to_string());
    }

    let context = retrieval_io::fetch_local_context(
        graph,
        &seed_ids,
        top_chunks,
        top_communities,
        top_inside_rels,
        top_outside_rels,
    )
    .await?;

    let context_block = format_context(&context);
    let user_prompt = format!("问题：{question}\n\n相关材料：\n{context_block}");
    let answer = client.complete(LOCAL_SYSTEM_PROMPT, &user_prompt).await?;
    Ok(answer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkNode, CommunityNode, EntityNode, RelationshipEdge};

    #[test]
    fn format_context_includes_all_four_named_sections() {
        let ctx = LocalContext {
            neighbour_entities: vec![EntityNode {
                id: "阿司匹林".into(),
                entity_type: "药物".into(),
                description: "抗血小板药".into(),
                embedding: None,
            }],
            inside_relationships: vec![],
            outside_relationships: vec![RelationshipEdge {
                source_id: "阿司匹林".into(),
                target_id: "缺血性脑卒中".into(),
                rel_type: "用于治疗".into(),
                description: "预防复发".into(),
                weight: 9.0,
            }],
            chunks: vec![ChunkNode {
                id: "c1".into(),
                text: "阿司匹林常用于脑卒中二级预防。".into(),
                position: 1,
                length: 10,
                file_name: "doc1.txt".into(),
                content_offset: 0,
                tokens: 10,
            }],
            communities: vec![CommunityNode {
                id: "0-1".into(),
                level: 0,
                summary: Some("该社区讨论脑卒中与抗血小板治疗。".into()),
                community_rank: 3,
                weight: 2.0,
            }],
        };
        let text = format_context(&ctx);
        assert!(text.contains("Entities:"));
        assert!(text.contains("Relationships:"));
        assert!(text.contains("Chunks:"));
        assert!(text.contains("Reports:"));
        assert!(text.contains("阿司匹林"));
    }
}
