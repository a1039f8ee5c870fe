//! C11 — global retriever: map community summaries to scored points in
//! parallel, then reduce to one cited answer.
//!
//! Grounded in `original_source/my_packages/QueryAbout.py::global_retriever`
//! (`evaluate_system_prompt`'s 0-100 scoring rubric, `ThreadPoolExecutor`
//! fan-out reimplemented as a `Semaphore`-bounded `JoinSet`, the `score >= 60`
//! filter) and `AgentAbout.py`'s citation JSON schema for the reduce stage's
//! per-point community-id citations.

use std::sync::Arc;

use neo4rs::Graph;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::GlobalRetrievalConfig;
use crate::errors::Result;
use crate::graph::retrieval_io;
use crate::llm::{self, LlmClient};

const MAP_SYSTEM_PROMPT: &str = "你是一个医学知识图谱问答助手的评分模块。给定一个社区摘要和用户问题，判断该摘要与问题的相关性（0-100分），并从摘要中提取若干与问题相关的要点。严格按如下 JSON 格式输出，不要输出其他内容：\n{\"points\": [{\"description\": \"要点内容\", \"score\": 0-100}]}";

const REDUCE_SYSTEM_PROMPT: &str = "你是一个医学知识图谱问答助手。下面是若干来自不同社区的相关要点，每个要点都标注了其来源社区编号。请综合这些要点用中文回答用户问题，并在相关陈述后以 [社区编号] 的形式标注引用来源。如果材料不足以回答，请明确说明不知道。";

#[derive(Debug, Deserialize)]
struct MapPoint {
    description: String,
    score: i64,
}

#[derive(Debug, Deserialize, Default)]
struct MapResponse {
    #[serde(default)]
    points: Vec<MapPoint>,
}

struct ScoredPoint {
    community_id: String,
    description: String,
    score: i64,
}

fn parse_map_response(raw: &str) -> Vec<MapPoint> {
    let cleaned = raw.trim().trim_start_matches("```json").trim_end_matches("```").trim();
    serde_json::from_str::<MapResponse>(cleaned).map(|r| r.points).unwrap_or_default()
}

async fn map_one(client: &LlmClient, question: &str, community_id: &str, summary: &str, threshold: i64) -> Vec<ScoredPoint> {
    let user_prompt = format!("问题：{question}\n\n社区摘要：\n{summary}");
    match client
        .complete_with_mode(MAP_SYSTEM_PROMPT, &user_prompt, crate::llm::ChatMode::Deterministic)
        .await
    {
        Ok(raw) => parse_map_response(&raw)
            .into_iter()
            .filter(|p| p.score >= threshold)
            .map(|p| ScoredPoint {
                community_id: community_id.to_string(),
                description: p.description,
                score: p.score,
            })
            .collect(),
        Err(e) => {
            llm::log_skip(&format!("global map stage for community {community_id}"), &e);
            Vec::new()
        }
    }
}

/// Runs the full global map/reduce algorithm and returns the
/// generated answer text.
pub async fn answer_global(
    graph: &Graph,
    client: Arc<LlmClient>,
    cfg: &GlobalRetrievalConfig,
    max_concurrency: usize,
    question: &str,
) -> Result<String> {
    let communities = retrieval_io::fetch_all_community_summaries(graph, cfg.community_level).await?;
    if communities.is_empty() {
        return Ok("知识图谱中还没有生成任何社区摘要。".to_string());
    }

    let semaphore = Arc::new(Semaphore::new(max_concurrency));
    let question = Arc::new(question.to_string());
    let threshold = cfg.score_threshold;
    let mut tasks = JoinSet::new();

    for community in communities {
        let Some(summary) = community.summary.clone() else { continue };
        let semaphore = semaphore.clone();
        let client = client.clone();
        let question = question.clone();
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            map_one(&client, &question, &community.id, &summary, threshold).await
        });
    }

    let mut points = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        if let Ok(mut batch) = joined {
            points.append(&mut batch);
        }
    }

    if points.is_empty() {
        return Ok("没有找到与问题相关度足够高的社区摘要。".to_string());
    }

    points.sort_by_key(|p| std::cmp::Reverse(p.score));
    let combined = points
        .iter()
        .map(|p| format!("[{}] （相关度 {}）{}", p.community_id, p.score, p.description))
        .collect::<Vec<_>>()
        .join("\n");

    let user_prompt = format!("问题：{question}\n\n候选要点：\n{combined}");
    let answer = client.complete(REDUCE_SYSTEM_PROMPT, &user_prompt).await?;
    Ok(answer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_map_response_reads_points_from_fenced_json() {
        let raw = "```json\n{\"points\": [{\"description\": \"阿司匹林用于二级预防\", \"score\": 85}]}\n```";
        let points = parse_map_response(raw);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].score, 85);
    }

    #[test]
    fn malformed_json_yields_no_points() {
        assert!(parse_map_response("not json at all").is_empty());
    }
}
