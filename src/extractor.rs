//! C4 — per-chunk entity/relationship extraction against a fixed
//! tuple-protocol prompt.
//!
//! Grounded in `original_source/my_packages/GraphAbout.py::convert_to_graph_document`
//! (the two regexes below are a direct port of its entity/relationship
//! patterns) for the record shape, and in the bounded-concurrency-per-chunk
//! extraction shape used elsewhere in the crate's LLM call sites. The tuple
//! protocol is used instead of JSON mode because JSON would foreclose the
//! "skip a garbage line, keep the rest" tolerance the source relies on.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

use crate::config::{AppConfig, ExtractionDelimiters};
use crate::llm::{self, LlmClient};
use crate::models::EntityNode;

/// Domain-configured closed set of entity types (representative of a ~48
/// biomedical category taxonomy). Anything outside this list is relabelled `其他`.
pub const ENTITY_TYPES: &[&str] = &[
    "疾病", "症状", "药物", "检查", "手术", "治疗方法", "身体部位", "病原体", "基因", "蛋白质",
    "细胞", "并发症", "危险因素", "剂量", "不良反应", "医学指南", "科室", "医疗器械", "诊断标准",
    "生理指标",
];

/// Domain-configured closed set of relationship types (representative of a
/// ~45 biomedical verb taxonomy).
pub const RELATIONSHIP_TYPES: &[&str] = &[
    "导致", "用于治疗", "增加风险", "降低风险", "表现为", "诊断为", "禁忌于", "缓解", "并发于",
    "作用于", "检测出", "预防", "需要", "属于", "拮抗",
];

static ENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\("entity"\s*:\s*"(.+?)"\s*:\s*"(.+?)"\s*:\s*"(.+?)"\)"#).unwrap());
static RELATIONSHIP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\("relationship"\s*:\s*"(.+?)"\s*:\s*"(.+?)"\s*:\s*"(.+?)"\s*:\s*"(.+?)"\s*:\s*(.+?)\)"#).unwrap()
});

#[derive(Debug, Clone, Default)]
pub struct ExtractedEntity {
    pub name: String,
    pub entity_type: String,
    pub description: String,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractedRelationship {
    pub source: String,
    pub target: String,
    pub rel_type: String,
    pub description: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub entities: Vec<ExtractedEntity>,
    pub relationships: Vec<ExtractedRelationship>,
}

fn strip_backticks(s: &str) -> String {
    s.chars().filter(|c| *c != '`').collect()
}

fn normalize_type(raw: &str, allowed: &[&str]) -> String {
    let cleaned = strip_backticks(raw).trim().to_string();
    if allowed.contains(&cleaned.as_str()) {
        cleaned
    } else {
        EntityNode::OTHER_TYPE.to_string()
    }
}

/// Parses one LLM completion's worth of text. Unparseable lines — including
/// a completely unrelated "garbage line" — are silently skipped.
pub fn parse_extraction(raw_output: &str) -> ExtractionResult {
    let mut result = ExtractionResult::default();

    for line in raw_output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(caps) = ENTITY_RE.captures(line) {
            result.entities.push(ExtractedEntity {
                name: caps[1].trim().to_string(),
                entity_type: normalize_type(&caps[2], ENTITY_TYPES),
                description: caps[3].trim().to_string(),
            });
        } else if let Some(caps) = RELATIONSHIP_RE.captures(line) {
            let weight: f64 = caps[5].trim().parse().unwrap_or(1.0);
            result.relationships.push(ExtractedRelationship {
                source: caps[1].trim().to_string(),
                target: caps[2].trim().to_string(),
                rel_type: normalize_type(&caps[3], RELATIONSHIP_TYPES),
                description: caps[4].trim().to_string(),
                weight,
            });
        }
        // else: neither pattern matched — skip.
    }

    result
}

fn build_system_prompt(delimiters: &ExtractionDelimiters) -> String {
    format!(
        "你是一个医学知识图谱抽取器。从给定的文本片段中抽取实体和关系，严格按照下面的格式输出，不要输出任何解释性文字。\n\n\
         实体类型只能从下列集合中选择，其余一律标记为\"其他\"：{}\n\
         关系类型只能从下列集合中选择，其余一律标记为\"其他\"：{}\n\n\
         每条记录占一行，记录之间使用分隔符 \"{}\" ，输出结束后追加一个空行作为终止符 \"{}\"。\n\
         记录格式：\n\
         (\"entity\"{d}NAME{d}TYPE{d}DESCRIPTION)\n\
         (\"relationship\"{d}SOURCE{d}TARGET{d}TYPE{d}DESCRIPTION{d}WEIGHT)\n\
         其中 WEIGHT 是一个实数，表示关系强度。",
        ENTITY_TYPES.join("、"),
        RELATIONSHIP_TYPES.join("、"),
        delimiters.record_delimiter.escape_default(),
        delimiters.completion_delimiter.escape_default(),
        d = delimiters.tuple_delimiter,
    )
}

/// Extracts entities/relationships from one chunk of text. Never returns an
/// error: an LLM failure or unparseable completion yields an empty result,
/// logged but non-fatal.
pub async fn extract_chunk(client: &LlmClient, delimiters: &ExtractionDelimiters, chunk_text: &str) -> ExtractionResult {
    let system_prompt = build_system_prompt(delimiters);
    match client.complete(&system_prompt, chunk_text).await {
        Ok(raw) => parse_extraction(&raw),
        Err(e) => {
            llm::log_skip("chunk extraction", &e);
            ExtractionResult::default()
        }
    }
}

/// Runs `extract_chunk` over every chunk concurrently, up to a configured
/// maximum concurrency.
pub async fn extract_chunks(
    cfg: &AppConfig,
    client: Arc<LlmClient>,
    chunks: Vec<(String, String)>,
) -> Vec<(String, ExtractionResult)> {
    let semaphore = Arc::new(Semaphore::new(cfg.concurrency.max_concurrency));
    let delimiters = Arc::new(cfg.extraction.clone());
    let mut tasks = JoinSet::new();

    for (chunk_id, text) in chunks {
        let semaphore = semaphore.clone();
        let client = client.clone();
        let delimiters = delimiters.clone();
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            let result = extract_chunk(&client, &delimiters, &text).await;
            (chunk_id, result)
        });
    }

    let mut out = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(pair) => out.push(pair),
            Err(e) => warn!("extraction task panicked: {e}"),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extractor_tolerates_garbage_lines() {
        let raw = "(\"entity\" : \"阿司匹林\" : \"药物\" : \"抗血小板药。\") \n garbage line \n (\"relationship\" : \"阿司匹林\" : \"缺血性脑卒中\" : \"用于治疗\" : \"预防复发。\" : 9)";
        let result = parse_extraction(raw);

        assert_eq!(result.entities.len(), 1);
        assert_eq!(result.entities[0].name, "阿司匹林");
        assert_eq!(result.entities[0].entity_type, "药物");

        assert_eq!(result.relationships.len(), 1);
        let rel = &result.relationships[0];
        assert_eq!(rel.source, "阿司匹林");
        assert_eq!(rel.target, "缺血性脑卒中");
        assert_eq!(rel.rel_type, "用于治疗");
        assert_eq!(rel.weight, 9.0);
    }

    #[test]
    fn unknown_type_is_relabelled_to_other() {
        let raw = "(\"entity\" : \"某物\" : \"不存在的类型\" : \"描述\")";
        let result = parse_extraction(raw);
        assert_eq!(result.entities[0].entity_type, EntityNode::OTHER_TYPE);
    }

    #[test]
    fn backticks_are_stripped_from_type_labels() {
        let raw = "(\"entity\" : \"阿司匹林\" : \"`药物`\" : \"desc\")";
        let result = parse_extraction(raw);
        assert_eq!(result.entities[0].entity_type, "药物");
    }

    #[test]
    fn completely_empty_output_yields_empty_result() {
        let result = parse_extraction("");
        assert!(result.entities.is_empty());
        assert!(result.relationships.is_empty());
    }
}
