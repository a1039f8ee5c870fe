//! Orchestrates C6-C9 for the `process` CLI verb: embed pending entities,
//! deduplicate, detect communities, summarise them, then rewrite any
//! descriptions that grew past the summariser's length budget.
//!
//! Grounded in a staged-orchestration shape (one function per stage, each
//! logged before/after) and `original_source/my_packages/LLMAbout.py`'s
//! post-ingest batch ordering (embed -> dedupe -> community -> summarise).

use neo4rs::Graph;
use tracing::info;

use crate::community;
use crate::config::AppConfig;
use crate::dedup;
use crate::embedder;
use crate::errors::Result;
use crate::llm::LlmClient;
use crate::summarizer;

/// Runs the full post-ingest pipeline once, end to end. Each stage's own
/// function already tolerates partial/transient failures where appropriate
/// (extraction- and arbitration-style skip-on-exhaustion); a stage returning
/// `Err` here is a fatal-for-batch condition (graph connectivity, schema)
/// that aborts the remaining stages.
pub async fn run_pipeline(graph: &Graph, client: &LlmClient, cfg: &AppConfig) -> Result<()> {
    info!("process: embedding pending entities");
    let embedded = embedder::embed_pending_entities(graph, client, cfg.concurrency.max_concurrency).await?;
    info!("process: embedded {embedded} entities");

    info!("process: deduplicating entities");
    let merged = dedup::deduplicate_entities(graph, client, cfg).await?;
    info!("process: applied {merged} merge groups");

    info!("process: detecting communities");
    let communities = community::build_communities(graph, &cfg.community).await?;
    info!("process: wrote {communities} communities");

    info!("process: summarising communities");
    let client = std::sync::Arc::new(client.clone());
    summarizer::summarize_communities(
        graph,
        client.clone(),
        &cfg.summary,
        cfg.global_retrieval.community_level,
        cfg.concurrency.max_concurrency,
    )
    .await?;

    info!("process: rewriting oversized entity descriptions");
    summarizer::rewrite_long_descriptions(graph, &client, &cfg.summary).await?;

    info!("process: pipeline complete");
    Ok(())
}
