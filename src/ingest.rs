//! Orchestrates C1-C5 for the `create` CLI verb: walk the corpus directory,
//! chunk each file, persist the chunk chain, extract entities/relationships
//! per chunk, and merge them into the graph.
//!
//! Walks files via `walkdir`, doing a per-file chunk+extract+upsert pass;
//! grounded in `original_source/my_packages/GraphAbout.py::create_relation_between_chunks`
//! for the exact `id`/`position`/`content_offset`/`tokens` arithmetic.

use std::path::Path;
use std::sync::Arc;

use neo4rs::Graph;
use sha1::{Digest, Sha1};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::AppConfig;
use crate::errors::Result;
use crate::extractor;
use crate::graph::writer;
use crate::llm::LlmClient;
use crate::merger;
use crate::models::{ChunkNode, DocumentNode};
use crate::tokenizer::Tokenizer;

/// Builds the chunk chain's `ChunkNode`s from token chunks: `position` is
/// 1-based, `content_offset` is the cumulative character length of all
/// preceding chunks' joined text, `tokens` is the per-chunk token count.
fn build_chunk_nodes(file_name: &str, token_chunks: &[Vec<String>]) -> Vec<ChunkNode> {
    let mut nodes = Vec::with_capacity(token_chunks.len());
    let mut offset: i64 = 0;

    for (i, tokens) in token_chunks.iter().enumerate() {
        let text: String = tokens.concat();
        if i > 0 {
            let previous_text: String = token_chunks[i - 1].concat();
            offset += previous_text.chars().count() as i64;
        }

        let mut hasher = Sha1::new();
        hasher.update(text.as_bytes());
        let id = format!("{:x}", hasher.finalize());

        nodes.push(ChunkNode {
            id,
            length: text.chars().count() as i64,
            text,
            position: i as i64 + 1,
            file_name: file_name.to_string(),
            content_offset: offset,
            tokens: tokens.len() as i64,
        });
    }
    nodes
}

async fn ingest_file(graph: &Graph, client: &LlmClient, cfg: &AppConfig, tokenizer: &Tokenizer, path: &Path) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown.txt")
        .to_string();

    let text = tokio::fs::read_to_string(path).await?;
    let token_chunks = crate::chunker::chunk_text(&text, tokenizer, cfg.chunker.chunk_size, cfg.chunker.overlap);
    if token_chunks.is_empty() {
        warn!("{file_name}: no chunks produced, skipping");
        return Ok(());
    }

    let chunk_nodes = build_chunk_nodes(&file_name, &token_chunks);

    // Writing the chunk chain is fatal-for-file — a partial NEXT_CHUNK
    // chain is not useful.
    writer::upsert_document(
        graph,
        &DocumentNode {
            file_name: file_name.clone(),
            doc_type: "text/plain".to_string(),
            uri: path.display().to_string(),
        },
    )
    .await?;
    writer::upsert_chunk_chain(graph, &file_name, &chunk_nodes).await?;

    // C4: extraction is non-fatal per-chunk.
    let inputs: Vec<(String, String)> = chunk_nodes.iter().map(|c| (c.id.clone(), c.text.clone())).collect();
    let client = Arc::new(client.clone());
    let results = extractor::extract_chunks(cfg, client, inputs).await;

    for (chunk_id, extraction) in &results {
        if let Err(e) = merger::merge_chunk_extraction(graph, chunk_id, extraction).await {
            warn!("{file_name}: failed to merge extraction for chunk {chunk_id}: {e}");
        }
    }

    info!(
        "{file_name}: ingested {} chunks, extracted {} entities / {} relationships",
        chunk_nodes.len(),
        results.iter().map(|(_, r)| r.entities.len()).sum::<usize>(),
        results.iter().map(|(_, r)| r.relationships.len()).sum::<usize>(),
    );
    Ok(())
}

/// Walks `corpus_dir` for `.txt` files and ingests each one. Per-file
/// failures in C3 (graph-chain write) abort that file but not the batch;
/// the walk itself continues.
pub async fn ingest_directory(graph: &Graph, client: &LlmClient, cfg: &AppConfig, corpus_dir: &Path) -> Result<()> {
    let tokenizer = Tokenizer::new(cfg.chunker.sentence_terminators.clone());

    let files: Vec<_> = WalkDir::new(corpus_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().and_then(|ext| ext.to_str()) == Some("txt"))
        .collect();

    info!("ingesting {} files from {}", files.len(), corpus_dir.display());

    for entry in files {
        if let Err(e) = ingest_file(graph, client, cfg, &tokenizer, entry.path()).await {
            warn!("failed to ingest {}: {e}", entry.path().display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `Chunk.id == SHA1(text)`, and the content_offset/position arithmetic
    /// matches `create_relation_between_chunks`.
    #[test]
    fn chunk_nodes_use_sha1_id_and_cumulative_offset() {
        let chunks = vec![
            vec!["A".to_string(), "。".to_string()],
            vec!["BB".to_string(), "。".to_string()],
        ];
        let nodes = build_chunk_nodes("doc.txt", &chunks);

        assert_eq!(nodes[0].position, 1);
        assert_eq!(nodes[0].content_offset, 0);
        assert_eq!(nodes[0].text, "A。");
        assert_eq!(nodes[0].tokens, 2);

        let mut hasher = Sha1::new();
        hasher.update("A。".as_bytes());
        assert_eq!(nodes[0].id, format!("{:x}", hasher.finalize()));

        assert_eq!(nodes[1].position, 2);
        assert_eq!(nodes[1].content_offset, "A。".chars().count() as i64);
    }

    #[test]
    fn same_text_always_produces_the_same_chunk_id() {
        let chunks = vec![vec!["重复".to_string(), "内容".to_string()]];
        let a = build_chunk_nodes("a.txt", &chunks);
        let b = build_chunk_nodes("b.txt", &chunks);
        assert_eq!(a[0].id, b[0].id);
    }
}
