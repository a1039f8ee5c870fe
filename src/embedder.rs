//! C6 — dense vector per Entity from `id + "\n" + description`.
//!
//! `embedding` is cleared by `graph::writer::upsert_entity` whenever a merge
//! changes an entity's description, so this module
//! only has to find and fill entities with `embedding IS NULL`.

use neo4rs::Graph;
use tracing::info;

use crate::errors::Result;
use crate::graph::projection;
use crate::llm::LlmClient;
use crate::models::EntityNode;

/// Embeds every entity currently missing a vector, in batches of
/// `batch_size`. Safe to call repeatedly (idempotent — already-embedded
/// entities are skipped).
pub async fn embed_pending_entities(graph: &Graph, client: &LlmClient, batch_size: usize) -> Result<usize> {
    let pending: Vec<EntityNode> = projection::fetch_entities_without_embedding(graph).await?;
    if pending.is_empty() {
        return Ok(0);
    }

    let mut embedded = 0;
    for batch in pending.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(EntityNode::embedding_text).collect();
        let vectors = client.embed_texts(&texts).await?;

        for (entity, vector) in batch.iter().zip(vectors.iter()) {
            projection::store_entity_embedding(graph, &entity.id, vector).await?;
            embedded += 1;
        }
    }

    info!("embedded {embedded} pending entities");
    Ok(embedded)
}
