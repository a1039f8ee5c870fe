//! C3 (document/chunk chain) and C5 (entity/relationship merge) writers.
//!
//! Grounded in `original_source/my_packages/GraphAbout.py`:
//! `create_Document`/`create_relation_between_chunks` for the FIRST_CHUNK /
//! NEXT_CHUNK / PART_OF chain, and `merge_similar_entities`'s
//! coalesce-description + max-weight reduce for the entity/relationship
//! upsert. The coalesce/weight arithmetic is done host-side (not in an APOC
//! Cypher reduce) so it shares `models::coalesce_description` and stays unit
//! testable without a live database.

use neo4rs::{query, Graph};

use crate::errors::Result;
use crate::models::{coalesce_description, ChunkNode, DocumentNode, EntityNode, RelationshipEdge};

pub async fn upsert_document(graph: &Graph, doc: &DocumentNode) -> Result<()> {
    graph
        .run(
            query(
                "MERGE (d:Document {file_name: $file_name})
                 SET d.doc_type = $doc_type, d.uri = $uri",
            )
            .param("file_name", doc.file_name.clone())
            .param("doc_type", doc.doc_type.clone())
            .param("uri", doc.uri.clone()),
        )
        .await?;
    Ok(())
}

/// Writes the ordered chunk chain for one document: `Chunk-[:PART_OF]->Document`,
/// `Document-[:FIRST_CHUNK]->Chunk`, and `Chunk-[:NEXT_CHUNK]->Chunk` links.
/// `chunks` must already be in document order — `NEXT_CHUNK` linearity
/// depends on it.
pub async fn upsert_chunk_chain(graph: &Graph, file_name: &str, chunks: &[ChunkNode]) -> Result<()> {
    for (idx, chunk) in chunks.iter().enumerate() {
        graph
            .run(
                query(
                    "MATCH (d:Document {file_name: $file_name})
                     MERGE (c:Chunk {id: $id})
                     SET c.text = $text, c.position = $position, c.length = $length,
                         c.file_name = $file_name, c.content_offset = $content_offset,
                         c.tokens = $tokens
                     MERGE (c)-[:PART_OF]->(d)",
                )
                .param("file_name", file_name)
                .param("id", chunk.id.clone())
                .param("text", chunk.text.clone())
                .param("position", chunk.position)
                .param("length", chunk.length)
                .param("content_offset", chunk.content_offset)
                .param("tokens", chunk.tokens),
            )
            .await?;

        if idx == 0 {
            graph
                .run(
                    query(
                        "MATCH (d:Document {file_name: $file_name})
                         MATCH (c:Chunk {id: $id})
                         MERGE (d)-[:FIRST_CHUNK]->(c)",
                    )
                    .param("file_name", file_name)
                    .param("id", chunk.id.clone()),
                )
                .await?;
        } else {
            let prev = &chunks[idx - 1];
            graph
                .run(
                    query(
                        "MATCH (p:Chunk {id: $prev_id})
                         MATCH (c:Chunk {id: $id})
                         MERGE (p)-[:NEXT_CHUNK]->(c)",
                    )
                    .param("prev_id", prev.id.clone())
                    .param("id", chunk.id.clone()),
                )
                .await?;
        }
    }
    Ok(())
}

async fn fetch_entity(graph: &Graph, id: &str) -> Result<Option<EntityNode>> {
    let mut cursor = graph
        .execute(
            query(
                "MATCH (e:__Entity__ {id: $id})
                 RETURN e.id AS id, e.entity_type AS entity_type, e.description AS description",
            )
            .param("id", id),
        )
        .await?;
    let Some(row) = cursor.next().await? else {
        return Ok(None);
    };
    Ok(Some(EntityNode {
        id: row.get("id").unwrap_or_default(),
        entity_type: row.get("entity_type").unwrap_or_default(),
        description: row.get("description").unwrap_or_default(),
        embedding: None,
    }))
}

/// Upserts one entity, applying the label-merge policy: `未知` is dropped
/// the moment a concrete type is known; the last concrete, non-`其他` type
/// wins over `其他`.
pub async fn upsert_entity(graph: &Graph, incoming: &EntityNode) -> Result<()> {
    let existing = fetch_entity(graph, &incoming.id).await?;
    let (merged, description_changed) = match &existing {
        None => (incoming.clone(), true),
        Some(existing) => {
            let entity_type = resolve_merged_type(&existing.entity_type, &incoming.entity_type);
            let description = coalesce_description(&existing.description, &incoming.description);
            let changed = description != existing.description;
            (
                EntityNode {
                    id: incoming.id.clone(),
                    entity_type,
                    description,
                    embedding: None,
                },
                changed,
            )
        }
    };

    // A description change invalidates the embedding: clearing it here is
    // how `embedder::embed_pending_entities` discovers the work.
    if description_changed {
        graph
            .run(
                query(
                    "MERGE (e:__Entity__ {id: $id})
                     SET e.entity_type = $entity_type, e.description = $description, e.embedding = NULL",
                )
                .param("id", merged.id)
                .param("entity_type", merged.entity_type)
                .param("description", merged.description),
            )
            .await?;
    } else {
        graph
            .run(
                query(
                    "MERGE (e:__Entity__ {id: $id})
                     SET e.entity_type = $entity_type, e.description = $description",
                )
                .param("id", merged.id)
                .param("entity_type", merged.entity_type)
                .param("description", merged.description),
            )
            .await?;
    }
    Ok(())
}

/// `未知` never survives once a concrete type exists; `其他` only survives
/// if no more specific type has ever been observed.
fn resolve_merged_type(existing: &str, incoming: &str) -> String {
    let is_concrete = |t: &str| t != EntityNode::UNKNOWN_TYPE && t != EntityNode::OTHER_TYPE;
    if is_concrete(incoming) {
        incoming.to_string()
    } else if is_concrete(existing) {
        existing.to_string()
    } else if incoming != EntityNode::UNKNOWN_TYPE {
        incoming.to_string()
    } else if existing != EntityNode::UNKNOWN_TYPE {
        existing.to_string()
    } else {
        EntityNode::UNKNOWN_TYPE.to_string()
    }
}

/// Every entity touched by a chunk's extraction — including relationship
/// endpoints created only as placeholders — gets a `MENTIONS` edge from that
/// chunk. Because entities are merged by `id` (the entity name), a
/// placeholder and a later "real" record for the same name are the same
/// node; there is no separate collapse step to run.
pub async fn link_mentions(graph: &Graph, chunk_id: &str, entity_id: &str) -> Result<()> {
    graph
        .run(
            query(
                "MATCH (c:Chunk {id: $chunk_id})
                 MATCH (e:__Entity__ {id: $entity_id})
                 MERGE (c)-[:MENTIONS]->(e)",
            )
            .param("chunk_id", chunk_id)
            .param("entity_id", entity_id),
        )
        .await?;
    Ok(())
}

pub(crate) fn sanitize_rel_type(rel_type: &str) -> String {
    let cleaned: String = rel_type
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "RELATED_TO".to_string()
    } else {
        cleaned
    }
}

/// Upserts a relationship, coalescing the description and keeping
/// `weight = max(old, new)`. The relationship type cannot be parameterised
/// in Cypher, so it is sanitised to `[A-Za-z0-9_]` and interpolated into the
/// query text.
pub async fn upsert_relationship(graph: &Graph, rel: &RelationshipEdge) -> Result<()> {
    let rel_type = sanitize_rel_type(&rel.rel_type);

    let mut cursor = graph
        .execute(
            query(&format!(
                "MATCH (s:__Entity__ {{id: $source_id}})-[r:{rel_type}]->(t:__Entity__ {{id: $target_id}})
                 RETURN r.description AS description, r.weight AS weight"
            ))
            .param("source_id", rel.source_id.clone())
            .param("target_id", rel.target_id.clone()),
        )
        .await?;

    let (description, weight) = match cursor.next().await? {
        Some(row) => {
            let old_desc: String = row.get("description").unwrap_or_default();
            let old_weight: f64 = row.get("weight").unwrap_or(0.0);
            (
                coalesce_description(&old_desc, &rel.description),
                old_weight.max(rel.weight),
            )
        }
        None => (rel.description.clone(), rel.weight),
    };

    graph
        .run(
            query(&format!(
                "MATCH (s:__Entity__ {{id: $source_id}})
                 MATCH (t:__Entity__ {{id: $target_id}})
                 MERGE (s)-[r:{rel_type}]->(t)
                 SET r.description = $description, r.weight = $weight"
            ))
            .param("source_id", rel.source_id.clone())
            .param("target_id", rel.target_id.clone())
            .param("description", description)
            .param("weight", weight),
        )
        .await?;
    Ok(())
}
