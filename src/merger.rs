//! C5 orchestration: turns one chunk's `ExtractionResult` (C4) into graph
//! writes, applying the placeholder-entity and MENTIONS policy. The merge
//! arithmetic itself (coalesce, label policy, max weight) lives in
//! `graph::writer`.

use std::collections::HashSet;

use neo4rs::Graph;

use crate::errors::Result;
use crate::extractor::ExtractionResult;
use crate::graph::writer;
use crate::models::EntityNode;

pub async fn merge_chunk_extraction(graph: &Graph, chunk_id: &str, result: &ExtractionResult) -> Result<()> {
    let mut seen: HashSet<String> = HashSet::new();

    for entity in &result.entities {
        writer::upsert_entity(
            graph,
            &EntityNode {
                id: entity.name.clone(),
                entity_type: entity.entity_type.clone(),
                description: entity.description.clone(),
                embedding: None,
            },
        )
        .await?;
        writer::link_mentions(graph, chunk_id, &entity.name).await?;
        seen.insert(entity.name.clone());
    }

    for rel in &result.relationships {
        for endpoint in [&rel.source, &rel.target] {
            if seen.insert(endpoint.clone()) {
                // No standalone entity record for this endpoint: create the
                // `未知` placeholder. Idempotent —
                // if a concrete record already exists in the graph, the
                // label-merge policy in `upsert_entity` keeps it concrete.
                writer::upsert_entity(graph, &EntityNode::placeholder(endpoint.clone())).await?;
            }
            writer::link_mentions(graph, chunk_id, endpoint).await?;
        }

        writer::upsert_relationship(
            graph,
            &crate::models::RelationshipEdge {
                source_id: rel.source.clone(),
                target_id: rel.target.clone(),
                rel_type: rel.rel_type.clone(),
                description: rel.description.clone(),
                weight: rel.weight,
            },
        )
        .await?;
    }

    Ok(())
}
