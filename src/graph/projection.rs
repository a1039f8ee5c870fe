//! Read paths for in-memory graph projections (C7 dedup candidate graph, C8
//! community detection) plus the merge/community writers that consume them.
//!
//! There is no Neo4j GDS binding available from `neo4rs`, so the kNN/WCC/
//! SLLPA algorithms that `original_source/my_packages/GraphAbout.py` runs
//! through `gds.knn.write` / `gds.wcc.write` / `gds.sllpa.write` are
//! reimplemented over an in-memory `petgraph` projection fetched here (see
//! `dedup.rs`, `community.rs`).

use neo4rs::query;
use neo4rs::Graph;

use crate::errors::Result;
use crate::graph::writer::sanitize_rel_type;
use crate::models::{coalesce_description, CommunityNode, EntityNode, RelationshipEdge};

/// All entities carrying an embedding, for kNN candidate generation.
pub async fn fetch_embedded_entities(graph: &Graph) -> Result<Vec<EntityNode>> {
    let mut cursor = graph
        .execute(query(
            "MATCH (e:__Entity__)
             WHERE e.embedding IS NOT NULL
             RETURN e.id AS id, e.entity_type AS entity_type, e.description AS description, e.embedding AS embedding",
        ))
        .await?;

    let mut out = Vec::new();
    while let Some(row) = cursor.next().await? {
        out.push(EntityNode {
            id: row.get("id").unwrap_or_default(),
            entity_type: row.get("entity_type").unwrap_or_default(),
            description: row.get("description").unwrap_or_default(),
            embedding: row.get("embedding").ok(),
        });
    }
    Ok(out)
}

/// All entities lacking an embedding (newly created since the last embed
/// pass), for `embedder.rs` (C6).
pub async fn fetch_entities_without_embedding(graph: &Graph) -> Result<Vec<EntityNode>> {
    let mut cursor = graph
        .execute(query(
            "MATCH (e:__Entity__)
             WHERE e.embedding IS NULL
             RETURN e.id AS id, e.entity_type AS entity_type, e.description AS description",
        ))
        .await?;

    let mut out = Vec::new();
    while let Some(row) = cursor.next().await? {
        out.push(EntityNode {
            id: row.get("id").unwrap_or_default(),
            entity_type: row.get("entity_type").unwrap_or_default(),
            description: row.get("description").unwrap_or_default(),
            embedding: None,
        });
    }
    Ok(out)
}

pub async fn store_entity_embedding(graph: &Graph, id: &str, embedding: &[f64]) -> Result<()> {
    graph
        .run(
            query("MATCH (e:__Entity__ {id: $id}) SET e.embedding = $embedding")
                .param("id", id)
                .param("embedding", embedding.to_vec()),
        )
        .await?;
    Ok(())
}

/// The entire entity/relationship graph, for the community-detection
/// projection (C8). `RelationshipEdge` direction is preserved; `community.rs`
/// collapses it to an undirected `_ALL_` aggregate.
pub async fn fetch_full_projection(graph: &Graph) -> Result<(Vec<EntityNode>, Vec<RelationshipEdge>)> {
    let entities = fetch_embedded_entities(graph).await?;

    let mut cursor = graph
        .execute(query(
            "MATCH (s:__Entity__)-[r]->(t:__Entity__)
             RETURN s.id AS source_id, t.id AS target_id, type(r) AS rel_type,
                    r.description AS description, r.weight AS weight",
        ))
        .await?;

    let mut rels = Vec::new();
    while let Some(row) = cursor.next().await? {
        rels.push(RelationshipEdge {
            source_id: row.get("source_id").unwrap_or_default(),
            target_id: row.get("target_id").unwrap_or_default(),
            rel_type: row.get("rel_type").unwrap_or_default(),
            description: row.get("description").unwrap_or_default(),
            weight: row.get("weight").unwrap_or(1.0),
        });
    }
    Ok((entities, rels))
}

/// Merges `duplicates` into `survivor`: redirects `MENTIONS`/typed
/// relationships, coalesces descriptions, keeps `max` weight, then deletes
/// the duplicate nodes. Equivalent to `apoc.refactor.mergeNodes` in
/// `merge_similar_entities` (GraphAbout.py), reimplemented without APOC so
/// the merge arithmetic stays host-side and testable.
pub async fn merge_entities(graph: &Graph, survivor: &str, duplicates: &[String]) -> Result<()> {
    for dup in duplicates {
        graph
            .run(
                query(
                    "MATCH (dup:__Entity__ {id: $dup_id})
                     MATCH (survivor:__Entity__ {id: $survivor_id})
                     SET survivor.description = CASE
                           WHEN dup.description IS NULL OR dup.description = '' THEN survivor.description
                           WHEN survivor.description IS NULL OR survivor.description = '' THEN dup.description
                           ELSE survivor.description + '；' + dup.description
                         END,
                         survivor.embedding = NULL
                     WITH dup, survivor
                     OPTIONAL MATCH (c:Chunk)-[:MENTIONS]->(dup)
                     MERGE (c)-[:MENTIONS]->(survivor)
                     WITH dup, survivor
                     OPTIONAL MATCH (dup)-[out]->(other:__Entity__)
                     WHERE other.id <> survivor.id
                     CALL apoc.create.relationship(survivor, type(out), properties(out), other) YIELD rel AS outRel
                     WITH dup, survivor
                     OPTIONAL MATCH (other2:__Entity__)-[inc]->(dup)
                     WHERE other2.id <> survivor.id
                     CALL apoc.create.relationship(other2, type(inc), properties(inc), survivor) YIELD rel AS inRel
                     WITH dup, survivor
                     DETACH DELETE dup",
                )
                .param("dup_id", dup.clone())
                .param("survivor_id", survivor),
            )
            .await?;
    }
    collapse_parallel_relationships(graph).await?;
    Ok(())
}

/// After `merge_entities` redirects edges onto a survivor, the same
/// `(source, type, target)` triple may carry several parallel relationships.
/// Collapses each group to one: `weight = max`, description coalesced
/// (the merge operation's second half).
pub async fn collapse_parallel_relationships(graph: &Graph) -> Result<()> {
    let mut cursor = graph
        .execute(query(
            "MATCH (a:__Entity__)-[r]->(b:__Entity__)
             WITH a.id AS source_id, b.id AS target_id, type(r) AS rel_type,
                  collect(coalesce(r.description, '')) AS descriptions,
                  collect(coalesce(r.weight, 1.0)) AS weights, count(r) AS cnt
             WHERE cnt > 1
             RETURN source_id, target_id, rel_type, descriptions, weights",
        ))
        .await?;

    let mut groups = Vec::new();
    while let Some(row) = cursor.next().await? {
        groups.push((
            row.get::<String>("source_id").unwrap_or_default(),
            row.get::<String>("target_id").unwrap_or_default(),
            row.get::<String>("rel_type").unwrap_or_default(),
            row.get::<Vec<String>>("descriptions").unwrap_or_default(),
            row.get::<Vec<f64>>("weights").unwrap_or_default(),
        ));
    }

    for (source_id, target_id, rel_type, descriptions, weights) in groups {
        let description = descriptions
            .into_iter()
            .fold(String::new(), |acc, d| coalesce_description(&acc, &d));
        let weight = weights.into_iter().fold(0.0_f64, f64::max);
        let safe_type = sanitize_rel_type(&rel_type);

        graph
            .run(
                query(&format!(
                    "MATCH (a:__Entity__ {{id: $source_id}})-[r:{safe_type}]->(b:__Entity__ {{id: $target_id}})
                     DELETE r"
                ))
                .param("source_id", source_id.clone())
                .param("target_id", target_id.clone()),
            )
            .await?;

        graph
            .run(
                query(&format!(
                    "MATCH (a:__Entity__ {{id: $source_id}})
                     MATCH (b:__Entity__ {{id: $target_id}})
                     MERGE (a)-[r:{safe_type}]->(b)
                     SET r.description = $description, r.weight = $weight"
                ))
                .param("source_id", source_id)
                .param("target_id", target_id)
                .param("description", description)
                .param("weight", weight),
            )
            .await?;
    }
    Ok(())
}

pub async fn write_community(graph: &Graph, community: &CommunityNode) -> Result<()> {
    graph
        .run(
            query(
                "MERGE (c:__Community__ {id: $id})
                 SET c.level = $level, c.summary = $summary,
                     c.community_rank = $community_rank, c.weight = $weight",
            )
            .param("id", community.id.clone())
            .param("level", community.level)
            .param("summary", community.summary.clone().unwrap_or_default())
            .param("community_rank", community.community_rank)
            .param("weight", community.weight),
        )
        .await?;
    Ok(())
}

pub async fn write_in_community_edge(graph: &Graph, entity_id: &str, community_id: &str) -> Result<()> {
    graph
        .run(
            query(
                "MATCH (e:__Entity__ {id: $entity_id})
                 MATCH (c:__Community__ {id: $community_id})
                 MERGE (e)-[:IN_COMMUNITY]->(c)",
            )
            .param("entity_id", entity_id)
            .param("community_id", community_id),
        )
        .await?;
    Ok(())
}

/// `community_rank` = count of distinct chunks mentioning any entity in the
/// community.
pub async fn compute_community_rank(graph: &Graph, community_id: &str) -> Result<i64> {
    let mut cursor = graph
        .execute(
            query(
                "MATCH (:__Community__ {id: $community_id})<-[:IN_COMMUNITY]-(e:__Entity__)
                 MATCH (c:Chunk)-[:MENTIONS]->(e)
                 RETURN count(DISTINCT c) AS rank",
            )
            .param("community_id", community_id),
        )
        .await?;
    let rank = match cursor.next().await? {
        Some(row) => row.get::<i64>("rank").unwrap_or(0),
        None => 0,
    };
    Ok(rank)
}
