//! Read paths backing the local (C10) and global (C11) retrievers.
//!
//! Grounded in `original_source/query.py`'s `lc_retrieval_query` (the
//! revision carrying the `Reports` field — see the Open Question note in
//! `DESIGN.md`) and `my_packages/QueryAbout.py`'s `global_retriever`.

use neo4rs::query;
use neo4rs::Graph;

use crate::errors::Result;
use crate::models::{ChunkNode, CommunityNode, EntityNode, RelationshipEdge};

pub struct ScoredEntity {
    pub entity: EntityNode,
    pub score: f64,
}

/// Vector search over `:__Entity__(embedding)`.
pub async fn vector_search_entities(graph: &Graph, query_embedding: &[f64], top_k: usize) -> Result<Vec<ScoredEntity>> {
    let mut cursor = graph
        .execute(
            query(
                "CALL db.index.vector.queryNodes('entityEmbeddingIndex', $k, $embedding)
                 YIELD node, score
                 RETURN node.id AS id, node.entity_type AS entity_type,
                        node.description AS description, score
                 ORDER BY score DESC",
            )
            .param("k", top_k as i64)
            .param("embedding", query_embedding.to_vec()),
        )
        .await?;

    let mut out = Vec::new();
    while let Some(row) = cursor.next().await? {
        out.push(ScoredEntity {
            entity: EntityNode {
                id: row.get("id").unwrap_or_default(),
                entity_type: row.get("entity_type").unwrap_or_default(),
                description: row.get("description").unwrap_or_default(),
                embedding: None,
            },
            score: row.get("score").unwrap_or(0.0),
        });
    }
    Ok(out)
}

/// Context package assembled for the local retriever: the seed
/// entities' 1-hop neighbourhood, the chunks that mention them, and the
/// communities they belong to.
#[derive(Debug, Default)]
pub struct LocalContext {
    pub neighbour_entities: Vec<EntityNode>,
    pub inside_relationships: Vec<RelationshipEdge>,
    pub outside_relationships: Vec<RelationshipEdge>,
    pub chunks: Vec<ChunkNode>,
    pub communities: Vec<CommunityNode>,
}

pub async fn fetch_local_context(
    graph: &Graph,
    seed_entity_ids: &[String],
    top_chunks: usize,
    top_communities: usize,
    top_inside_rels: usize,
    top_outside_rels: usize,
) -> Result<LocalContext> {
    let mut ctx = LocalContext::default();

    let mut cursor = graph
        .execute(
            query(
                "MATCH (s:__Entity__) WHERE s.id IN $ids
                 MATCH (s)-[r]-(n:__Entity__)
                 RETURN DISTINCT n.id AS id, n.entity_type AS entity_type, n.description AS description,
                        startNode(r).id AS source_id, endNode(r).id AS target_id,
                        type(r) AS rel_type, r.description AS rel_description, r.weight AS weight,
                        (startNode(r).id IN $ids AND endNode(r).id IN $ids) AS inside",
            )
            .param("ids", seed_entity_ids.to_vec()),
        )
        .await?;

    while let Some(row) = cursor.next().await? {
        ctx.neighbour_entities.push(EntityNode {
            id: row.get("id").unwrap_or_default(),
            entity_type: row.get("entity_type").unwrap_or_default(),
            description: row.get("description").unwrap_or_default(),
            embedding: None,
        });
        let rel = RelationshipEdge {
            source_id: row.get("source_id").unwrap_or_default(),
            target_id: row.get("target_id").unwrap_or_default(),
            rel_type: row.get("rel_type").unwrap_or_default(),
            description: row.get("rel_description").unwrap_or_default(),
            weight: row.get("weight").unwrap_or(1.0),
        };
        if row.get::<bool>("inside").unwrap_or(false) {
            ctx.inside_relationships.push(rel);
        } else {
            ctx.outside_relationships.push(rel);
        }
    }

    ctx.inside_relationships.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    ctx.inside_relationships.truncate(top_inside_rels);
    ctx.outside_relationships.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    ctx.outside_relationships.truncate(top_outside_rels);

    let mut chunk_cursor = graph
        .execute(
            query(
                "MATCH (e:__Entity__) WHERE e.id IN $ids
                 MATCH (c:Chunk)-[:MENTIONS]->(e)
                 RETURN DISTINCT c.id AS id, c.text AS text, c.position AS position,
                        c.length AS length, c.file_name AS file_name,
                        c.content_offset AS content_offset, c.tokens AS tokens
                 LIMIT $limit",
            )
            .param("ids", seed_entity_ids.to_vec())
            .param("limit", top_chunks as i64),
        )
        .await?;
    while let Some(row) = chunk_cursor.next().await? {
        ctx.chunks.push(ChunkNode {
            id: row.get("id").unwrap_or_default(),
            text: row.get("text").unwrap_or_default(),
            position: row.get("position").unwrap_or(0),
            length: row.get("length").unwrap_or(0),
            file_name: row.get("file_name").unwrap_or_default(),
            content_offset: row.get("content_offset").unwrap_or(0),
            tokens: row.get("tokens").unwrap_or(0),
        });
    }

    let mut comm_cursor = graph
        .execute(
            query(
                "MATCH (e:__Entity__) WHERE e.id IN $ids
                 MATCH (e)-[:IN_COMMUNITY]->(comm:__Community__)
                 RETURN DISTINCT comm.id AS id, comm.level AS level, comm.summary AS summary,
                        comm.community_rank AS community_rank, comm.weight AS weight
                 ORDER BY comm.community_rank DESC
                 LIMIT $limit",
            )
            .param("ids", seed_entity_ids.to_vec())
            .param("limit", top_communities as i64),
        )
        .await?;
    while let Some(row) = comm_cursor.next().await? {
        ctx.communities.push(CommunityNode {
            id: row.get("id").unwrap_or_default(),
            level: row.get("level").unwrap_or(0),
            summary: row.get("summary").ok(),
            community_rank: row.get("community_rank").unwrap_or(0),
            weight: row.get("weight").unwrap_or(0.0),
        });
    }

    Ok(ctx)
}

/// All community summaries at `level`, ordered by `community_rank` — the
/// map stage's input set for the global retriever (C11).
pub async fn fetch_all_community_summaries(graph: &Graph, level: i64) -> Result<Vec<CommunityNode>> {
    let mut cursor = graph
        .execute(
            query(
                "MATCH (c:__Community__ {level: $level})
                 WHERE c.summary IS NOT NULL
                 RETURN c.id AS id, c.level AS level, c.summary AS summary,
                        c.community_rank AS community_rank, c.weight AS weight
                 ORDER BY c.community_rank DESC",
            )
            .param("level", level),
        )
        .await?;

    let mut out = Vec::new();
    while let Some(row) = cursor.next().await? {
        out.push(CommunityNode {
            id: row.get("id").unwrap_or_default(),
            level: row.get("level").unwrap_or(0),
            summary: row.get("summary").ok(),
            community_rank: row.get("community_rank").unwrap_or(0),
            weight: row.get("weight").unwrap_or(0.0),
        });
    }
    Ok(out)
}
