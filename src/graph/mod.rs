//! Neo4j integration: connection, schema/index bootstrap, and the read/write
//! surfaces each pipeline stage needs.
//!
//! Grounded in `neo4j_client.rs`/`vector_store.rs` (connection + constraint +
//! vector-index bootstrap idiom) and `original_source/my_packages/GraphAbout.py`
//! (the Cypher shapes for chunk chains, entity/relationship merge, and
//! community writes).

pub mod projection;
pub mod retrieval_io;
pub mod writer;

use anyhow::Result;
use neo4rs::{query, Graph};
use tracing::info;
use url::Url;

use crate::config::AppConfig;

pub async fn connect_from_config(cfg: &AppConfig) -> Result<Graph> {
    let url = Url::parse(&cfg.neo4j_uri)?;
    let host = url.host_str().unwrap_or("localhost");
    let port = url.port().unwrap_or(7687);
    let addr = format!("{host}:{port}");

    info!("connecting to neo4j at {addr}");
    let graph = Graph::new(&addr, &cfg.neo4j_user, &cfg.neo4j_password).await?;
    info!("neo4j connection ok");
    Ok(graph)
}

/// Constraints for `:Document`, `:Chunk`, `:Entity(id)` and `:Community(id)`.
pub async fn ensure_schema(graph: &Graph) -> Result<()> {
    let statements = [
        "CREATE CONSTRAINT doc_file_name IF NOT EXISTS
         FOR (d:Document) REQUIRE d.file_name IS UNIQUE",
        "CREATE CONSTRAINT chunk_id IF NOT EXISTS
         FOR (c:Chunk) REQUIRE c.id IS UNIQUE",
        "CREATE CONSTRAINT entity_id IF NOT EXISTS
         FOR (e:__Entity__) REQUIRE e.id IS UNIQUE",
        "CREATE CONSTRAINT community_id IF NOT EXISTS
         FOR (c:__Community__) REQUIRE c.id IS UNIQUE",
    ];

    for stmt in statements {
        graph.run(query(stmt)).await?;
    }

    info!("neo4j schema ensured");
    Ok(())
}

/// Vector index over `:__Entity__(embedding)`, dimension matching the
/// configured embedding model (1536 for `text-embedding-3-small`).
pub async fn ensure_entity_vector_index(graph: &Graph, dimensions: i64) -> Result<()> {
    let index_name = "entityEmbeddingIndex";

    let mut cursor = graph
        .execute(
            query("SHOW VECTOR INDEXES YIELD name WHERE name = $name RETURN name")
                .param("name", index_name),
        )
        .await?;
    if cursor.next().await?.is_some() {
        return Ok(());
    }

    let cypher = format!(
        "CREATE VECTOR INDEX {index_name}
         FOR (e:__Entity__)
         ON (e.embedding)
         OPTIONS {{
           indexConfig: {{
             `vector.dimensions`: {dimensions},
             `vector.similarity_function`: 'cosine'
           }}
         }}"
    );
    graph.run(query(&cypher)).await?;
    info!("vector index '{index_name}' created");
    Ok(())
}
