//! C12 — optional image attacher for the `picture` CLI verb.
//!
//! Grounded in `original_source/picture.py` / `advanced_picture.py` /
//! `my_packages/GetWikiPicture.py`: for each `:__Entity__` missing an
//! `image_url` property, fetch a representative image URL from an external
//! source and set it. The actual scraping target is out of scope here, so
//! this ships one no-op `ImageLookup` impl and a pluggable trait — the
//! `create`/`process` pipelines never depend on it.

use async_trait::async_trait;
use neo4rs::query;
use neo4rs::Graph;
use tracing::info;

use crate::errors::Result;

#[async_trait]
pub trait ImageLookup: Send + Sync {
    /// Looks up a representative image URL for an entity name. `None` means
    /// no image was found; never treated as an error.
    async fn lookup(&self, entity_id: &str) -> Option<String>;
}

/// Always returns `None`. The real scraping target is out of scope; this
/// keeps `picture` runnable (and testable) without one.
pub struct NoopImageLookup;

#[async_trait]
impl ImageLookup for NoopImageLookup {
    async fn lookup(&self, _entity_id: &str) -> Option<String> {
        None
    }
}

/// Attaches `image_url` to every entity currently missing one. Returns the
/// number of entities updated.
pub async fn attach_images(graph: &Graph, lookup: &dyn ImageLookup) -> Result<usize> {
    let mut cursor = graph
        .execute(query(
            "MATCH (e:__Entity__) WHERE e.image_url IS NULL RETURN e.id AS id",
        ))
        .await?;
    let mut ids = Vec::new();
    while let Some(row) = cursor.next().await? {
        ids.push(row.get::<String>("id").unwrap_or_default());
    }

    let mut updated = 0;
    for id in ids {
        if let Some(url) = lookup.lookup(&id).await {
            graph
                .run(
                    query("MATCH (e:__Entity__ {id: $id}) SET e.image_url = $url")
                        .param("id", id)
                        .param("url", url),
                )
                .await?;
            updated += 1;
        }
    }

    info!("picture attacher: updated {updated} entities");
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_lookup_always_returns_none() {
        let lookup = NoopImageLookup;
        assert_eq!(lookup.lookup("阿司匹林").await, None);
    }
}
