//! Modelos de dominio del grafo de conocimiento.
//!
//! Siguiendo la nota de diseño de la arena (entidades/relaciones referenciadas
//! por `id`, nunca por puntero compartido): estas son structs planas, no un
//! grafo en memoria con referencias cíclicas.

use serde::{Deserialize, Serialize};

/// Nodo `__Document__`: único por `file_name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentNode {
    pub file_name: String,
    pub doc_type: String,
    pub uri: String,
}

/// Nodo `__Chunk__`: único por `id = SHA1(text)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkNode {
    pub id: String,
    pub text: String,
    pub position: i64,
    pub length: i64,
    pub file_name: String,
    pub content_offset: i64,
    pub tokens: i64,
}

/// Nodo `__Entity__`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityNode {
    pub id: String,
    pub entity_type: String,
    pub description: String,
    pub embedding: Option<Vec<f64>>,
}

impl EntityNode {
    /// `type="未知"` sentinel used for relationship endpoints with no entity record.
    pub const UNKNOWN_TYPE: &'static str = "未知";
    /// Sentinel emitted for anything outside the closed entity/relation type lists.
    pub const OTHER_TYPE: &'static str = "其他";
    /// Sentinel label every merged/created entity carries.
    pub const BASE_LABEL: &'static str = "__Entity__";

    pub fn placeholder(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entity_type: Self::UNKNOWN_TYPE.to_string(),
            description: String::new(),
            embedding: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.entity_type == Self::UNKNOWN_TYPE
    }

    /// `id + "\n" + description`, the fixed text the embedder vectorises.
    pub fn embedding_text(&self) -> String {
        format!("{}\n{}", self.id, self.description)
    }
}

/// Relación dirigida entre dos entidades.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipEdge {
    pub source_id: String,
    pub target_id: String,
    pub rel_type: String,
    pub description: String,
    pub weight: f64,
}

/// Nodo `__Community__`: id de la forma `"<level>-<number>"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityNode {
    pub id: String,
    pub level: i64,
    pub summary: Option<String>,
    pub community_rank: i64,
    pub weight: f64,
}

/// Coalesce de descripciones: operación idempotente y conmutativa.
/// `coalesce(a, "") = a`, `coalesce("", b) = b`, en otro caso `a + "；" + b`.
pub fn coalesce_description(old: &str, new: &str) -> String {
    let old = old.trim();
    let new = new.trim();
    match (old.is_empty(), new.is_empty()) {
        (true, true) => String::new(),
        (true, false) => new.to_string(),
        (false, true) => old.to_string(),
        (false, false) => format!("{old}；{new}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coalesce_keeps_non_empty_side() {
        assert_eq!(coalesce_description("X", ""), "X");
        assert_eq!(coalesce_description("", "Y"), "Y");
        assert_eq!(coalesce_description("", ""), "");
    }

    #[test]
    fn coalesce_joins_with_chinese_semicolon() {
        assert_eq!(coalesce_description("X", "Y"), "X；Y");
    }

    #[test]
    fn embedding_text_joins_id_and_description() {
        let e = EntityNode {
            id: "阿司匹林".to_string(),
            entity_type: "药物".to_string(),
            description: "抗血小板药".to_string(),
            embedding: None,
        };
        assert_eq!(e.embedding_text(), "阿司匹林\n抗血小板药");
    }
}
