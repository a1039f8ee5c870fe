//! Carga y gestión de configuración de la aplicación (Neo4j + LLM + pipeline knobs).

use std::env;

use anyhow::{anyhow, Result};

#[derive(Clone, Debug)]
pub enum LlmProvider {
    OpenAI,
    Gemini,
    Ollama,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }
}

/// Delimiters of the extractor's tuple protocol.
#[derive(Clone, Debug)]
pub struct ExtractionDelimiters {
    pub tuple_delimiter: String,
    pub record_delimiter: String,
    pub completion_delimiter: String,
}

impl Default for ExtractionDelimiters {
    fn default() -> Self {
        Self {
            tuple_delimiter: " : ".to_string(),
            record_delimiter: "\n".to_string(),
            completion_delimiter: "\n\n".to_string(),
        }
    }
}

/// Tunables governing the chunker.
#[derive(Clone, Debug)]
pub struct ChunkerConfig {
    pub chunk_size: usize,
    pub overlap: usize,
    pub sentence_terminators: Vec<char>,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 300,
            overlap: 50,
            sentence_terminators: vec!['。', '！', '？'],
        }
    }
}

/// Tunables governing the deduplicator.
#[derive(Clone, Debug)]
pub struct DedupConfig {
    pub similarity_cutoff: f64,
    pub word_edit_distance: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            similarity_cutoff: 0.94,
            word_edit_distance: 3,
        }
    }
}

/// Tunables governing the summariser.
#[derive(Clone, Debug)]
pub struct SummaryConfig {
    pub token_budget: usize,
    pub chars_per_token: f64,
    pub min_community_size: usize,
    pub rewrite_entity_threshold: usize,
    pub rewrite_relationship_threshold: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            token_budget: 120_000,
            chars_per_token: 0.6,
            min_community_size: 4,
            rewrite_entity_threshold: 1000,
            rewrite_relationship_threshold: 60,
        }
    }
}

/// Tunables governing the local retriever.
#[derive(Clone, Debug)]
pub struct LocalRetrievalConfig {
    pub top_entities: usize,
    pub top_chunks: usize,
    pub top_communities: usize,
    pub top_outside_rels: usize,
    pub top_inside_rels: usize,
}

impl Default for LocalRetrievalConfig {
    fn default() -> Self {
        Self {
            top_entities: 10,
            top_chunks: 3,
            top_communities: 3,
            top_outside_rels: 10,
            top_inside_rels: 10,
        }
    }
}

/// Tunables governing the global retriever.
#[derive(Clone, Debug)]
pub struct GlobalRetrievalConfig {
    pub community_level: i64,
    pub score_threshold: i64,
}

impl Default for GlobalRetrievalConfig {
    fn default() -> Self {
        Self {
            community_level: 0,
            score_threshold: 60,
        }
    }
}

/// Tunables governing the community builder.
#[derive(Clone, Debug)]
pub struct CommunityConfig {
    pub max_iterations: usize,
    pub memory_threshold: f64,
}

impl Default for CommunityConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10_000,
            memory_threshold: 0.15,
        }
    }
}

/// Concurrency caps shared by extraction, summarisation and global-map stages.
#[derive(Clone, Debug)]
pub struct ConcurrencyConfig {
    pub max_concurrency: usize,
    pub http_timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 12,
            http_timeout_secs: 10,
            max_retries: 3,
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub server_addr: String,

    pub llm_provider: LlmProvider,
    pub llm_embedding_model: String,
    pub llm_chat_model: String,

    pub extraction: ExtractionDelimiters,
    pub chunker: ChunkerConfig,
    pub dedup: DedupConfig,
    pub summary: SummaryConfig,
    pub local_retrieval: LocalRetrievalConfig,
    pub global_retrieval: GlobalRetrievalConfig,
    pub community: CommunityConfig,
    pub concurrency: ConcurrencyConfig,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let neo4j_uri =
            env::var("NEO4J_URI").map_err(|_| anyhow!("Falta NEO4J_URI en el entorno"))?;
        let neo4j_user =
            env::var("NEO4J_USER").map_err(|_| anyhow!("Falta NEO4J_USER en el entorno"))?;
        let neo4j_password = env::var("NEO4J_PASSWORD")
            .map_err(|_| anyhow!("Falta NEO4J_PASSWORD en el entorno"))?;

        let server_addr =
            env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:3322".to_string());

        let llm_provider_str =
            env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let llm_provider = LlmProvider::from_str(&llm_provider_str)?;

        let llm_embedding_model = env::var("LLM_EMBEDDING_MODEL")
            .unwrap_or_else(|_| "text-embedding-3-small".to_string());
        let llm_chat_model =
            env::var("LLM_CHAT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        let chunk_size = env_usize("CHUNK_SIZE", 300);
        let overlap = env_usize("CHUNK_OVERLAP", 50);
        if overlap >= chunk_size {
            return Err(anyhow!(
                "CHUNK_OVERLAP ({overlap}) debe ser menor que CHUNK_SIZE ({chunk_size})"
            ));
        }
        let chunker = ChunkerConfig {
            chunk_size,
            overlap,
            ..ChunkerConfig::default()
        };

        let dedup = DedupConfig {
            similarity_cutoff: env_f64("SIMILARITY_CUTOFF", DedupConfig::default().similarity_cutoff),
            word_edit_distance: env_usize(
                "WORD_EDIT_DISTANCE",
                DedupConfig::default().word_edit_distance,
            ),
        };

        let concurrency = ConcurrencyConfig {
            max_concurrency: env_usize(
                "MAX_CONCURRENCY",
                ConcurrencyConfig::default().max_concurrency,
            ),
            ..ConcurrencyConfig::default()
        };

        Ok(Self {
            neo4j_uri,
            neo4j_user,
            neo4j_password,
            server_addr,
            llm_provider,
            llm_embedding_model,
            llm_chat_model,
            extraction: ExtractionDelimiters::default(),
            chunker,
            dedup,
            summary: SummaryConfig::default(),
            local_retrieval: LocalRetrievalConfig::default(),
            global_retrieval: GlobalRetrievalConfig::default(),
            community: CommunityConfig::default(),
            concurrency,
        })
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
