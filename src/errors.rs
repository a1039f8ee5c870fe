//! Error taxonomy for the pipeline. Components return `PipelineError` so
//! callers can tell a transient failure (retry-then-skip) from a fatal one
//! (abort the batch) apart; `main` and the CLI boundary collapse everything
//! to `anyhow::Result`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("graph database error: {0}")]
    GraphDb(#[from] neo4rs::Error),

    #[error("LLM call failed: {0}")]
    Llm(String),

    #[error("failed to parse extractor output: {0}")]
    Parse(String),

    #[error("embedding call failed: {0}")]
    Embedding(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
