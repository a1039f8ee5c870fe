//! Abstracción sobre Rig para chat y embeddings, con timeout y reintento
//! acotados. The OpenAI-only branch and the `answer_with_openai`/
//! `embed_with_openai` call shapes carry an existing `LlmManager`-style
//! split; retry/backoff borrowed from the `backoff` crate usage in
//! `DevsHero-search-scrape`'s `mcp-server`.

use std::time::Duration;

use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use rig::client::{CompletionClient as _, EmbeddingsClient as _};
use rig::completion::Prompt;
use rig::embeddings::EmbeddingModel as _;
use rig::providers::openai::{self, TEXT_EMBEDDING_3_SMALL};
use tracing::warn;

use crate::config::{AppConfig, ConcurrencyConfig, LlmProvider};
use crate::errors::{PipelineError, Result};

/// Classifiers/graders and the query path run near-deterministic;
/// extraction and summarisation run creative.
#[derive(Clone, Copy, Debug)]
pub enum ChatMode {
    Deterministic,
    Creative,
}

impl ChatMode {
    fn temperature(self) -> f64 {
        match self {
            ChatMode::Deterministic => 0.0,
            ChatMode::Creative => 1.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LlmClient {
    provider: LlmProvider,
    embedding_model: String,
    chat_model: String,
    concurrency: ConcurrencyConfig,
}

impl LlmClient {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            provider: cfg.llm_provider.clone(),
            embedding_model: cfg.llm_embedding_model.clone(),
            chat_model: cfg.llm_chat_model.clone(),
            concurrency: cfg.concurrency.clone(),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.concurrency.max_concurrency
    }

    /// Batch embeddings for a list of texts, in caller order.
    pub async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        match self.provider {
            LlmProvider::OpenAI => self.embed_with_openai(texts).await,
            ref other => Err(PipelineError::Embedding(format!(
                "embeddings not implemented for provider {other:?}"
            ))),
        }
    }

    async fn embed_with_openai(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        let client = openai::Client::from_env();
        let model_name = if self.embedding_model.is_empty() {
            TEXT_EMBEDDING_3_SMALL
        } else {
            self.embedding_model.as_str()
        };
        let embedding_model = client.embedding_model(model_name);

        let op = || async {
            embedding_model
                .embed_texts(texts.to_vec())
                .await
                .map_err(|e| backoff::Error::transient(e))
        };
        let embeddings = retry(self.backoff_policy(), op)
            .await
            .map_err(|e| PipelineError::Embedding(e.to_string()))?;

        if embeddings.len() != texts.len() {
            return Err(PipelineError::Embedding(format!(
                "embedding count ({}) does not match input count ({})",
                embeddings.len(),
                texts.len()
            )));
        }
        Ok(embeddings.into_iter().map(|e| e.vec).collect())
    }

    /// A single, timeout- and retry-wrapped chat completion call, defaulting
    /// to `ChatMode::Creative`. See `complete_with_mode` for picking the mode
    /// explicitly.
    pub async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.complete_with_mode(system_prompt, user_prompt, ChatMode::Creative).await
    }

    pub async fn complete_with_mode(&self, system_prompt: &str, user_prompt: &str, mode: ChatMode) -> Result<String> {
        match self.provider {
            LlmProvider::OpenAI => self.complete_with_openai(system_prompt, user_prompt, mode).await,
            ref other => Err(PipelineError::Llm(format!(
                "chat not implemented for provider {other:?}"
            ))),
        }
    }

    async fn complete_with_openai(&self, system_prompt: &str, user_prompt: &str, mode: ChatMode) -> Result<String> {
        let client = openai::Client::from_env();
        let model_name = if self.chat_model.is_empty() {
            "gpt-4o-mini"
        } else {
            self.chat_model.as_str()
        };
        let agent = client
            .agent(model_name)
            .preamble(system_prompt)
            .temperature(mode.temperature())
            .build();

        let timeout = Duration::from_secs(self.concurrency.http_timeout_secs);
        let prompt = user_prompt.to_string();
        let op = || {
            let agent = &agent;
            let prompt = prompt.clone();
            async move {
                tokio::time::timeout(timeout, agent.prompt(prompt))
                    .await
                    .map_err(|_| backoff::Error::transient(PipelineError::Llm("llm call timed out".into())))?
                    .map_err(|e| backoff::Error::transient(PipelineError::Llm(e.to_string())))
            }
        };

        retry(self.backoff_policy(), op).await.map_err(|e| match e {
            backoff::Error::Permanent(e) | backoff::Error::Transient { err: e, .. } => e,
        })
    }

    fn backoff_policy(&self) -> backoff::ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(Duration::from_secs(
                self.concurrency.http_timeout_secs * (self.concurrency.max_retries as u64 + 1),
            )))
            .build()
    }
}

/// Logs and swallows a per-call LLM failure so a single bad chunk/entity
/// doesn't abort the whole batch: `Llm` errors are transient and
/// skip-on-exhaustion, not fatal-for-batch like `GraphDb`.
pub fn log_skip(context: &str, err: &PipelineError) {
    warn!("skipping {context} after exhausting retries: {err}");
}
