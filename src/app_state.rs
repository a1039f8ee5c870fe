//! Shared state for the `serve` CLI verb's status/query HTTP surface.
//!
//! The directory-picker and shutdown-channel fields of an earlier web-UI
//! shaped `AppState` are dropped: ingestion here runs as its own CLI verb
//! (`create`), not as a web-triggered action.

use std::sync::{Arc, Mutex};

use neo4rs::Graph;
use serde::Serialize;

use crate::config::AppConfig;
use crate::llm::LlmClient;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub graph: Arc<Graph>,
    pub llm: Arc<LlmClient>,
    pub status: Arc<Mutex<Status>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub is_busy: bool,
    pub message: String,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            is_busy: false,
            message: "ready".to_string(),
        }
    }
}
