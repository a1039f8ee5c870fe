mod api;
mod app_state;
mod chunker;
mod cli;
mod community;
mod config;
mod dedup;
mod embedder;
mod errors;
mod extractor;
mod graph;
mod ingest;
mod llm;
mod merger;
mod models;
mod picture;
mod process;
mod retrieval;
mod summarizer;
mod tokenizer;

use std::sync::{Arc, Mutex};

use axum::Router;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use app_state::{AppState, Status};
use cli::{Cli, Command};
use llm::LlmClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = config::AppConfig::from_env()?;

    let graph = graph::connect_from_config(&cfg).await?;
    graph::ensure_schema(&graph).await?;
    graph::ensure_entity_vector_index(&graph, 1536).await?;

    let client = LlmClient::from_config(&cfg);

    match cli.command {
        Command::Create { dir } => {
            ingest::ingest_directory(&graph, &client, &cfg, &dir).await?;
        }
        Command::Process => {
            process::run_pipeline(&graph, &client, &cfg).await?;
        }
        Command::Query { question, global } => {
            let answer = if global {
                let client = Arc::new(client);
                retrieval::global::answer_global(
                    &graph,
                    client,
                    &cfg.global_retrieval,
                    cfg.concurrency.max_concurrency,
                    &question,
                )
                .await?
            } else {
                retrieval::local::answer_local(&graph, &client, &cfg, &question).await?
            };
            println!("{answer}");
        }
        Command::Picture => {
            let updated = picture::attach_images(&graph, &picture::NoopImageLookup).await?;
            info!("attached images to {updated} entities");
        }
        Command::Serve => {
            let server_addr = cfg.server_addr.clone();
            let app_state = AppState {
                config: cfg,
                graph: Arc::new(graph),
                llm: Arc::new(client),
                status: Arc::new(Mutex::new(Status::default())),
            };

            let app = Router::new().merge(api::create_router(app_state)).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );

            let listener = tokio::net::TcpListener::bind(&server_addr).await?;
            info!("listening on http://{server_addr}");
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
