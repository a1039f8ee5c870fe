//! Command-line surface: `create`, `process`, `query`, `picture`, `serve`.
//!
//! The startup sequence each verb shares (config load -> connect -> ensure
//! schema/index -> dispatch) is reshaped around `clap`'s derive API.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "stroke-graphrag", about = "GraphRAG pipeline over a medical knowledge graph")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ingest a directory of `.txt` files: chunk, extract, write to the graph.
    Create {
        /// Directory containing the corpus's `.txt` files.
        dir: PathBuf,
    },
    /// Run the post-ingest pipeline: embed, deduplicate, detect communities, summarise.
    Process,
    /// Answer one question against the graph.
    Query {
        question: String,
        /// Use the global (map/reduce over community summaries) retriever instead of local.
        #[arg(long)]
        global: bool,
    },
    /// Attach representative images to entities missing one.
    Picture,
    /// Serve the `/api/status` and `/api/query` HTTP endpoints.
    Serve,
}
