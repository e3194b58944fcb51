//! Chat server binary
//!
//! Run with: cargo run -p pdf-chat --bin pdf-chat-server -- --document ./my.pdf

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use pdf_chat::{
    config::ChatConfig,
    generation::{ChainSettings, ConversationChain},
    ingestion::{build_index, IngestPipeline},
    providers::{ollama_providers, EmbeddingProvider},
    server::{state::AppState, ChatServer},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Chat with a PDF through a local Ollama server
#[derive(Debug, Parser)]
#[command(name = "pdf-chat-server", version, about)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Document to load at startup
    #[arg(short, long)]
    document: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Ollama base URL
    #[arg(long)]
    ollama_url: Option<String>,
}

impl Args {
    fn apply(self, config: &mut ChatConfig) {
        if let Some(document) = self.document {
            config.document.path = document;
        }
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(url) = self.ollama_url {
            config.llm.base_url = url;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = ChatConfig::load(args.config.as_deref())?;
    args.apply(&mut config);

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pdf_chat=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    config.validate()?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Document: {}", config.document.path.display());
    tracing::info!("  - Chat model: {}", config.llm.chat_model);
    tracing::info!("  - Embedding model: {}", config.llm.embed_model);
    tracing::info!(
        "  - Chunking: {} chars, {} overlap",
        config.chunking.chunk_size,
        config.chunking.chunk_overlap
    );
    tracing::info!("  - Top k: {}", config.retrieval.top_k);

    let (embedder, llm) = ollama_providers(&config.llm)?;

    // Check Ollama
    tracing::info!("Checking Ollama at {}...", config.llm.base_url);
    match embedder.health_check().await {
        Ok(true) => tracing::info!("Ollama is running"),
        _ => {
            tracing::warn!("Ollama not available at {}", config.llm.base_url);
            tracing::warn!("  Start it with `ollama serve` and pull {}", config.llm.embed_model);
        }
    }

    // Load, chunk and embed the document before accepting requests
    let pipeline = IngestPipeline::from_config(&config)?;
    let (_, chunks) = pipeline.prepare(&config.document.path)?;
    let index = build_index(chunks, embedder.as_ref(), config.llm.embed_batch_size).await?;

    let chain = ConversationChain::new(
        embedder,
        llm,
        Arc::new(index),
        &config.prompts,
        ChainSettings::from(&config.retrieval),
    )?;

    let state = AppState::new(config.clone(), chain);
    let server = ChatServer::new(config, state);

    println!("\nServer starting...");
    println!("  Chat:   POST http://{}/chat", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
