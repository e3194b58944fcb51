//! Ingestion pipeline orchestration

use std::path::Path;

use crate::config::ChatConfig;
use crate::error::{Error, Result};
use crate::providers::EmbeddingProvider;
use crate::retrieval::{IndexEntry, VectorIndex};
use crate::types::{Chunk, LoadedDocument};

use super::chunker::TextChunker;
use super::parser::DocumentLoader;

/// Load + chunk pipeline run once at startup
#[derive(Debug, Clone)]
pub struct IngestPipeline {
    loader: DocumentLoader,
    chunker: TextChunker,
}

impl IngestPipeline {
    /// Create a pipeline from explicit parts
    pub fn new(loader: DocumentLoader, chunker: TextChunker) -> Self {
        Self { loader, chunker }
    }

    /// Create a pipeline from the service configuration
    pub fn from_config(config: &ChatConfig) -> Result<Self> {
        let loader = DocumentLoader::new(config.document.extract_timeout());
        let chunker = TextChunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?;
        Ok(Self::new(loader, chunker))
    }

    /// Load the document at `path`
    pub fn load(&self, path: &Path) -> Result<LoadedDocument> {
        self.loader.load(path)
    }

    /// Split a loaded document into ordered chunks
    pub fn create_chunks(&self, doc: &LoadedDocument) -> Vec<Chunk> {
        let chunks = self.chunker.chunk_pages(&doc.pages);
        if chunks.is_empty() {
            tracing::warn!("{} produced no text to index", doc.path.display());
        }
        chunks
    }

    /// Full preparation: load + chunk
    pub fn prepare(&self, path: &Path) -> Result<(LoadedDocument, Vec<Chunk>)> {
        let doc = self.load(path)?;
        let chunks = self.create_chunks(&doc);

        tracing::info!(
            "Split {} chars into {} chunks (size {}, overlap {})",
            doc.char_count(),
            chunks.len(),
            self.chunker.chunk_size(),
            self.chunker.overlap()
        );

        Ok((doc, chunks))
    }
}

/// Embed every chunk in batches and build the search index
///
/// Any embedding failure aborts the build; there is no partial index.
pub async fn build_index(
    chunks: Vec<Chunk>,
    embedder: &dyn EmbeddingProvider,
    batch_size: usize,
) -> Result<VectorIndex> {
    let batch_size = batch_size.max(1);
    let total = chunks.len();
    let mut entries = Vec::with_capacity(total);
    let mut pending = chunks.into_iter().peekable();

    while pending.peek().is_some() {
        let batch: Vec<Chunk> = pending.by_ref().take(batch_size).collect();
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();

        let vectors = embedder.embed_batch(&texts).await?;
        if vectors.len() != batch.len() {
            return Err(Error::embedding(format!(
                "{} returned {} embeddings for {} chunks",
                embedder.name(),
                vectors.len(),
                batch.len()
            )));
        }

        entries.extend(
            vectors
                .into_iter()
                .zip(batch)
                .map(|(vector, chunk)| IndexEntry::new(vector, chunk)),
        );
        tracing::debug!("Embedded {}/{} chunks", entries.len(), total);
    }

    let index = VectorIndex::build(entries)?;
    tracing::info!(
        "Built vector index: {} entries, {} dimensions",
        index.len(),
        index.dimensions()
    );

    Ok(index)
}
