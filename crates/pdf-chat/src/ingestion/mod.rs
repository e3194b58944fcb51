//! Startup ingestion: load the document, split it, embed the chunks

mod chunker;
mod parser;
mod processor;

pub use chunker::TextChunker;
pub use parser::DocumentLoader;
pub use processor::{build_index, IngestPipeline};
