//! Nearest-neighbor retrieval over embedded chunks

pub mod index;

pub use index::{IndexEntry, SearchHit, VectorIndex};
