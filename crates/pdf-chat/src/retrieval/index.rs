//! In-memory vector index over document chunks
//!
//! Built once at startup and never mutated afterwards, so queries take
//! `&self` and need no locking.

use crate::error::{Error, Result};
use crate::types::Chunk;

/// One indexed chunk with its embedding
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub vector: Vec<f32>,
    pub chunk: Chunk,
}

impl IndexEntry {
    pub fn new(vector: Vec<f32>, chunk: Chunk) -> Self {
        Self { vector, chunk }
    }
}

/// Search result with chunk and similarity
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// The retrieved chunk
    pub chunk: Chunk,
    /// Cosine similarity (-1.0 to 1.0, higher is nearer)
    pub similarity: f32,
}

/// Immutable, insertion-ordered collection of embedded chunks
#[derive(Debug, Default)]
pub struct VectorIndex {
    entries: Vec<IndexEntry>,
    /// Precomputed vector norms, parallel to `entries`
    norms: Vec<f32>,
    dimensions: usize,
}

impl VectorIndex {
    /// Build the index; every vector must have the same, non-zero dimension
    pub fn build(entries: Vec<IndexEntry>) -> Result<Self> {
        let dimensions = entries.first().map(|e| e.vector.len()).unwrap_or(0);

        if !entries.is_empty() && dimensions == 0 {
            return Err(Error::vector_index("embeddings must not be empty"));
        }
        if let Some((i, entry)) = entries
            .iter()
            .enumerate()
            .find(|(_, e)| e.vector.len() != dimensions)
        {
            return Err(Error::vector_index(format!(
                "entry {} has dimension {}, expected {}",
                i,
                entry.vector.len(),
                dimensions
            )));
        }

        let norms = entries.iter().map(|e| norm(&e.vector)).collect();

        Ok(Self {
            entries,
            norms,
            dimensions,
        })
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Embedding dimension (0 for an empty index)
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Return the `k` nearest entries by cosine similarity, nearest first
    ///
    /// Ties keep insertion order. `k` larger than the index returns every
    /// entry. Querying an index with no entries is `Error::EmptyIndex`.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if self.is_empty() {
            return Err(Error::EmptyIndex);
        }
        if k == 0 {
            return Ok(Vec::new());
        }
        if vector.len() != self.dimensions {
            return Err(Error::vector_index(format!(
                "query has dimension {}, index has {}",
                vector.len(),
                self.dimensions
            )));
        }

        let query_norm = norm(vector);
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .zip(&self.norms)
            .enumerate()
            .map(|(i, (entry, entry_norm))| {
                (i, cosine(vector, query_norm, &entry.vector, *entry_norm))
            })
            .collect();

        // Stable sort keeps insertion order among equal scores
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, similarity)| SearchHit {
                chunk: self.entries[i].chunk.clone(),
                similarity,
            })
            .collect())
    }
}

fn norm(vector: &[f32]) -> f32 {
    vector.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity; zero-length vectors and NaN scores count as unrelated
fn cosine(a: &[f32], a_norm: f32, b: &[f32], b_norm: f32) -> f32 {
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let similarity = dot / (a_norm * b_norm);
    if similarity.is_nan() {
        0.0
    } else {
        similarity
    }
}
