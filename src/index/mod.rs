//! Document index: embedded text chunks keyed by chunk id.
//!
//! Provides a trait-based interface over the storage backends. Both backends
//! score with cosine similarity and share the ranking rules in [`rank`].

mod memory;
mod sqlite;

pub use memory::MemoryDocumentIndex;
pub use sqlite::SqliteDocumentIndex;

use crate::error::Result;
use crate::model::{ChunkMetadata, RetrievalFilter};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A chunk stored in the index together with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedChunk {
    pub metadata: ChunkMetadata,
    pub content: String,
    pub embedding: Vec<f32>,
    pub indexed_at: DateTime<Utc>,
}

impl IndexedChunk {
    /// Create a chunk stamped with the current time.
    pub fn new(metadata: ChunkMetadata, content: String, embedding: Vec<f32>) -> Self {
        Self {
            metadata,
            content,
            embedding,
            indexed_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.metadata.chunk_id
    }
}

/// A chunk with its similarity to a query.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: IndexedChunk,
    /// Cosine similarity (higher is better).
    pub score: f32,
}

/// Parameters for a similarity search.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub limit: usize,
    pub min_score: f32,
    pub filter: Option<RetrievalFilter>,
}

impl SearchParams {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            min_score: 0.0,
            filter: None,
        }
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn with_filter(mut self, filter: Option<RetrievalFilter>) -> Self {
        self.filter = filter.filter(|f| !f.is_empty());
        self
    }
}

/// Summary information about an indexed source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedSource {
    pub source_document: String,
    pub author: String,
    pub chunk_count: u32,
    pub indexed_at: DateTime<Utc>,
}

/// Trait for document index implementations.
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Store a chunk, replacing any chunk with the same id.
    async fn upsert(&self, chunk: &IndexedChunk) -> Result<()>;

    /// Bulk upsert chunks.
    async fn upsert_batch(&self, chunks: &[IndexedChunk]) -> Result<usize>;

    /// Search for chunks similar to the query embedding, ranked best first.
    async fn search(&self, query_embedding: &[f32], params: &SearchParams)
        -> Result<Vec<ScoredChunk>>;

    /// Fetch a chunk by id.
    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<IndexedChunk>>;

    /// Delete all chunks of a source document.
    async fn delete_by_source(&self, source_document: &str) -> Result<usize>;

    /// Atomically drop every chunk of `sources` and store `chunks` in their
    /// place. Returns the number of chunks removed. On error the index is
    /// left unchanged.
    async fn replace_sources(&self, sources: &[String], chunks: &[IndexedChunk]) -> Result<usize>;

    /// List all indexed source documents, most recently indexed first.
    async fn list_sources(&self) -> Result<Vec<IndexedSource>>;

    /// Get total chunk count.
    async fn chunk_count(&self) -> Result<usize>;
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Ranking order: score descending, then newer chunks, then chunk id ascending.
pub fn compare_ranked(a: &ScoredChunk, b: &ScoredChunk) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.chunk.indexed_at.cmp(&a.chunk.indexed_at))
        .then_with(|| a.chunk.id().cmp(b.chunk.id()))
}

/// Sort into ranking order and keep the best `limit`.
pub fn rank(results: &mut Vec<ScoredChunk>, limit: usize) {
    results.sort_by(compare_ranked);
    results.truncate(limit);
}

/// Score candidate chunks against a query and rank the survivors.
pub(crate) fn score_candidates<I>(
    candidates: I,
    query_embedding: &[f32],
    params: &SearchParams,
) -> Vec<ScoredChunk>
where
    I: IntoIterator<Item = IndexedChunk>,
{
    let mut results: Vec<ScoredChunk> = candidates
        .into_iter()
        .filter(|chunk| {
            params
                .filter
                .as_ref()
                .map_or(true, |f| f.matches(&chunk.metadata))
        })
        .map(|chunk| {
            let score = cosine_similarity(query_embedding, &chunk.embedding);
            ScoredChunk { chunk, score }
        })
        .filter(|r| !r.score.is_nan() && r.score >= params.min_score)
        .collect();

    rank(&mut results, params.limit);
    results
}
