//! In-memory document index.
//!
//! Useful for testing and small libraries.

use super::{
    score_candidates, DocumentIndex, IndexedChunk, IndexedSource, ScoredChunk, SearchParams,
};
use crate::error::{CoachError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// In-memory document index.
pub struct MemoryDocumentIndex {
    chunks: RwLock<HashMap<String, IndexedChunk>>,
}

impl MemoryDocumentIndex {
    /// Create an empty in-memory index.
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, IndexedChunk>>> {
        self.chunks
            .read()
            .map_err(|e| CoachError::IndexUnavailable(format!("Failed to acquire lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, IndexedChunk>>> {
        self.chunks
            .write()
            .map_err(|e| CoachError::IndexUnavailable(format!("Failed to acquire lock: {}", e)))
    }
}

impl Default for MemoryDocumentIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentIndex for MemoryDocumentIndex {
    async fn upsert(&self, chunk: &IndexedChunk) -> Result<()> {
        self.write()?
            .insert(chunk.id().to_string(), chunk.clone());
        Ok(())
    }

    async fn upsert_batch(&self, chunks: &[IndexedChunk]) -> Result<usize> {
        let mut store = self.write()?;
        for chunk in chunks {
            store.insert(chunk.id().to_string(), chunk.clone());
        }
        Ok(chunks.len())
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        params: &SearchParams,
    ) -> Result<Vec<ScoredChunk>> {
        let chunks = self.read()?;
        Ok(score_candidates(
            chunks.values().cloned(),
            query_embedding,
            params,
        ))
    }

    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<IndexedChunk>> {
        Ok(self.read()?.get(chunk_id).cloned())
    }

    async fn delete_by_source(&self, source_document: &str) -> Result<usize> {
        let mut chunks = self.write()?;
        let initial_len = chunks.len();
        chunks.retain(|_, c| c.metadata.source_document != source_document);
        Ok(initial_len - chunks.len())
    }

    async fn replace_sources(&self, sources: &[String], chunks: &[IndexedChunk]) -> Result<usize> {
        let mut store = self.write()?;
        let initial_len = store.len();
        store.retain(|_, c| !sources.contains(&c.metadata.source_document));
        let removed = initial_len - store.len();
        for chunk in chunks {
            store.insert(chunk.id().to_string(), chunk.clone());
        }
        Ok(removed)
    }

    async fn list_sources(&self) -> Result<Vec<IndexedSource>> {
        let chunks = self.read()?;

        let mut source_map: HashMap<String, IndexedSource> = HashMap::new();

        for chunk in chunks.values() {
            let entry = source_map
                .entry(chunk.metadata.source_document.clone())
                .or_insert_with(|| IndexedSource {
                    source_document: chunk.metadata.source_document.clone(),
                    author: chunk.metadata.author.clone(),
                    chunk_count: 0,
                    indexed_at: chunk.indexed_at,
                });

            entry.chunk_count += 1;
            if chunk.indexed_at > entry.indexed_at {
                entry.indexed_at = chunk.indexed_at;
            }
        }

        let mut sources: Vec<IndexedSource> = source_map.into_values().collect();
        sources.sort_by(|a, b| {
            b.indexed_at
                .cmp(&a.indexed_at)
                .then_with(|| a.source_document.cmp(&b.source_document))
        });

        Ok(sources)
    }

    async fn chunk_count(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }
}
