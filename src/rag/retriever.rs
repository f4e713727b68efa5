//! Ranked retrieval over the document index.

use crate::error::{CoachError, Result};
use crate::index::{DocumentIndex, ScoredChunk, SearchParams};
use crate::model::{RetrievalFilter, RetrievalResult};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Default minimum relevance a chunk needs to be returned.
pub const DEFAULT_MIN_SCORE: f32 = 0.3;

/// Turns a query embedding into ranked retrieval results.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<dyn DocumentIndex>,
    min_score: f32,
}

impl Retriever {
    /// Create a retriever over the given index.
    pub fn new(index: Arc<dyn DocumentIndex>) -> Self {
        Self {
            index,
            min_score: DEFAULT_MIN_SCORE,
        }
    }

    /// Set the minimum relevance threshold.
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn min_score(&self) -> f32 {
        self.min_score
    }

    /// Retrieve up to `k` chunks, best first.
    ///
    /// Returns an empty vector when nothing clears the threshold. Any index
    /// failure surfaces as [`CoachError::IndexUnavailable`].
    #[instrument(skip(self, query_embedding, filter), fields(k = k))]
    pub async fn retrieve(
        &self,
        query_embedding: &[f32],
        k: usize,
        filter: Option<&RetrievalFilter>,
    ) -> Result<Vec<RetrievalResult>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let params = SearchParams::new(k)
            .with_min_score(self.min_score)
            .with_filter(filter.cloned());

        let hits = self
            .index
            .search(query_embedding, &params)
            .await
            .map_err(|e| match e {
                CoachError::IndexUnavailable(msg) => CoachError::IndexUnavailable(msg),
                other => CoachError::IndexUnavailable(other.to_string()),
            })?;

        debug!("Retrieved {} chunks", hits.len());
        Ok(hits.into_iter().map(RetrievalResult::from).collect())
    }
}

impl From<ScoredChunk> for RetrievalResult {
    fn from(hit: ScoredChunk) -> Self {
        Self {
            id: hit.chunk.metadata.chunk_id.clone(),
            score: hit.score.clamp(0.0, 1.0),
            metadata: hit.chunk.metadata,
            content: hit.chunk.content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::test_support::chunk;
    use crate::index::{IndexedChunk, IndexedSource, MemoryDocumentIndex};
    use async_trait::async_trait;

    struct BrokenIndex;

    #[async_trait]
    impl DocumentIndex for BrokenIndex {
        async fn upsert(&self, _chunk: &IndexedChunk) -> Result<()> {
            Ok(())
        }
        async fn upsert_batch(&self, chunks: &[IndexedChunk]) -> Result<usize> {
            Ok(chunks.len())
        }
        async fn search(&self, _q: &[f32], _p: &SearchParams) -> Result<Vec<ScoredChunk>> {
            Err(CoachError::Storage("disk I/O error".to_string()))
        }
        async fn get_chunk(&self, _id: &str) -> Result<Option<IndexedChunk>> {
            Ok(None)
        }
        async fn delete_by_source(&self, _s: &str) -> Result<usize> {
            Ok(0)
        }
        async fn replace_sources(&self, _s: &[String], _c: &[IndexedChunk]) -> Result<usize> {
            Ok(0)
        }
        async fn list_sources(&self) -> Result<Vec<IndexedSource>> {
            Ok(Vec::new())
        }
        async fn chunk_count(&self) -> Result<usize> {
            Ok(0)
        }
    }

    async fn seeded_index() -> Arc<MemoryDocumentIndex> {
        let index = Arc::new(MemoryDocumentIndex::new());
        index
            .upsert_batch(&[
                chunk("best", "Learning by Doing", vec![1.0, 0.0]),
                chunk("good", "Taking Action", vec![0.8, 0.6]),
                chunk("weak", "Cultures Built to Last", vec![0.1, 1.0]),
            ])
            .await
            .unwrap();
        index
    }

    #[tokio::test]
    async fn test_results_ordered_and_thresholded() {
        let retriever = Retriever::new(seeded_index().await).with_min_score(0.5);

        let results = retriever.retrieve(&[1.0, 0.0], 10, None).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();

        assert_eq!(ids, vec!["best", "good"]);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(results.iter().all(|r| (0.0..=1.0).contains(&r.score)));
    }

    #[tokio::test]
    async fn test_empty_when_nothing_relevant() {
        let retriever = Retriever::new(seeded_index().await).with_min_score(0.99);
        let results = retriever.retrieve(&[0.0, -1.0], 5, None).await.unwrap();
        assert!(results.is_empty());

        let retriever = Retriever::new(seeded_index().await);
        assert!(retriever.retrieve(&[1.0, 0.0], 0, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_index_failure_is_unavailable() {
        let retriever = Retriever::new(Arc::new(BrokenIndex));
        let err = retriever.retrieve(&[1.0], 3, None).await.unwrap_err();
        assert!(matches!(err, CoachError::IndexUnavailable(_)));
    }

    #[tokio::test]
    async fn test_topic_filter() {
        let index = seeded_index().await;
        let mut tagged = chunk("tagged", "Taking Action", vec![0.9, 0.1]);
        tagged.metadata.topics = vec!["RTI".to_string()];
        index.upsert(&tagged).await.unwrap();

        let retriever = Retriever::new(index).with_min_score(0.0);
        let filter = RetrievalFilter {
            critical_question: None,
            topics: Some(vec!["rti".to_string()]),
        };
        let results = retriever
            .retrieve(&[1.0, 0.0], 5, Some(&filter))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "tagged");
    }
}
