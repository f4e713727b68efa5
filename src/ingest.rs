//! Ingestion of pre-chunked library content into the document index.
//!
//! Input is either a JSON array or JSON Lines of chunk records. Records are
//! embedded in batches with bounded concurrency and upserted into the index.

use crate::config::EmbeddingSettings;
use crate::embedding::Embedder;
use crate::error::{CoachError, Result};
use crate::index::{DocumentIndex, IndexedChunk};
use crate::model::{ChunkMetadata, CriticalQuestion, EmbeddingResult};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument};

/// One chunk as it appears in an ingestion file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRecord {
    #[serde(default)]
    pub chunk_id: Option<String>,
    pub source_document: String,
    pub author: String,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub page_number: Option<u32>,
    #[serde(default)]
    pub critical_question: Option<CriticalQuestion>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
    pub content: String,
    #[serde(default)]
    pub token_count: Option<u32>,
}

/// Outcome of an ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub chunks_indexed: usize,
    pub sources: Vec<String>,
    /// Chunks deleted because their source was replaced.
    pub chunks_replaced: usize,
}

/// Read chunk records from a `.json` or `.jsonl` file.
pub fn load_records(path: &Path) -> Result<Vec<ChunkRecord>> {
    let content = std::fs::read_to_string(path)?;
    let jsonl = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jsonl"));
    parse_records(&content, jsonl)
}

/// Parse chunk records from a JSON array or, with `jsonl`, one object per line.
pub fn parse_records(content: &str, jsonl: bool) -> Result<Vec<ChunkRecord>> {
    if !jsonl {
        return Ok(serde_json::from_str(content)?);
    }

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|e| {
                CoachError::Validation(format!("line {}: {}", i + 1, e))
            })
        })
        .collect()
}

/// Stable chunk id from source, section and position within the source.
pub fn derive_chunk_id(source_document: &str, section: Option<&str>, ordinal: usize) -> String {
    let mut id = slug(source_document);
    if let Some(section) = section.map(slug).filter(|s| !s.is_empty()) {
        id.push('-');
        id.push_str(&section);
    }
    format!("{}-{:04}", id, ordinal)
}

fn slug(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Rough token count: about four tokens for every three words.
pub fn estimate_tokens(content: &str) -> u32 {
    let words = content.split_whitespace().count() as u32;
    (words * 4).div_ceil(3)
}

/// Validate records and turn them into index metadata, in input order.
pub fn prepare(records: Vec<ChunkRecord>) -> Result<Vec<(ChunkMetadata, String)>> {
    let mut ordinals: HashMap<String, usize> = HashMap::new();
    let mut prepared = Vec::with_capacity(records.len());

    for (i, record) in records.into_iter().enumerate() {
        if record.content.trim().is_empty() {
            return Err(CoachError::Validation(format!(
                "record {}: content must not be blank",
                i + 1
            )));
        }
        if record.source_document.trim().is_empty() {
            return Err(CoachError::Validation(format!(
                "record {}: sourceDocument must not be blank",
                i + 1
            )));
        }

        let ordinal = ordinals.entry(record.source_document.clone()).or_insert(0);
        *ordinal += 1;

        let chunk_id = record
            .chunk_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| {
                derive_chunk_id(&record.source_document, record.section.as_deref(), *ordinal)
            });
        let token_count = record
            .token_count
            .unwrap_or_else(|| estimate_tokens(&record.content));

        prepared.push((
            ChunkMetadata {
                chunk_id,
                source_document: record.source_document,
                author: record.author,
                section: record.section,
                page_number: record.page_number,
                critical_question: record.critical_question,
                topics: record.topics,
                token_count,
                url: record.url,
            },
            record.content,
        ));
    }

    Ok(prepared)
}

/// Embeds chunk records and writes them to the index.
pub struct Ingestor {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn DocumentIndex>,
    batch_size: usize,
    max_concurrent: usize,
    show_progress: bool,
}

impl Ingestor {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn DocumentIndex>,
        settings: &EmbeddingSettings,
    ) -> Self {
        Self {
            embedder,
            index,
            batch_size: settings.batch_size.max(1),
            max_concurrent: settings.max_concurrent.max(1),
            show_progress: false,
        }
    }

    /// Draw a progress bar on stderr while embedding.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Embed and index the records.
    ///
    /// Nothing is written unless every record validates and every batch
    /// embeds. With `replace`, existing chunks of each source in the input
    /// are swapped out for the new ones in a single index write.
    #[instrument(skip(self, records), fields(records = records.len()))]
    pub async fn ingest(&self, records: Vec<ChunkRecord>, replace: bool) -> Result<IngestReport> {
        let prepared = prepare(records)?;
        if prepared.is_empty() {
            return Ok(IngestReport::default());
        }

        let vectors = self.embed_all(&prepared).await?;
        let embeddings: Vec<EmbeddingResult> = prepared
            .iter()
            .zip(vectors)
            .map(|((meta, _), embedding)| EmbeddingResult {
                embedding,
                chunk_id: meta.chunk_id.clone(),
            })
            .collect();

        let sources: Vec<String> = prepared
            .iter()
            .map(|(meta, _)| meta.source_document.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let chunks: Vec<IndexedChunk> = prepared
            .into_iter()
            .zip(embeddings)
            .map(|((metadata, content), result)| {
                debug_assert_eq!(metadata.chunk_id, result.chunk_id);
                IndexedChunk::new(metadata, content, result.embedding)
            })
            .collect();
        let chunks_indexed = chunks.len();
        let chunks_replaced = if replace {
            self.index.replace_sources(&sources, &chunks).await?
        } else {
            self.index.upsert_batch(&chunks).await?;
            0
        };

        info!(
            "Indexed {} chunks from {} sources ({} replaced)",
            chunks_indexed,
            sources.len(),
            chunks_replaced
        );

        Ok(IngestReport {
            chunks_indexed,
            sources,
            chunks_replaced,
        })
    }

    async fn embed_all(&self, prepared: &[(ChunkMetadata, String)]) -> Result<Vec<Vec<f32>>> {
        let batches: Vec<Vec<String>> = prepared
            .chunks(self.batch_size)
            .map(|batch| batch.iter().map(|(_, content)| content.clone()).collect())
            .collect();

        let pb = if self.show_progress {
            let pb = ProgressBar::new(prepared.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {spinner:.green} Embedding [{bar:30.cyan/blue}] {pos}/{len}")
                    .map_err(|e| CoachError::Config(e.to_string()))?
                    .progress_chars("█▓░"),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        let mut results: Vec<(usize, Vec<Vec<f32>>)> = Vec::with_capacity(batches.len());
        let mut stream = stream::iter(batches.into_iter().enumerate())
            .map(|(idx, texts)| async move {
                let result = self.embedder.embed_batch(&texts).await;
                (idx, texts.len(), result)
            })
            .buffer_unordered(self.max_concurrent);

        while let Some((idx, expected, result)) = stream.next().await {
            let vectors = match result {
                Ok(vectors) => vectors,
                Err(e) => {
                    pb.finish_and_clear();
                    return Err(e);
                }
            };
            if vectors.len() != expected {
                pb.finish_and_clear();
                return Err(CoachError::Embedding(format!(
                    "batch {} returned {} embeddings for {} texts",
                    idx,
                    vectors.len(),
                    expected
                )));
            }
            let dimensions = self.embedder.dimensions();
            if let Some(bad) = vectors.iter().find(|v| v.len() != dimensions) {
                pb.finish_and_clear();
                return Err(CoachError::Embedding(format!(
                    "batch {} returned a {}-dimensional embedding, expected {}",
                    idx,
                    bad.len(),
                    dimensions
                )));
            }
            pb.inc(expected as u64);
            results.push((idx, vectors));
        }
        pb.finish_and_clear();

        results.sort_by_key(|(idx, _)| *idx);
        Ok(results.into_iter().flat_map(|(_, vectors)| vectors).collect())
    }
}
