//! SQLite-based document index.
//!
//! Embeddings are stored as little-endian f32 blobs and cosine similarity is
//! computed in Rust, which is plenty for a curated PLC library.

use super::{
    score_candidates, DocumentIndex, IndexedChunk, IndexedSource, ScoredChunk, SearchParams,
};
use crate::error::{CoachError, Result};
use crate::model::{ChunkMetadata, CriticalQuestion};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument, warn};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS chunks (
    chunk_id TEXT PRIMARY KEY,
    source_document TEXT NOT NULL,
    author TEXT NOT NULL,
    section TEXT,
    page_number INTEGER,
    critical_question INTEGER,
    topics TEXT NOT NULL,
    token_count INTEGER NOT NULL,
    url TEXT,
    content TEXT NOT NULL,
    embedding BLOB NOT NULL,
    indexed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source_document);
CREATE INDEX IF NOT EXISTS idx_chunks_indexed_at ON chunks(indexed_at);
"#;

const SELECT_COLUMNS: &str = "chunk_id, source_document, author, section, page_number, \
     critical_question, topics, token_count, url, content, embedding, indexed_at";

/// SQLite-based document index.
pub struct SqliteDocumentIndex {
    conn: Mutex<Connection>,
}

impl SqliteDocumentIndex {
    /// Open (or create) an index at the given path.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Initialized SQLite document index at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory index (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| CoachError::IndexUnavailable(format!("Failed to acquire lock: {}", e)))
    }

    /// Serialize embedding to bytes.
    fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Deserialize embedding from bytes.
    fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| {
                let arr: [u8; 4] = chunk.try_into().unwrap_or_default();
                f32::from_le_bytes(arr)
            })
            .collect()
    }

    fn parse_timestamp(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    fn row_to_chunk(row: &Row<'_>) -> rusqlite::Result<IndexedChunk> {
        let question: Option<u8> = row.get(5)?;
        let topics_json: String = row.get(6)?;
        let embedding_bytes: Vec<u8> = row.get(10)?;
        let indexed_at: String = row.get(11)?;

        Ok(IndexedChunk {
            metadata: ChunkMetadata {
                chunk_id: row.get(0)?,
                source_document: row.get(1)?,
                author: row.get(2)?,
                section: row.get(3)?,
                page_number: row.get(4)?,
                critical_question: question.and_then(|q| CriticalQuestion::try_from(q).ok()),
                topics: serde_json::from_str(&topics_json).unwrap_or_default(),
                token_count: row.get(7)?,
                url: row.get(8)?,
            },
            content: row.get(9)?,
            embedding: Self::bytes_to_embedding(&embedding_bytes),
            indexed_at: Self::parse_timestamp(&indexed_at),
        })
    }

    fn insert(conn: &Connection, chunk: &IndexedChunk) -> Result<()> {
        let meta = &chunk.metadata;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO chunks
            (chunk_id, source_document, author, section, page_number, critical_question,
             topics, token_count, url, content, embedding, indexed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                meta.chunk_id,
                meta.source_document,
                meta.author,
                meta.section,
                meta.page_number,
                meta.critical_question.map(|q| q.number()),
                serde_json::to_string(&meta.topics)?,
                meta.token_count,
                meta.url,
                chunk.content,
                Self::embedding_to_bytes(&chunk.embedding),
                chunk.indexed_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl DocumentIndex for SqliteDocumentIndex {
    #[instrument(skip(self, chunk), fields(chunk_id = %chunk.id()))]
    async fn upsert(&self, chunk: &IndexedChunk) -> Result<()> {
        let conn = self.lock()?;
        Self::insert(&conn, chunk)?;
        debug!("Upserted chunk {}", chunk.id());
        Ok(())
    }

    #[instrument(skip(self, chunks), fields(count = chunks.len()))]
    async fn upsert_batch(&self, chunks: &[IndexedChunk]) -> Result<usize> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        for chunk in chunks {
            Self::insert(&tx, chunk)?;
        }

        tx.commit()?;
        info!("Batch upserted {} chunks", chunks.len());
        Ok(chunks.len())
    }

    #[instrument(skip(self, query_embedding, params), fields(limit = params.limit))]
    async fn search(
        &self,
        query_embedding: &[f32],
        params: &SearchParams,
    ) -> Result<Vec<ScoredChunk>> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(&format!("SELECT {} FROM chunks", SELECT_COLUMNS))
            .map_err(|e| CoachError::IndexUnavailable(e.to_string()))?;

        let rows = stmt
            .query_map([], Self::row_to_chunk)
            .map_err(|e| CoachError::IndexUnavailable(e.to_string()))?;

        let candidates = rows.filter_map(|row| match row {
            Ok(chunk) => Some(chunk),
            Err(e) => {
                warn!("Skipping unreadable chunk row: {}", e);
                None
            }
        });

        let results = score_candidates(candidates, query_embedding, params);
        debug!("Found {} matching chunks", results.len());
        Ok(results)
    }

    #[instrument(skip(self))]
    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<IndexedChunk>> {
        let conn = self.lock()?;

        let chunk = conn.query_row(
            &format!("SELECT {} FROM chunks WHERE chunk_id = ?1", SELECT_COLUMNS),
            params![chunk_id],
            Self::row_to_chunk,
        );

        match chunk {
            Ok(c) => Ok(Some(c)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    async fn delete_by_source(&self, source_document: &str) -> Result<usize> {
        let conn = self.lock()?;

        let deleted = conn.execute(
            "DELETE FROM chunks WHERE source_document = ?1",
            params![source_document],
        )?;

        info!("Deleted {} chunks for {}", deleted, source_document);
        Ok(deleted)
    }

    #[instrument(skip(self, chunks), fields(sources = sources.len(), chunks = chunks.len()))]
    async fn replace_sources(&self, sources: &[String], chunks: &[IndexedChunk]) -> Result<usize> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        let mut removed = 0;
        for source in sources {
            removed += tx.execute(
                "DELETE FROM chunks WHERE source_document = ?1",
                params![source],
            )?;
        }
        for chunk in chunks {
            Self::insert(&tx, chunk)?;
        }

        tx.commit()?;
        info!("Replaced {} chunks with {}", removed, chunks.len());
        Ok(removed)
    }

    #[instrument(skip(self))]
    async fn list_sources(&self) -> Result<Vec<IndexedSource>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT source_document, MIN(author), COUNT(*) AS chunk_count,
                   MAX(indexed_at) AS indexed_at
            FROM chunks
            GROUP BY source_document
            ORDER BY indexed_at DESC, source_document ASC
            "#,
        )?;

        let sources = stmt.query_map([], |row| {
            let indexed_at: String = row.get(3)?;
            Ok(IndexedSource {
                source_document: row.get(0)?,
                author: row.get(1)?,
                chunk_count: row.get(2)?,
                indexed_at: Self::parse_timestamp(&indexed_at),
            })
        })?;

        Ok(sources.filter_map(|s| s.ok()).collect())
    }

    async fn chunk_count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
