//! Per-session persistent vector index.
//!
//! Each session owns an index directory containing a single SQLite
//! database (WAL mode) holding its chunks and their embedding vectors.
//! The directory's existence is the authoritative signal that a session
//! exists for listing purposes, so `open_or_create` is also used with an
//! empty batch just to materialize it.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::StorageConfig;
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::{ServiceError, ServiceResult};
use crate::models::Chunk;

/// Database filename inside a session's index directory.
const INDEX_DB_FILE: &str = "chunks.sqlite";

/// A chunk row read back from the index, embedding included.
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub id: String,
    pub source_file: String,
    pub chunk_index: i64,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// Handle to one session's on-disk index.
#[derive(Debug)]
pub struct SessionIndex {
    pool: SqlitePool,
}

/// True when the session's index directory exists.
pub fn index_exists(storage: &StorageConfig, session: &str) -> bool {
    storage.index_dir(session).is_dir()
}

impl SessionIndex {
    /// Open the session's index, creating the directory, database, and
    /// schema when absent. Safe to call with no chunks to commit — this
    /// is how `create` materializes an empty session.
    pub async fn open_or_create(storage: &StorageConfig, session: &str) -> ServiceResult<Self> {
        let dir = storage.index_dir(session);
        std::fs::create_dir_all(&dir)?;
        let index = Self::connect(&dir).await?;
        index.migrate().await?;
        Ok(index)
    }

    /// Open a pre-existing index. Callers must ensure the session has one;
    /// a missing directory is `RetrievalUnavailable`, not auto-created.
    pub async fn open_existing(storage: &StorageConfig, session: &str) -> ServiceResult<Self> {
        let dir = storage.index_dir(session);
        if !dir.is_dir() {
            return Err(ServiceError::RetrievalUnavailable(format!(
                "no document index for session '{}'; upload documents first",
                session
            )));
        }
        let index = Self::connect(&dir).await?;
        index.migrate().await?;
        Ok(index)
    }

    async fn connect(dir: &Path) -> ServiceResult<Self> {
        let db_path: PathBuf = dir.join(INDEX_DB_FILE);
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
            .map_err(|e| ServiceError::Persistence(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    async fn migrate(&self) -> ServiceResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                source_file TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                hash TEXT NOT NULL,
                embedding BLOB NOT NULL,
                model TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source_file)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Upsert a batch of embedded chunks by id.
    ///
    /// Chunk ids are `{filename}_{index}`, so re-uploading a file replaces
    /// its chunks in place. When the new version of a file yields fewer
    /// chunks than before, the stale tail rows are deleted first so the
    /// index never mixes two generations of the same file.
    pub async fn upsert_chunks(
        &self,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
        model: &str,
    ) -> ServiceResult<()> {
        debug_assert_eq!(chunks.len(), embeddings.len());

        // Per-file count of incoming chunks, for tail cleanup.
        let mut per_file: BTreeMap<&str, i64> = BTreeMap::new();
        for chunk in chunks {
            let n = per_file.entry(chunk.source_file.as_str()).or_insert(0);
            *n = (*n).max(chunk.chunk_index + 1);
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for (file, count) in &per_file {
            sqlx::query("DELETE FROM chunks WHERE source_file = ? AND chunk_index >= ?")
                .bind(file)
                .bind(count)
                .execute(&mut *tx)
                .await?;
        }

        for (chunk, embedding) in chunks.iter().zip(embeddings.iter()) {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, source_file, chunk_index, text, hash, embedding, model, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    source_file = excluded.source_file,
                    chunk_index = excluded.chunk_index,
                    text = excluded.text,
                    hash = excluded.hash,
                    embedding = excluded.embedding,
                    model = excluded.model,
                    created_at = excluded.created_at
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.source_file)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(vec_to_blob(embedding))
            .bind(model)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Read every chunk with its embedding, ordered by file then index.
    /// The retriever scores candidates in memory; session corpora are
    /// small enough that a full scan is the simplest correct approach.
    pub async fn fetch_all(&self) -> ServiceResult<Vec<IndexedChunk>> {
        let rows = sqlx::query(
            "SELECT id, source_file, chunk_index, text, embedding FROM chunks \
             ORDER BY source_file, chunk_index",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                IndexedChunk {
                    id: row.get("id"),
                    source_file: row.get("source_file"),
                    chunk_index: row.get("chunk_index"),
                    text: row.get("text"),
                    embedding: blob_to_vec(&blob),
                }
            })
            .collect())
    }

    /// Number of chunks currently committed.
    pub async fn count(&self) -> ServiceResult<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
