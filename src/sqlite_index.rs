//! Durable, SQLite-backed [`VectorIndex`].
//!
//! Layout for `index.path = ./db`:
//!
//! ```text
//! ./db.lock                 advisory lock file; also holds the next free
//!                           chunk id (sibling, survives reset)
//! ./db/.docrag-index        marker: this directory is ours to delete
//! ./db/index.sqlite         entries + manifest (plus -wal / -shm)
//! ```
//!
//! `reset()` and `build()` hold an exclusive lock on `db.lock`; `search()`
//! holds a shared one, so a reader never sees a half-deleted or half-built
//! directory. `reset()` removes the whole directory, which also clears
//! anything a crashed build left behind. A build writes every entry and
//! the manifest row in one transaction; without a manifest the index
//! counts as not built.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use docrag_core::embedding::{blob_to_vec, cosine_similarity, embed_all, vec_to_blob, Embedder};
use docrag_core::index::{check_query_dims, rank, BuildInfo, VectorIndex, DEFAULT_BATCH_SIZE};
use docrag_core::models::{Chunk, RetrievalResult};
use docrag_core::{Error, Result};
use fs2::FileExt;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};

use crate::db::{self, storage_err};

const DB_FILE: &str = "index.sqlite";
const MARKER_FILE: &str = ".docrag-index";
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);
const LOCK_POLL: Duration = Duration::from_millis(100);

/// Held advisory lock; released when dropped.
struct IndexLock {
    file: File,
}

impl IndexLock {
    /// Chunk id floor recorded in the lock file; 0 if never written.
    fn next_chunk_id(&self) -> Result<u64> {
        let mut file = &self.file;
        file.seek(SeekFrom::Start(0)).map_err(storage_err)?;
        let mut content = String::new();
        file.read_to_string(&mut content).map_err(storage_err)?;
        let content = content.trim();
        if content.is_empty() {
            return Ok(0);
        }
        content
            .parse()
            .map_err(|e| Error::Storage(format!("corrupt chunk id floor '{}': {}", content, e)))
    }

    /// Record `next` as the floor unless a higher one is already stored.
    /// Caller holds the exclusive lock.
    fn raise_next_chunk_id(&self, next: u64) -> Result<()> {
        if next <= self.next_chunk_id()? {
            return Ok(());
        }
        let mut file = &self.file;
        file.set_len(0).map_err(storage_err)?;
        file.seek(SeekFrom::Start(0)).map_err(storage_err)?;
        file.write_all(format!("{}\n", next).as_bytes()).map_err(storage_err)?;
        file.sync_all().map_err(storage_err)
    }
}

#[derive(Clone, Copy)]
enum LockKind {
    Shared,
    Exclusive,
}

pub struct SqliteIndex {
    dir: PathBuf,
    lock_path: PathBuf,
    batch_size: usize,
    lock_timeout: Duration,
}

impl SqliteIndex {
    /// Fails with [`Error::Config`] for paths that cannot safely be
    /// deleted and recreated (`.`, `..`, a filesystem root).
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let name = match dir.file_name() {
            Some(name) if !name.is_empty() => name.to_os_string(),
            _ => {
                return Err(Error::Config(format!(
                    "index.path '{}' must name a dedicated directory",
                    dir.display()
                )))
            }
        };
        let mut lock_name = name;
        lock_name.push(".lock");
        let lock_path = dir.with_file_name(lock_name);

        Ok(Self {
            dir,
            lock_path,
            batch_size: DEFAULT_BATCH_SIZE,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn db_path(&self) -> PathBuf {
        self.dir.join(DB_FILE)
    }

    async fn lock(&self, kind: LockKind) -> Result<IndexLock> {
        if let Some(parent) = self.lock_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(storage_err)?;
            }
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(storage_err)?;

        let started = Instant::now();
        loop {
            let attempt = match kind {
                LockKind::Shared => FileExt::try_lock_shared(&file),
                LockKind::Exclusive => FileExt::try_lock_exclusive(&file),
            };
            match attempt {
                Ok(()) => {
                    debug!(lock = %self.lock_path.display(), "index lock acquired");
                    return Ok(IndexLock { file });
                }
                Err(e) if is_contended(&e) => {
                    if started.elapsed() >= self.lock_timeout {
                        return Err(Error::Storage(format!(
                            "index at {} is locked by another process",
                            self.dir.display()
                        )));
                    }
                    tokio::time::sleep(LOCK_POLL).await;
                }
                Err(e) => return Err(storage_err(e)),
            }
        }
    }

    /// Remove and recreate the directory. Caller holds the exclusive lock.
    fn reset_locked(&self) -> Result<()> {
        if self.dir.exists() {
            if !self.dir.is_dir() {
                return Err(Error::Storage(format!(
                    "{} exists and is not a directory",
                    self.dir.display()
                )));
            }
            let owned = self.dir.join(MARKER_FILE).exists();
            let empty = std::fs::read_dir(&self.dir)
                .map_err(storage_err)?
                .next()
                .is_none();
            if !owned && !empty {
                return Err(Error::Storage(format!(
                    "refusing to delete {}: not a docrag index directory",
                    self.dir.display()
                )));
            }
            std::fs::remove_dir_all(&self.dir).map_err(storage_err)?;
        }
        std::fs::create_dir_all(&self.dir).map_err(storage_err)?;
        File::create(self.dir.join(MARKER_FILE)).map_err(storage_err)?;
        Ok(())
    }

    /// Open the database if it exists. `None` means nothing was ever built.
    async fn open_existing(&self) -> Result<Option<SqlitePool>> {
        if !self.db_path().exists() {
            return Ok(None);
        }
        Ok(Some(db::connect(&self.db_path(), false).await?))
    }

    async fn read_manifest(pool: &SqlitePool) -> Result<Option<BuildInfo>> {
        let has_table: Option<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'manifest'",
        )
        .fetch_optional(pool)
        .await
        .map_err(storage_err)?;
        if has_table.is_none() {
            return Ok(None);
        }

        let row = sqlx::query("SELECT model, dims, entries FROM manifest WHERE id = 1")
            .fetch_optional(pool)
            .await
            .map_err(storage_err)?;

        Ok(row.map(|row| BuildInfo {
            model: row.get("model"),
            dims: row.get::<i64, _>("dims") as usize,
            entries: row.get::<i64, _>("entries") as usize,
        }))
    }

    async fn write_build(
        &self,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
        info: &BuildInfo,
    ) -> Result<()> {
        let pool = db::connect(&self.db_path(), true).await?;
        let outcome: Result<()> = async {
            db::create_schema(&pool).await?;
            let mut tx = pool.begin().await.map_err(storage_err)?;

            for (chunk, vector) in chunks.iter().zip(vectors) {
                sqlx::query(
                    r#"
                    INSERT INTO entries (chunk_id, doc_id, text, source_offset, page, hash, embedding)
                    VALUES (?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(chunk.id as i64)
                .bind(&chunk.doc_id)
                .bind(&chunk.text)
                .bind(chunk.source_offset as i64)
                .bind(chunk.page as i64)
                .bind(&chunk.hash)
                .bind(vec_to_blob(vector))
                .execute(&mut *tx)
                .await
                .map_err(storage_err)?;
            }

            sqlx::query(
                r#"
                INSERT INTO manifest (id, build_id, model, dims, entries, built_at)
                VALUES (1, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(&info.model)
            .bind(info.dims as i64)
            .bind(info.entries as i64)
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;

            tx.commit().await.map_err(storage_err)
        }
        .await;
        pool.close().await;
        outcome
    }
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn reset(&mut self) -> Result<()> {
        let _lock = self.lock(LockKind::Exclusive).await?;
        self.reset_locked()?;
        info!(dir = %self.dir.display(), "durable index reset");
        Ok(())
    }

    async fn build(&mut self, chunks: Vec<Chunk>, embedder: &dyn Embedder) -> Result<BuildInfo> {
        let lock = self.lock(LockKind::Exclusive).await?;

        if let Some(pool) = self.open_existing().await? {
            let existing = Self::read_manifest(&pool).await;
            pool.close().await;
            if existing?.is_some() {
                return Err(Error::IndexNotReset);
            }
        }
        if !self.dir.join(MARKER_FILE).exists() {
            self.reset_locked()?;
        }

        // Ids are claimed before embedding, so even a failed build retires them.
        let floor = lock.next_chunk_id()?;
        if let Some(low) = chunks.iter().map(|c| c.id).min() {
            if low < floor {
                return Err(Error::MalformedInput(format!(
                    "chunk id {} was already issued by this index (next free id is {})",
                    low, floor
                )));
            }
        }
        if let Some(high) = chunks.iter().map(|c| c.id).max() {
            lock.raise_next_chunk_id(high + 1)?;
        }

        info!(chunks = chunks.len(), model = %embedder.model_name(), "building durable index");
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = match embed_all(embedder, &texts, self.batch_size).await {
            Ok(v) => v,
            Err(e) => {
                self.reset_locked()?;
                return Err(e);
            }
        };

        let info = BuildInfo {
            model: embedder.model_name().to_string(),
            dims: vectors.first().map(|v| v.len()).unwrap_or(0),
            entries: vectors.len(),
        };

        if let Err(e) = self.write_build(&chunks, &vectors, &info).await {
            warn!(error = %e, "durable build failed; resetting");
            self.reset_locked()?;
            return Err(e);
        }

        info!(entries = info.entries, dims = info.dims, "durable index built");
        Ok(info)
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievalResult>> {
        let _lock = self.lock(LockKind::Shared).await?;
        let pool = self.open_existing().await?.ok_or(Error::IndexNotBuilt)?;

        let outcome: Result<Vec<RetrievalResult>> = async {
            let info = Self::read_manifest(&pool)
                .await?
                .ok_or(Error::IndexNotBuilt)?;
            check_query_dims(&info, query)?;

            let rows = sqlx::query(
                "SELECT chunk_id, doc_id, text, source_offset, page, hash, embedding FROM entries",
            )
            .fetch_all(&pool)
            .await
            .map_err(storage_err)?;

            let scored: Vec<RetrievalResult> = rows
                .iter()
                .map(|row| {
                    let blob: Vec<u8> = row.get("embedding");
                    RetrievalResult {
                        chunk: Chunk {
                            id: row.get::<i64, _>("chunk_id") as u64,
                            doc_id: row.get("doc_id"),
                            text: row.get("text"),
                            source_offset: row.get::<i64, _>("source_offset") as usize,
                            page: row.get::<i64, _>("page") as usize,
                            hash: row.get("hash"),
                        },
                        score: cosine_similarity(query, &blob_to_vec(&blob)),
                    }
                })
                .collect();

            Ok(rank(scored, k))
        }
        .await;
        pool.close().await;
        outcome
    }

    async fn build_info(&self) -> Result<Option<BuildInfo>> {
        let _lock = self.lock(LockKind::Shared).await?;
        let Some(pool) = self.open_existing().await? else {
            return Ok(None);
        };
        let info = Self::read_manifest(&pool).await;
        pool.close().await;
        info
    }

    async fn next_chunk_id(&self) -> Result<u64> {
        let lock = self.lock(LockKind::Shared).await?;
        lock.next_chunk_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::DisabledGenerator;
    use docrag_core::models::Document;
    use docrag_core::session::Session;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct AxisEmbedder;

    #[async_trait]
    impl Embedder for AxisEmbedder {
        fn model_name(&self) -> &str {
            "axis"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if text.contains("FAIL") {
                return Err(Error::EmbeddingUnavailable("axis refused".into()));
            }
            if text.starts_with('x') {
                Ok(vec![1.0, 0.0])
            } else {
                Ok(vec![0.0, 1.0])
            }
        }
    }

    fn chunk(id: u64, text: &str) -> Chunk {
        Chunk {
            id,
            doc_id: "doc".to_string(),
            text: text.to_string(),
            source_offset: id as usize * 10,
            page: 1,
            hash: format!("h{}", id),
        }
    }

    #[test]
    fn test_rejects_unsafe_paths() {
        assert!(matches!(SqliteIndex::new("."), Err(Error::Config(_))));
        assert!(matches!(SqliteIndex::new("/"), Err(Error::Config(_))));
        let idx = SqliteIndex::new("/tmp/some/db").unwrap();
        assert_eq!(idx.lock_path, PathBuf::from("/tmp/some/db.lock"));
    }

    #[tokio::test]
    async fn test_build_and_search_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let mut index = SqliteIndex::new(tmp.path().join("db")).unwrap();
        index.reset().await.unwrap();

        let info = index
            .build(vec![chunk(0, "x one"), chunk(1, "y two"), chunk(2, "x three")], &AxisEmbedder)
            .await
            .unwrap();
        assert_eq!(info.entries, 3);
        assert_eq!(info.dims, 2);

        let results = index.search(&[1.0, 0.0], 2).await.unwrap();
        let ids: Vec<u64> = results.iter().map(|r| r.chunk.id).collect();
        assert_eq!(ids, vec![0, 2]);
        assert_eq!(results[1].chunk.source_offset, 20);
        assert_eq!(results[1].chunk.hash, "h2");
    }

    #[tokio::test]
    async fn test_search_before_build() {
        let tmp = TempDir::new().unwrap();
        let mut index = SqliteIndex::new(tmp.path().join("db")).unwrap();
        assert!(matches!(index.search(&[1.0, 0.0], 1).await, Err(Error::IndexNotBuilt)));
        index.reset().await.unwrap();
        assert!(matches!(index.search(&[1.0, 0.0], 1).await, Err(Error::IndexNotBuilt)));
        assert!(index.build_info().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reset_is_idempotent_and_clears_build() {
        let tmp = TempDir::new().unwrap();
        let mut index = SqliteIndex::new(tmp.path().join("db")).unwrap();
        index.reset().await.unwrap();
        index.build(vec![chunk(0, "x")], &AxisEmbedder).await.unwrap();

        index.reset().await.unwrap();
        index.reset().await.unwrap();
        assert!(index.build_info().await.unwrap().is_none());
        assert!(!index.dir().join(DB_FILE).exists());
    }

    #[tokio::test]
    async fn test_build_requires_reset() {
        let tmp = TempDir::new().unwrap();
        let mut index = SqliteIndex::new(tmp.path().join("db")).unwrap();
        index.reset().await.unwrap();
        index.build(vec![chunk(0, "x")], &AxisEmbedder).await.unwrap();
        let err = index.build(vec![chunk(1, "y")], &AxisEmbedder).await.unwrap_err();
        assert!(matches!(err, Error::IndexNotReset));
    }

    #[tokio::test]
    async fn test_failed_build_leaves_nothing_visible() {
        let tmp = TempDir::new().unwrap();
        let mut index = SqliteIndex::new(tmp.path().join("db")).unwrap().with_batch_size(1);
        index.reset().await.unwrap();
        let err = index
            .build(vec![chunk(0, "x ok"), chunk(1, "FAIL")], &AxisEmbedder)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmbeddingUnavailable(_)));
        assert!(index.build_info().await.unwrap().is_none());
        assert!(matches!(index.search(&[1.0, 0.0], 1).await, Err(Error::IndexNotBuilt)));
    }

    #[tokio::test]
    async fn test_reset_clears_crash_leftovers() {
        let tmp = TempDir::new().unwrap();
        let mut index = SqliteIndex::new(tmp.path().join("db")).unwrap();
        index.reset().await.unwrap();
        std::fs::write(index.dir().join("index.sqlite-wal"), b"torn write").unwrap();
        std::fs::write(index.dir().join("stray.bin"), b"junk").unwrap();

        index.reset().await.unwrap();
        let names: Vec<_> = std::fs::read_dir(index.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from(MARKER_FILE)]);
    }

    #[tokio::test]
    async fn test_refuses_to_delete_foreign_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("precious");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join("thesis.tex"), b"do not delete").unwrap();

        let mut index = SqliteIndex::new(&dir).unwrap();
        assert!(matches!(index.reset().await, Err(Error::Storage(_))));
        assert!(dir.join("thesis.tex").exists());
    }

    #[tokio::test]
    async fn test_persists_across_instances() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("db");
        {
            let mut index = SqliteIndex::new(&path).unwrap();
            index.reset().await.unwrap();
            index.build(vec![chunk(7, "y seven")], &AxisEmbedder).await.unwrap();
        }
        let reopened = SqliteIndex::new(&path).unwrap();
        let info = reopened.build_info().await.unwrap().unwrap();
        assert_eq!(info.model, "axis");
        let results = reopened.search(&[0.0, 1.0], 5).await.unwrap();
        assert_eq!(results[0].chunk.id, 7);
    }

    #[tokio::test]
    async fn test_chunk_id_floor_survives_reset() {
        let tmp = TempDir::new().unwrap();
        let mut index = SqliteIndex::new(tmp.path().join("db")).unwrap();
        assert_eq!(index.next_chunk_id().await.unwrap(), 0);

        index.reset().await.unwrap();
        index
            .build(vec![chunk(0, "x"), chunk(1, "y")], &AxisEmbedder)
            .await
            .unwrap();
        assert_eq!(index.next_chunk_id().await.unwrap(), 2);

        index.reset().await.unwrap();
        assert_eq!(index.next_chunk_id().await.unwrap(), 2);
        let err = index.build(vec![chunk(1, "y")], &AxisEmbedder).await.unwrap_err();
        assert!(matches!(err, Error::MalformedInput(_)));
        assert!(index.build_info().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_build_still_retires_ids() {
        let tmp = TempDir::new().unwrap();
        let mut index = SqliteIndex::new(tmp.path().join("db")).unwrap();
        index.reset().await.unwrap();
        index
            .build(vec![chunk(4, "x"), chunk(5, "FAIL")], &AxisEmbedder)
            .await
            .unwrap_err();
        assert_eq!(index.next_chunk_id().await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_new_session_does_not_reuse_ids() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("db");
        let doc = Document::from_text("notes.txt", "x alpha\n\ny beta");

        let first = {
            let mut session = Session::new(
                SqliteIndex::new(&path).unwrap(),
                Arc::new(AxisEmbedder),
                Arc::new(DisabledGenerator),
            );
            session.ingest(&doc).await.unwrap()
        };

        let mut second = Session::new(
            SqliteIndex::new(&path).unwrap(),
            Arc::new(AxisEmbedder),
            Arc::new(DisabledGenerator),
        );
        second.reset().await.unwrap();
        let report = second.ingest(&doc).await.unwrap();

        assert!(first.chunks > 0);
        assert_eq!(report.first_chunk_id, first.first_chunk_id + first.chunks as u64);
        let results = second.retrieve("x alpha").await.unwrap();
        assert!(results.iter().all(|r| r.chunk.id >= report.first_chunk_id));
    }

    #[tokio::test]
    async fn test_writer_lock_excludes_second_writer() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("db");
        let first = SqliteIndex::new(&path).unwrap();
        let mut second = SqliteIndex::new(&path)
            .unwrap()
            .with_lock_timeout(Duration::from_millis(200));

        let _held = first.lock(LockKind::Exclusive).await.unwrap();
        let err = second.reset().await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }
}
