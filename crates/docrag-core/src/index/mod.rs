//! Vector index lifecycle.
//!
//! The [`VectorIndex`] trait owns embedding storage and its lifecycle:
//! `reset → build → search*`. Implementations must guarantee:
//!
//! - `reset()` discards every prior entry (and any durable artifacts) and
//!   is idempotent.
//! - `build()` only runs on a reset index, computes one vector per chunk,
//!   and installs all entries at once. If any embedding call fails, the
//!   index stays exactly as it was after `reset()`.
//! - `search()` fails with [`Error::IndexNotBuilt`] until a build has
//!   completed, and ranks by cosine similarity with ties broken by
//!   ascending chunk id.
//!
//! Mutating operations take `&mut self`, so a single index instance can
//! never run two builds at once or be searched mid-build.

pub mod memory;

use async_trait::async_trait;
use serde::Serialize;

use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::models::{Chunk, RetrievalResult};

/// Default number of texts sent to the embedder per call during a build.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Metadata describing the most recent completed build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildInfo {
    /// Embedder model that produced the stored vectors.
    pub model: String,
    /// Vector dimensionality (0 for an empty build).
    pub dims: usize,
    /// Number of entries; always equals the chunk count of the build.
    pub entries: usize,
}

/// Abstract embedding store with an explicit lifecycle.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`reset`](VectorIndex::reset) | Discard all entries and artifacts |
/// | [`build`](VectorIndex::build) | Embed chunks and install entries atomically |
/// | [`search`](VectorIndex::search) | Top-k cosine similarity lookup |
/// | [`build_info`](VectorIndex::build_info) | Metadata of the committed build, if any |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Unconditionally discard all entries. Safe to call repeatedly.
    async fn reset(&mut self) -> Result<()>;

    /// Embed `chunks` with `embedder` and install them as one unit.
    ///
    /// Fails with [`Error::IndexNotReset`] if the index still holds a
    /// previous build.
    async fn build(&mut self, chunks: Vec<Chunk>, embedder: &dyn Embedder) -> Result<BuildInfo>;

    /// Return up to `k` entries most similar to `query`, best first.
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievalResult>>;

    /// Metadata of the committed build, or `None` before any build.
    async fn build_info(&self) -> Result<Option<BuildInfo>>;

    /// Lowest chunk id a new build may use.
    ///
    /// Stores that outlive the process remember the ids of every build they
    /// ever accepted, including discarded ones, and report the next free id
    /// here so a fresh session never reissues them. Ephemeral stores leave
    /// id allocation to the session.
    async fn next_chunk_id(&self) -> Result<u64> {
        Ok(0)
    }
}

/// Lets callers pick the index implementation at runtime.
#[async_trait]
impl VectorIndex for Box<dyn VectorIndex> {
    async fn reset(&mut self) -> Result<()> {
        (**self).reset().await
    }

    async fn build(&mut self, chunks: Vec<Chunk>, embedder: &dyn Embedder) -> Result<BuildInfo> {
        (**self).build(chunks, embedder).await
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievalResult>> {
        (**self).search(query, k).await
    }

    async fn build_info(&self) -> Result<Option<BuildInfo>> {
        (**self).build_info().await
    }

    async fn next_chunk_id(&self) -> Result<u64> {
        (**self).next_chunk_id().await
    }
}

/// Order results by descending score, breaking ties by ascending chunk id,
/// and keep the first `k`.
pub fn rank(mut results: Vec<RetrievalResult>, k: usize) -> Vec<RetrievalResult> {
    results.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
    results.truncate(k);
    results
}

/// Reject a query vector whose length differs from the indexed vectors.
pub fn check_query_dims(info: &BuildInfo, query: &[f32]) -> Result<()> {
    if info.entries > 0 && query.len() != info.dims {
        return Err(Error::MalformedInput(format!(
            "query vector has {} dimensions, index has {}",
            query.len(),
            info.dims
        )));
    }
    Ok(())
}
