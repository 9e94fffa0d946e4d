//! In-memory [`VectorIndex`], ephemeral per session.
//!
//! Entries live in a `Vec` owned by the index. Search is brute-force cosine
//! similarity over every stored vector. A build assembles the complete
//! entry set off to the side and swaps it in only once every embedding
//! call has succeeded.

use async_trait::async_trait;
use tracing::debug;

use crate::embedding::{cosine_similarity, embed_all, Embedder};
use crate::error::{Error, Result};
use crate::models::{Chunk, IndexEntry, RetrievalResult};

use super::{check_query_dims, rank, BuildInfo, VectorIndex, DEFAULT_BATCH_SIZE};

enum State {
    Empty,
    Ready {
        info: BuildInfo,
        chunks: Vec<Chunk>,
        entries: Vec<IndexEntry>,
    },
}

/// Ephemeral index owned by exactly one session.
pub struct InMemoryIndex {
    state: State,
    batch_size: usize,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            state: State::Empty,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Number of installed entries (0 before any build).
    pub fn len(&self) -> usize {
        match &self.state {
            State::Empty => 0,
            State::Ready { entries, .. } => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn reset(&mut self) -> Result<()> {
        if matches!(self.state, State::Ready { .. }) {
            debug!(entries = self.len(), "discarding in-memory index");
        }
        self.state = State::Empty;
        Ok(())
    }

    async fn build(&mut self, chunks: Vec<Chunk>, embedder: &dyn Embedder) -> Result<BuildInfo> {
        if matches!(self.state, State::Ready { .. }) {
            return Err(Error::IndexNotReset);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_all(embedder, &texts, self.batch_size).await?;

        let entries: Vec<IndexEntry> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry {
                chunk_id: chunk.id,
                vector,
            })
            .collect();

        let info = BuildInfo {
            model: embedder.model_name().to_string(),
            dims: entries.first().map(|e| e.vector.len()).unwrap_or(0),
            entries: entries.len(),
        };

        self.state = State::Ready {
            info: info.clone(),
            chunks,
            entries,
        };
        Ok(info)
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievalResult>> {
        let (info, chunks, entries) = match &self.state {
            State::Empty => return Err(Error::IndexNotBuilt),
            State::Ready {
                info,
                chunks,
                entries,
            } => (info, chunks, entries),
        };
        check_query_dims(info, query)?;

        let scored: Vec<RetrievalResult> = chunks
            .iter()
            .zip(entries.iter())
            .map(|(chunk, entry)| RetrievalResult {
                chunk: chunk.clone(),
                score: cosine_similarity(query, &entry.vector),
            })
            .collect();

        Ok(rank(scored, k))
    }

    async fn build_info(&self) -> Result<Option<BuildInfo>> {
        Ok(match &self.state {
            State::Empty => None,
            State::Ready { info, .. } => Some(info.clone()),
        })
    }
}
