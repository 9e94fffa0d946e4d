//! Top-k retrieval over a [`VectorIndex`].
//!
//! The retriever embeds the query with the same [`Embedder`] that built the
//! index and delegates ranking to [`VectorIndex::search`]. It never mutates
//! the index, so identical queries against an unchanged index return
//! identical ranked results.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::index::VectorIndex;
use crate::models::RetrievalResult;

/// Default number of chunks returned per query.
pub const DEFAULT_K: usize = 5;

/// Retrieval strategy. Only single-pass cosine similarity is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    #[default]
    Similarity,
}

impl FromStr for SearchType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "similarity" => Ok(SearchType::Similarity),
            other => Err(Error::Config(format!(
                "unknown search_type '{}'; expected 'similarity'",
                other
            ))),
        }
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchType::Similarity => write!(f, "similarity"),
        }
    }
}

/// Validated retrieval tuning parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalParams {
    k: usize,
    search_type: SearchType,
}

impl RetrievalParams {
    /// Fails with [`Error::Config`] when `k == 0`.
    pub fn new(k: usize, search_type: SearchType) -> Result<Self> {
        if k == 0 {
            return Err(Error::Config("k must be > 0".to_string()));
        }
        Ok(Self { k, search_type })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn search_type(&self) -> SearchType {
        self.search_type
    }
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            k: DEFAULT_K,
            search_type: SearchType::Similarity,
        }
    }
}

/// Read-only view pairing an index with the embedder that built it.
pub struct Retriever<'a> {
    index: &'a dyn VectorIndex,
    embedder: &'a dyn Embedder,
}

impl<'a> Retriever<'a> {
    pub fn new(index: &'a dyn VectorIndex, embedder: &'a dyn Embedder) -> Self {
        Self { index, embedder }
    }

    /// Return at most `k` chunks ranked by descending similarity to `query`.
    ///
    /// A blank query or an index with zero entries yields an empty result,
    /// not an error. Fails with [`Error::IndexNotBuilt`] before any build and
    /// with [`Error::EmbedderMismatch`] if the query embedder differs from
    /// the one that built the index.
    pub async fn retrieve(
        &self,
        query: &str,
        params: &RetrievalParams,
    ) -> Result<Vec<RetrievalResult>> {
        let info = self.index.build_info().await?.ok_or(Error::IndexNotBuilt)?;

        if info.model != self.embedder.model_name() {
            return Err(Error::EmbedderMismatch {
                index: info.model,
                query: self.embedder.model_name().to_string(),
            });
        }

        if query.trim().is_empty() || info.entries == 0 {
            debug!(entries = info.entries, "nothing to retrieve");
            return Ok(Vec::new());
        }

        let query_vec = self.embedder.embed(query).await?;
        let results = match params.search_type() {
            SearchType::Similarity => self.index.search(&query_vec, params.k()).await?,
        };

        debug!(
            k = params.k(),
            returned = results.len(),
            top_score = results.first().map(|r| r.score),
            "retrieved chunks"
        );
        Ok(results)
    }
}
