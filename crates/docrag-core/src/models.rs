//! Core data models that flow through the ingestion and retrieval pipeline.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Separator inserted between pages when a [`Document`] is flattened to text.
///
/// A blank line is also a paragraph boundary, so the chunker prefers to
/// break between pages when a page break falls inside the size window.
pub const PAGE_SEPARATOR: &str = "\n\n";

/// A loaded document: ordered page texts plus a source identifier.
///
/// Immutable once constructed. `doc_id` is derived from the page contents
/// so the same bytes always map to the same id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    doc_id: String,
    source: String,
    pages: Vec<String>,
}

impl Document {
    pub fn new(source: impl Into<String>, pages: Vec<String>) -> Self {
        let mut hasher = Sha256::new();
        for page in &pages {
            hasher.update(page.as_bytes());
            hasher.update([0u8]);
        }
        let digest = format!("{:x}", hasher.finalize());
        Self {
            doc_id: digest[..16].to_string(),
            source: source.into(),
            pages,
        }
    }

    /// Convenience constructor for single-page (plain text) documents.
    pub fn from_text(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(source, vec![text.into()])
    }

    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn pages(&self) -> &[String] {
        &self.pages
    }

    /// The full document text: pages joined by [`PAGE_SEPARATOR`].
    pub fn text(&self) -> String {
        self.pages.join(PAGE_SEPARATOR)
    }

    /// 1-based page number containing the character at `char_offset` of
    /// [`text`](Document::text). Offsets that land on a separator belong to
    /// the preceding page.
    pub fn page_at(&self, char_offset: usize) -> usize {
        let sep = PAGE_SEPARATOR.chars().count();
        let mut page_end = 0usize;
        for (i, page) in self.pages.iter().enumerate() {
            page_end += page.chars().count();
            if char_offset < page_end + sep || i + 1 == self.pages.len() {
                return i + 1;
            }
            page_end += sep;
        }
        1
    }
}

/// A bounded, possibly overlapping span of a document's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Monotonic id assigned at creation; never reused within a session.
    pub id: u64,
    pub doc_id: String,
    pub text: String,
    /// Character offset of the chunk's first character in the document text.
    pub source_offset: usize,
    /// 1-based page the chunk starts on.
    pub page: usize,
    /// SHA-256 of `text`.
    pub hash: String,
}

impl Chunk {
    /// Length of the chunk text in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// A chunk id paired with its embedding vector.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub chunk_id: u64,
    pub vector: Vec<f32>,
}

/// A retrieved chunk with its cosine similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub chunk: Chunk,
    pub score: f32,
}
