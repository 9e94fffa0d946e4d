//! Boundary-respecting text chunker with exact overlap.
//!
//! Splits document text into [`Chunk`]s of at most `chunk_size` characters.
//! Consecutive chunks share exactly `overlap` characters: each chunk after
//! the first starts `overlap` characters before the previous chunk ended.
//!
//! # Algorithm
//!
//! 1. If the remaining text (from the current start) fits in `chunk_size`
//!    characters, emit it as the final chunk.
//! 2. Otherwise look for a break position in the window
//!    `(start + overlap, start + chunk_size]`. The lower bound guarantees
//!    every chunk contributes at least one new character.
//! 3. Try boundary kinds from coarsest to finest: paragraph (after a blank
//!    line), sentence (after `.`/`!`/`?` followed by whitespace, or after a
//!    line break), word (after whitespace), character. The first kind that
//!    has any position in the window wins, and within that kind the
//!    rightmost position is taken.
//! 4. Emit `[start, break)` and continue from `break - overlap`.
//!
//! Lengths and offsets are measured in Unicode scalar values, never bytes,
//! so multi-byte text is never split inside a character.
//!
//! # Example
//!
//! ```rust
//! use docrag_core::chunk::{split_spans, ChunkParams};
//!
//! let text = "a".repeat(5000);
//! let params = ChunkParams::new(2000, 200).unwrap();
//! let sizes: Vec<usize> = split_spans(&text, params).iter().map(|s| s.len()).collect();
//! assert_eq!(sizes, vec![2000, 2000, 1400]);
//! ```

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::models::{Chunk, Document};

/// Default maximum chunk length in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 2000;
/// Default number of characters shared by adjacent chunks.
pub const DEFAULT_OVERLAP: usize = 200;

/// Validated chunking configuration.
///
/// Construction fails when `overlap >= chunk_size` or `chunk_size == 0`,
/// so an invalid configuration is rejected before any chunk is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    chunk_size: usize,
    overlap: usize,
}

impl ChunkParams {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Config("chunk_size must be > 0".to_string()));
        }
        if overlap >= chunk_size {
            return Err(Error::Config(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

/// Natural break granularity, ordered coarsest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Boundary {
    Paragraph,
    Sentence,
    Word,
    Character,
}

/// A half-open `[start, end)` range of character offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Session-scoped source of chunk ids.
///
/// Ids increase monotonically and the sequence never rewinds, so ids from
/// a build that was discarded by a reset are never handed out again.
#[derive(Debug, Default)]
pub struct ChunkIdSequence {
    next: u64,
}

impl ChunkIdSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// The id the next chunk will receive.
    pub fn peek(&self) -> u64 {
        self.next
    }

    /// Skip ahead so the next id is at least `floor`. Never moves backwards.
    pub fn advance_to(&mut self, floor: u64) {
        self.next = self.next.max(floor);
    }
}

/// Splits [`Document`]s into [`Chunk`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct Chunker {
    params: ChunkParams,
}

impl Chunker {
    pub fn new(params: ChunkParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> ChunkParams {
        self.params
    }

    /// Chunk the full text of `doc`, drawing ids from `ids`.
    ///
    /// An empty document yields no chunks.
    pub fn split(&self, doc: &Document, ids: &mut ChunkIdSequence) -> Vec<Chunk> {
        let text = doc.text();
        let spans = split_spans(&text, self.params);
        if spans.is_empty() {
            return Vec::new();
        }

        let byte_at: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();

        spans
            .into_iter()
            .map(|span| {
                let body = &text[byte_at[span.start]..byte_at[span.end]];
                make_chunk(ids.next_id(), doc, span.start, body)
            })
            .collect()
    }
}

/// Compute chunk spans over `text` (character offsets).
///
/// # Guarantees
///
/// - Every span is at most `chunk_size` characters long.
/// - Adjacent spans overlap by exactly `overlap` characters.
/// - Text shorter than or equal to `chunk_size` yields one span.
/// - Empty text yields no spans.
pub fn split_spans(text: &str, params: ChunkParams) -> Vec<Span> {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    let mut spans = Vec::new();
    if n == 0 {
        return spans;
    }

    let mut start = 0usize;
    loop {
        if n - start <= params.chunk_size {
            spans.push(Span { start, end: n });
            break;
        }
        let lo = start + params.overlap + 1;
        let hi = start + params.chunk_size;
        let (end, _) = find_break(&chars, lo, hi);
        spans.push(Span { start, end });
        start = end - params.overlap;
    }

    spans
}

/// Find the break position in `[lo, hi]`, preferring the coarsest boundary
/// kind and, within it, the rightmost position. `hi` must be `< chars.len()`.
fn find_break(chars: &[char], lo: usize, hi: usize) -> (usize, Boundary) {
    for kind in [Boundary::Paragraph, Boundary::Sentence, Boundary::Word] {
        if let Some(pos) = (lo..=hi).rev().find(|&p| is_boundary(chars, p, kind)) {
            return (pos, kind);
        }
    }
    (hi, Boundary::Character)
}

/// Whether a chunk may end just before `chars[pos]` at the given granularity.
fn is_boundary(chars: &[char], pos: usize, kind: Boundary) -> bool {
    if pos == 0 || pos > chars.len() {
        return false;
    }
    let prev = chars[pos - 1];
    match kind {
        Boundary::Paragraph => pos >= 2 && prev == '\n' && chars[pos - 2] == '\n',
        Boundary::Sentence => {
            prev == '\n'
                || (prev.is_whitespace() && pos >= 2 && matches!(chars[pos - 2], '.' | '!' | '?'))
        }
        Boundary::Word => prev.is_whitespace(),
        Boundary::Character => true,
    }
}

fn make_chunk(id: u64, doc: &Document, source_offset: usize, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id,
        doc_id: doc.doc_id().to_string(),
        text: text.to_string(),
        source_offset,
        page: doc.page_at(source_offset),
        hash,
    }
}
