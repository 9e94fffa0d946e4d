//! Property-based tests for the chunker.
//!
//! Verifies, for arbitrary text and valid parameters:
//! - Coverage: every character of the input lies in at least one chunk
//! - Sizing: no chunk exceeds `chunk_size` characters
//! - Overlap: adjacent chunks share exactly `overlap` characters
//! - Reconstruction: dropping each chunk's overlap prefix rebuilds the text
//! - Monotonicity: a larger `chunk_size` never produces more chunks
//! - Determinism: the same input always yields the same chunks

use proptest::prelude::*;

use docrag_core::chunk::{split_spans, ChunkIdSequence, ChunkParams, Chunker};
use docrag_core::models::Document;

// ────────────────────────────────────────────────────────────────────
// Strategies
// ────────────────────────────────────────────────────────────────────

/// Prose-like text: words, sentence ends, line and paragraph breaks, and
/// the occasional multi-byte character.
fn arb_text() -> impl Strategy<Value = String> {
    prop::string::string_regex("([a-zé]{1,12}( |\\. |\\n|\\n\\n|! )){0,80}").unwrap()
}

/// Valid `(chunk_size, overlap)` with `overlap < chunk_size`.
fn arb_params() -> impl Strategy<Value = (usize, usize)> {
    (1usize..=120).prop_flat_map(|size| (Just(size), 0..size))
}

fn chars(s: &str) -> Vec<char> {
    s.chars().collect()
}

// ────────────────────────────────────────────────────────────────────
// Properties
// ────────────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn chunks_cover_text_in_order((size, overlap) in arb_params(), text in arb_text()) {
        let params = ChunkParams::new(size, overlap).unwrap();
        let spans = split_spans(&text, params);
        let n = chars(&text).len();

        if n == 0 {
            prop_assert!(spans.is_empty());
        } else {
            prop_assert_eq!(spans.first().unwrap().start, 0);
            prop_assert_eq!(spans.last().unwrap().end, n);
            for pair in spans.windows(2) {
                prop_assert!(pair[1].start < pair[0].end || overlap == 0);
                prop_assert!(pair[1].start <= pair[0].end);
                prop_assert!(pair[1].end > pair[0].end);
            }
        }
    }

    #[test]
    fn chunks_respect_size((size, overlap) in arb_params(), text in arb_text()) {
        let params = ChunkParams::new(size, overlap).unwrap();
        for span in split_spans(&text, params) {
            prop_assert!(span.len() <= size);
            prop_assert!(!span.is_empty());
        }
    }

    #[test]
    fn adjacent_chunks_share_exact_overlap((size, overlap) in arb_params(), text in arb_text()) {
        let params = ChunkParams::new(size, overlap).unwrap();
        let spans = split_spans(&text, params);
        for pair in spans.windows(2) {
            prop_assert_eq!(pair[0].end - pair[1].start, overlap);
        }
    }

    #[test]
    fn dropping_overlap_reconstructs_text((size, overlap) in arb_params(), text in arb_text()) {
        let params = ChunkParams::new(size, overlap).unwrap();
        let doc = Document::from_text("prop", text.clone());
        let chunks = Chunker::new(params).split(&doc, &mut ChunkIdSequence::new());

        let mut rebuilt = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            let skip = if i == 0 { 0 } else { overlap };
            rebuilt.extend(chunk.text.chars().skip(skip));
        }
        prop_assert_eq!(rebuilt, text);
    }

    #[test]
    fn larger_chunks_never_increase_count(
        (size, overlap) in arb_params(),
        grow in 1usize..=60,
        text in arb_text(),
    ) {
        let small = ChunkParams::new(size, overlap).unwrap();
        let large = ChunkParams::new(size + grow, overlap).unwrap();
        prop_assert!(split_spans(&text, large).len() <= split_spans(&text, small).len());
    }

    #[test]
    fn splitting_is_deterministic((size, overlap) in arb_params(), text in arb_text()) {
        let params = ChunkParams::new(size, overlap).unwrap();
        let doc = Document::from_text("prop", text);
        let a = Chunker::new(params).split(&doc, &mut ChunkIdSequence::new());
        let b = Chunker::new(params).split(&doc, &mut ChunkIdSequence::new());
        prop_assert_eq!(a, b);
    }
}
