//! Prompt assembly.
//!
//! Builds a single prompt from ranked [`RetrievalResult`]s:
//!
//! ```text
//! <instruction block>
//!
//! TEXT START
//! <chunk 1>
//! -----
//! <chunk 2>
//! TEXT END
//!
//! <task: fixed description, or "Answer the following question:" + question>
//! ```
//!
//! Chunk texts are copied verbatim in the order given. When a context
//! budget is configured, trailing chunks are dropped whole; a chunk is
//! never cut.

use serde::Serialize;
use tracing::warn;

use crate::models::RetrievalResult;

/// Instruction block forbidding content that is not in the supplied text.
pub const INSTRUCTIONS: &str = "You may ONLY use the text provided below.\n\
Do not invent or guess anything.\n\
If the text does not contain what is asked for, say that nothing relevant is present in the document.";

pub const CONTEXT_START: &str = "TEXT START";
pub const CONTEXT_END: &str = "TEXT END";

/// Visible separator placed between chunk texts.
pub const DEFAULT_DELIMITER: &str = "\n-----\n";

/// Task used when the caller supplies no question.
pub const FIXED_TASK: &str = "Your task:\n\
1. List all section titles.\n\
2. From the 3rd section, extract the first 2 lines exactly as written.\n\
3. Do NOT paraphrase.\n\
4. If the text is incomplete, return only what is present.";

/// What the generator is asked to do with the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTask<'a> {
    /// The configured fixed task description.
    Fixed,
    /// A caller-supplied question, included verbatim.
    Question(&'a str),
}

/// The retrieved chunks that made it into a prompt, and their joined text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptContext {
    pub results: Vec<RetrievalResult>,
    /// Chunk texts joined by the delimiter; empty when there are no results.
    pub text: String,
    /// Number of results dropped to stay within the context budget.
    pub dropped: usize,
}

impl PromptContext {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// A fully assembled prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prompt {
    pub text: String,
    pub context: PromptContext,
}

/// Assembles bounded, directive prompts.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    delimiter: String,
    fixed_task: String,
    max_context_chars: Option<usize>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER.to_string(),
            fixed_task: FIXED_TASK.to_string(),
            max_context_chars: None,
        }
    }

    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    pub fn with_fixed_task(mut self, task: impl Into<String>) -> Self {
        self.fixed_task = task.into();
        self
    }

    pub fn fixed_task(&self) -> &str {
        &self.fixed_task
    }

    /// Cap the joined context length (characters, delimiters included).
    pub fn with_max_context_chars(mut self, max: Option<usize>) -> Self {
        self.max_context_chars = max;
        self
    }

    /// Join result texts in the given order, dropping trailing results that
    /// would exceed the context budget.
    pub fn context(&self, results: &[RetrievalResult]) -> PromptContext {
        let delimiter_len = self.delimiter.chars().count();
        let mut kept = Vec::with_capacity(results.len());
        let mut used = 0usize;

        for r in results {
            let extra = r.chunk.char_len() + if kept.is_empty() { 0 } else { delimiter_len };
            if let Some(max) = self.max_context_chars {
                if used + extra > max {
                    break;
                }
            }
            used += extra;
            kept.push(r.clone());
        }

        if kept.is_empty() && !results.is_empty() {
            warn!(
                results = results.len(),
                max_context_chars = ?self.max_context_chars,
                "context budget rejected every retrieved chunk"
            );
        }

        let text = kept
            .iter()
            .map(|r| r.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join(&self.delimiter);

        PromptContext {
            dropped: results.len() - kept.len(),
            results: kept,
            text,
        }
    }

    pub fn build(&self, results: &[RetrievalResult], task: PromptTask<'_>) -> Prompt {
        let context = self.context(results);
        let task_text = match task {
            PromptTask::Fixed => self.fixed_task.clone(),
            PromptTask::Question(q) => format!("Answer the following question:\n{}", q),
        };

        let text = format!(
            "{}\n\n{}\n{}\n{}\n\n{}\n",
            INSTRUCTIONS, CONTEXT_START, context.text, CONTEXT_END, task_text
        );

        Prompt { text, context }
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;

    fn result(id: u64, text: &str, score: f32) -> RetrievalResult {
        RetrievalResult {
            chunk: Chunk {
                id,
                doc_id: "d".to_string(),
                text: text.to_string(),
                source_offset: 0,
                page: 1,
                hash: String::new(),
            },
            score,
        }
    }

    #[test]
    fn test_question_prompt_layout() {
        let results = vec![result(2, "Second best", 0.9), result(0, "Third", 0.4)];
        let prompt = PromptBuilder::new().build(&results, PromptTask::Question("What is it?"));
        let expected = format!(
            "{}\n\nTEXT START\nSecond best\n-----\nThird\nTEXT END\n\nAnswer the following question:\nWhat is it?\n",
            INSTRUCTIONS
        );
        assert_eq!(prompt.text, expected);
        assert_eq!(prompt.context.results.len(), 2);
    }

    #[test]
    fn test_fixed_task() {
        let prompt = PromptBuilder::new()
            .with_fixed_task("Summarise.")
            .build(&[result(0, "Body", 1.0)], PromptTask::Fixed);
        assert!(prompt.text.ends_with("TEXT END\n\nSummarise.\n"));
    }

    #[test]
    fn test_context_preserves_input_order_verbatim() {
        let results = vec![
            result(9, "  leading spaces kept", 0.8),
            result(1, "line one\nline two", 0.7),
        ];
        let ctx = PromptBuilder::new().with_delimiter(" | ").context(&results);
        assert_eq!(ctx.text, "  leading spaces kept | line one\nline two");
    }

    #[test]
    fn test_empty_results_empty_context() {
        let prompt = PromptBuilder::new().build(&[], PromptTask::Question("anything?"));
        assert!(prompt.context.is_empty());
        assert_eq!(prompt.context.text, "");
        assert!(prompt.text.contains("TEXT START\n\nTEXT END"));
        assert!(prompt.text.contains("nothing relevant is present"));
    }

    #[test]
    fn test_budget_drops_whole_chunks() {
        let results = vec![
            result(0, "aaaaaaaaaa", 0.9),
            result(1, "bbbbbbbbbb", 0.8),
            result(2, "cccccccccc", 0.7),
        ];
        let ctx = PromptBuilder::new()
            .with_delimiter("|")
            .with_max_context_chars(Some(25))
            .context(&results);
        assert_eq!(ctx.text, "aaaaaaaaaa|bbbbbbbbbb");
        assert_eq!(ctx.dropped, 1);
    }

    #[test]
    fn test_budget_smaller_than_top_chunk_drops_all() {
        let results = vec![result(0, "aaaaaaaaaa", 0.9), result(1, "bb", 0.8)];
        let ctx = PromptBuilder::new()
            .with_max_context_chars(Some(5))
            .context(&results);
        assert!(ctx.is_empty());
        assert_eq!(ctx.dropped, 2);
    }

    #[test]
    fn test_question_included_verbatim() {
        let q = "  Exact   spacing?\n";
        let prompt = PromptBuilder::new().build(&[], PromptTask::Question(q));
        assert!(prompt.text.contains(q));
    }
}
