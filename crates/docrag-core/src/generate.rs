//! Answer generator capability.

use async_trait::async_trait;

use crate::error::Result;

/// Produces free text from a prompt.
///
/// Called exactly once per query with no retry in the pipeline. Failures
/// are reported as [`Error::GenerationUnavailable`](crate::Error::GenerationUnavailable)
/// (transient) or [`Error::MalformedInput`](crate::Error::MalformedInput)
/// (the backend rejected the request); no answer is ever fabricated.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Returns the model identifier (e.g. `"llama3.1"`).
    fn model_name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String>;
}
