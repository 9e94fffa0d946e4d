use thiserror::Error;

/// Failure taxonomy for the ingestion and query pipeline.
///
/// Configuration errors are raised before any work begins. Ingestion
/// errors abort the whole build and leave the index empty; query errors
/// never touch index state.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to load document: {0}")]
    Load(String),

    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("generation unavailable: {0}")]
    GenerationUnavailable(String),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("index has not been built")]
    IndexNotBuilt,

    #[error("index holds entries from a previous build; reset it first")]
    IndexNotReset,

    #[error("query embedder '{query}' does not match index embedder '{index}'")]
    EmbedderMismatch { index: String, query: String },

    #[error("no document has been indexed in this session")]
    NotIndexed,

    #[error("index storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, Error>;
