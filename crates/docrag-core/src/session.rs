//! The per-session pipeline.
//!
//! A [`Session`] owns one [`VectorIndex`] plus the collaborators needed to
//! fill and query it. State moves through:
//!
//! ```text
//! Empty ──ingest──▶ Ingesting ──ok──▶ Indexed ──ask──▶ Querying ──▶ Indexed
//!   ▲                   │                 │
//!   └──────── err ──────┘                 └──reset──▶ Empty
//! ```
//!
//! Every ingestion starts with an index reset, so nothing from a previous
//! document (or a crashed previous build) can surface in search results.
//! Query-time failures are reported per call and never touch the index.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chunk::{ChunkIdSequence, ChunkParams, Chunker};
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::generate::AnswerGenerator;
use crate::index::{BuildInfo, VectorIndex};
use crate::loader::DocumentLoader;
use crate::models::{Document, RetrievalResult};
use crate::prompt::{Prompt, PromptBuilder, PromptTask};
use crate::retrieve::{RetrievalParams, Retriever};

/// Pipeline state for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Empty,
    Ingesting,
    Indexed,
    Querying,
}

/// Summary of a successful ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub doc_id: String,
    pub source: String,
    pub pages: usize,
    pub chunks: usize,
    /// Id of the first chunk created by this ingestion.
    pub first_chunk_id: u64,
    pub build: BuildInfo,
}

/// A generated answer together with everything that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    /// The caller's question, or `None` for the fixed task.
    pub question: Option<String>,
    /// Results as returned by the retriever, before any context budget.
    pub retrieved: Vec<RetrievalResult>,
    pub prompt: Prompt,
    pub text: String,
}

/// Explicit pipeline context: one index, one embedder, one generator.
pub struct Session<I: VectorIndex> {
    index: I,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn AnswerGenerator>,
    chunker: Chunker,
    retrieval: RetrievalParams,
    prompts: PromptBuilder,
    ids: ChunkIdSequence,
    state: SessionState,
    current: Option<IngestReport>,
}

impl<I: VectorIndex> Session<I> {
    pub fn new(index: I, embedder: Arc<dyn Embedder>, generator: Arc<dyn AnswerGenerator>) -> Self {
        Self {
            index,
            embedder,
            generator,
            chunker: Chunker::new(ChunkParams::default()),
            retrieval: RetrievalParams::default(),
            prompts: PromptBuilder::new(),
            ids: ChunkIdSequence::new(),
            state: SessionState::Empty,
            current: None,
        }
    }

    pub fn with_chunk_params(mut self, params: ChunkParams) -> Self {
        self.chunker = Chunker::new(params);
        self
    }

    pub fn with_retrieval(mut self, params: RetrievalParams) -> Self {
        self.retrieval = params;
        self
    }

    pub fn with_prompt_builder(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Report for the currently indexed document, if any.
    pub fn current(&self) -> Option<&IngestReport> {
        self.current.as_ref()
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    /// Discard the index contents and return to `Empty`. Idempotent.
    ///
    /// Chunk ids are not rewound; ids handed out before the reset are never
    /// reissued by this session, and a durable index also carries its id
    /// floor across sessions (see [`VectorIndex::next_chunk_id`]).
    pub async fn reset(&mut self) -> Result<()> {
        self.index.reset().await?;
        self.current = None;
        self.state = SessionState::Empty;
        Ok(())
    }

    /// Reset, chunk and build the index for `doc`.
    ///
    /// On any failure the index is reset again and the session is left
    /// `Empty`; no partial build is ever searchable.
    pub async fn ingest(&mut self, doc: &Document) -> Result<IngestReport> {
        self.reset().await?;
        self.ingest_after_reset(doc).await
    }

    async fn ingest_after_reset(&mut self, doc: &Document) -> Result<IngestReport> {
        self.state = SessionState::Ingesting;

        match self.ingest_inner(doc).await {
            Ok(report) => {
                info!(
                    doc_id = %report.doc_id,
                    source = %report.source,
                    chunks = report.chunks,
                    model = %report.build.model,
                    "document indexed"
                );
                self.current = Some(report.clone());
                self.state = SessionState::Indexed;
                Ok(report)
            }
            Err(e) => {
                warn!(source = %doc.source(), error = %e, "ingestion failed");
                if let Err(reset_err) = self.index.reset().await {
                    warn!(error = %reset_err, "reset after failed ingestion also failed");
                }
                self.state = SessionState::Empty;
                Err(e)
            }
        }
    }

    async fn ingest_inner(&mut self, doc: &Document) -> Result<IngestReport> {
        self.ids.advance_to(self.index.next_chunk_id().await?);
        let first_chunk_id = self.ids.peek();
        let chunks = self.chunker.split(doc, &mut self.ids);
        let count = chunks.len();
        debug!(doc_id = %doc.doc_id(), chunks = count, "document split");

        let build = self.index.build(chunks, self.embedder.as_ref()).await?;

        Ok(IngestReport {
            doc_id: doc.doc_id().to_string(),
            source: doc.source().to_string(),
            pages: doc.pages().len(),
            chunks: count,
            first_chunk_id,
            build,
        })
    }

    /// Load through `loader` and ingest the result.
    ///
    /// The index is reset before loading, so a load failure also leaves the
    /// session `Empty`.
    pub async fn ingest_from(&mut self, loader: &dyn DocumentLoader) -> Result<IngestReport> {
        self.reset().await?;
        let doc = loader.load().map_err(|e| {
            warn!(source = %loader.source(), error = %e, "load failed");
            e
        })?;
        self.ingest_after_reset(&doc).await
    }

    /// Top-k chunks for `query`. Requires an indexed document.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievalResult>> {
        self.require_indexed()?;
        Retriever::new(&self.index, self.embedder.as_ref())
            .retrieve(query, &self.retrieval)
            .await
    }

    /// Retrieve, assemble a prompt around `question`, and generate an answer.
    pub async fn ask(&mut self, question: &str) -> Result<Answer> {
        self.query(Some(question)).await
    }

    /// Like [`ask`](Session::ask) but with the fixed task description.
    ///
    /// Retrieval uses the task text as the query.
    pub async fn ask_task(&mut self) -> Result<Answer> {
        self.query(None).await
    }

    async fn query(&mut self, question: Option<&str>) -> Result<Answer> {
        self.require_indexed()?;
        self.state = SessionState::Querying;
        let outcome = self.query_inner(question).await;
        self.state = SessionState::Indexed;
        outcome
    }

    async fn query_inner(&self, question: Option<&str>) -> Result<Answer> {
        let (query_text, task) = match question {
            Some(q) => (q.to_string(), PromptTask::Question(q)),
            None => (self.prompts.fixed_task().to_string(), PromptTask::Fixed),
        };

        let retrieved = Retriever::new(&self.index, self.embedder.as_ref())
            .retrieve(&query_text, &self.retrieval)
            .await?;

        let prompt = self.prompts.build(&retrieved, task);
        if prompt.context.dropped > 0 {
            debug!(
                dropped = prompt.context.dropped,
                "results dropped to fit context budget"
            );
        }

        let text = self.generator.generate(&prompt.text).await?;
        debug!(
            model = %self.generator.model_name(),
            context_chunks = prompt.context.results.len(),
            answer_chars = text.chars().count(),
            "answer generated"
        );

        Ok(Answer {
            question: question.map(str::to_string),
            retrieved,
            prompt,
            text,
        })
    }

    fn require_indexed(&self) -> Result<()> {
        match self.state {
            SessionState::Indexed | SessionState::Querying => Ok(()),
            SessionState::Empty | SessionState::Ingesting => Err(Error::NotIndexed),
        }
    }
}
