//! CLI command implementations.
//!
//! Each command is one session: it builds the configured collaborators,
//! ingests the given file (which resets the index first), and prints its
//! result on stdout. Diagnostics go through `tracing` to stderr.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use docrag_core::chunk::{ChunkIdSequence, Chunker};
use docrag_core::generate::AnswerGenerator;
use docrag_core::index::memory::InMemoryIndex;
use docrag_core::index::VectorIndex;
use docrag_core::loader::DocumentLoader;
use docrag_core::models::RetrievalResult;
use docrag_core::prompt::PromptBuilder;
use docrag_core::session::Session;
use tracing::info;

use crate::config::{Config, IndexMode};
use crate::embedding::create_embedder;
use crate::generate::{create_generator, DisabledGenerator};
use crate::loader::FileLoader;
use crate::sqlite_index::SqliteIndex;

/// Characters of chunk text shown per retrieved result.
pub const PREVIEW_CHARS: usize = 350;

fn create_index(config: &Config) -> Result<Box<dyn VectorIndex>> {
    let index: Box<dyn VectorIndex> = match config.index.mode {
        IndexMode::Memory => {
            Box::new(InMemoryIndex::new().with_batch_size(config.embedding.batch_size))
        }
        IndexMode::Durable => Box::new(
            SqliteIndex::new(&config.index.path)?.with_batch_size(config.embedding.batch_size),
        ),
    };
    Ok(index)
}

/// Build a session from configuration. `with_generator == false` skips
/// generator construction for retrieval-only commands.
pub async fn open_session(
    config: &Config,
    with_generator: bool,
) -> Result<Session<Box<dyn VectorIndex>>> {
    let embedder = create_embedder(&config.embedding)
        .await
        .with_context(|| format!("Failed to create '{}' embedder", config.embedding.provider))?;
    let generator: Arc<dyn AnswerGenerator> = if with_generator {
        create_generator(&config.generation).with_context(|| {
            format!("Failed to create '{}' generator", config.generation.provider)
        })?
    } else {
        Arc::new(DisabledGenerator)
    };

    let prompts = PromptBuilder::new().with_max_context_chars(config.retrieval.max_context_chars);

    Ok(Session::new(create_index(config)?, embedder, generator)
        .with_chunk_params(config.chunk_params()?)
        .with_retrieval(config.retrieval_params()?)
        .with_prompt_builder(prompts))
}

/// First `max` characters of `text`, with an ellipsis when cut.
pub fn preview(text: &str, max: usize) -> String {
    let mut out: String = text.chars().take(max).collect();
    if text.chars().count() > max {
        out.push_str("...");
    }
    out
}

fn print_results(results: &[RetrievalResult]) {
    for (i, r) in results.iter().enumerate() {
        println!(
            "--- [{}] score {:.4} | chunk #{} | page {} | offset {}",
            i + 1,
            r.score,
            r.chunk.id,
            r.chunk.page,
            r.chunk.source_offset
        );
        println!("{}", preview(&r.chunk.text, PREVIEW_CHARS));
    }
}

/// `docrag chunk <FILE>`: load and split only.
pub fn run_chunk(config: &Config, file: &Path, json: bool) -> Result<()> {
    let doc = FileLoader::new(file).load()?;
    let chunker = Chunker::new(config.chunk_params()?);
    let chunks = chunker.split(&doc, &mut ChunkIdSequence::new());

    if json {
        println!("{}", serde_json::to_string_pretty(&chunks)?);
        return Ok(());
    }

    println!(
        "{}  doc_id {}  pages {}  chunks {}",
        doc.source(),
        doc.doc_id(),
        doc.pages().len(),
        chunks.len()
    );
    for c in &chunks {
        println!(
            "#{:<4} page {:<3} offset {:<7} {:>5} chars  {}",
            c.id,
            c.page,
            c.source_offset,
            c.char_len(),
            &c.hash[..12.min(c.hash.len())]
        );
    }
    Ok(())
}

/// `docrag retrieve <FILE> <QUERY>`: ingest and print ranked chunks.
pub async fn run_retrieve(config: &Config, file: &Path, query: &str, json: bool) -> Result<()> {
    let mut session = open_session(config, false).await?;
    let report = session
        .ingest_from(&FileLoader::new(file))
        .await
        .with_context(|| format!("Failed to ingest {}", file.display()))?;
    info!(chunks = report.chunks, "ingested");

    let results = session.retrieve(query).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else if results.is_empty() {
        println!("No results.");
    } else {
        print_results(&results);
    }
    Ok(())
}

/// `docrag ask <FILE> [QUESTION]`: ingest, retrieve, prompt, generate.
pub async fn run_ask(
    config: &Config,
    file: &Path,
    question: Option<&str>,
    show_context: bool,
    show_prompt: bool,
) -> Result<()> {
    let mut session = open_session(config, true).await?;
    session
        .ingest_from(&FileLoader::new(file))
        .await
        .with_context(|| format!("Failed to ingest {}", file.display()))?;

    let answer = match question {
        Some(q) => session.ask(q).await?,
        None => session.ask_task().await?,
    };

    if show_context {
        println!("=== Retrieved context ===");
        print_results(&answer.prompt.context.results);
        println!();
    }
    if show_prompt {
        println!("=== Prompt ===");
        println!("{}", answer.prompt.text);
    }
    if show_context || show_prompt {
        println!("=== Answer ===");
    }
    println!("{}", answer.text.trim_end());
    Ok(())
}

/// `docrag reset`: wipe the durable index directory.
pub async fn run_reset(config: &Config) -> Result<()> {
    let mut index = SqliteIndex::new(&config.index.path)?;
    index
        .reset()
        .await
        .with_context(|| format!("Failed to reset {}", config.index.path.display()))?;
    println!("Reset index at {}", config.index.path.display());
    Ok(())
}
