//! # docrag CLI
//!
//! Question answering over a single document. Every command loads the
//! document fresh: the index is reset, the file is chunked and embedded,
//! and only then is the query run.
//!
//! ## Usage
//!
//! ```bash
//! docrag --config ./config/docrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docrag chunk <file>` | Show how a document is split into chunks |
//! | `docrag retrieve <file> "<query>"` | Print the top-k chunks for a query |
//! | `docrag ask <file> ["<question>"]` | Answer a question from the document |
//! | `docrag reset` | Wipe the durable index directory |
//!
//! ## Examples
//!
//! ```bash
//! # Inspect chunk boundaries with smaller chunks
//! docrag chunk report.pdf --chunk-size 800 --overlap 80
//!
//! # Retrieval only, fully offline
//! docrag retrieve notes.md "release schedule" --embedder hash
//!
//! # Ask a question and show what the model saw
//! docrag ask contract.docx "When does the lease end?" --show-context
//!
//! # Run the fixed section-listing task
//! docrag ask handbook.pdf
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use docrag::config::{self, Overrides, DEFAULT_CONFIG_PATH};
use docrag::logging::{self, LogFormat};
use docrag::commands;

/// docrag: answer questions about a document using only its own text.
///
/// Settings are read from a TOML file (see `config/docrag.example.toml`);
/// the chunking, retrieval, and embedder flags override it per run.
#[derive(Parser)]
#[command(
    name = "docrag",
    about = "Answer questions about a document using retrieval-augmented generation",
    version,
    long_about = "docrag splits a PDF, DOCX, or text document into overlapping chunks, \
    embeds them, retrieves the chunks most similar to a question, and asks a language \
    model to answer strictly from that retrieved text."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/docrag.toml`; when that default is absent the
    /// built-in defaults are used. An explicitly named file must exist.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format on stderr.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Override `[chunking].chunk_size`.
    #[arg(long, global = true)]
    chunk_size: Option<usize>,

    /// Override `[chunking].overlap`.
    #[arg(long, global = true)]
    overlap: Option<usize>,

    /// Override `[retrieval].k`.
    #[arg(short, long, global = true)]
    k: Option<usize>,

    /// Override `[embedding].provider` (`ollama`, `openai`, `hash`, `local`).
    #[arg(long, global = true)]
    embedder: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Split a document into chunks and print them.
    ///
    /// Does not embed or index anything; useful for tuning
    /// `--chunk-size` and `--overlap`.
    Chunk {
        /// Document to split (PDF, DOCX, TXT, or Markdown).
        file: PathBuf,

        /// Print chunks as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Ingest a document and print the chunks most similar to a query.
    Retrieve {
        /// Document to ingest.
        file: PathBuf,

        /// Query text.
        query: String,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Ingest a document and answer a question from its text.
    ///
    /// Without a question, runs the fixed task that lists the document's
    /// section titles.
    Ask {
        /// Document to ingest.
        file: PathBuf,

        /// Question to answer. Omit to run the fixed task.
        question: Option<String>,

        /// Print the retrieved chunks before the answer.
        #[arg(long)]
        show_context: bool,

        /// Print the full prompt sent to the generator.
        #[arg(long)]
        show_prompt: bool,
    },

    /// Delete the durable index at `[index].path`.
    Reset,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (config_path, explicit) = match &cli.config {
        Some(path) => (path.clone(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
    };
    let overrides = Overrides {
        chunk_size: cli.chunk_size,
        overlap: cli.overlap,
        k: cli.k,
        embedder: cli.embedder.clone(),
    };
    let cfg = config::load_config(&config_path, explicit)?.apply(&overrides)?;

    logging::init(&cfg.logging.level, cli.verbose, cli.log_format)?;
    tracing::debug!(config = %config_path.display(), explicit, "configuration loaded");

    match cli.command {
        Commands::Chunk { file, json } => {
            commands::run_chunk(&cfg, &file, json)?;
        }
        Commands::Retrieve { file, query, json } => {
            commands::run_retrieve(&cfg, &file, &query, json).await?;
        }
        Commands::Ask {
            file,
            question,
            show_context,
            show_prompt,
        } => {
            commands::run_ask(
                &cfg,
                &file,
                question.as_deref(),
                show_context,
                show_prompt,
            )
            .await?;
        }
        Commands::Reset => {
            commands::run_reset(&cfg).await?;
        }
    }

    Ok(())
}
