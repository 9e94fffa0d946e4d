//! # docrag
//!
//! Ask questions about a single document using retrieval-augmented
//! generation. The document is split into overlapping chunks, embedded,
//! and indexed; each question retrieves the closest chunks and hands them
//! to a language model with strict instructions to answer only from that
//! text.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │   Loaders    │──▶│   Session    │──▶│ VectorIndex  │
//! │ PDF/DOCX/TXT │   │ chunk+embed  │   │ memory|SQLite│
//! └──────────────┘   └──────┬───────┘   └──────────────┘
//!                           │
//!                           ▼
//!                 ┌──────────────────┐   ┌──────────────┐
//!                 │ Retriever+Prompt │──▶│  Generator   │
//!                 └──────────────────┘   │ Ollama|OpenAI│
//!                                        └──────────────┘
//! ```
//!
//! The pipeline logic lives in `docrag-core`; this crate adds the
//! concrete collaborators and the `docrag` CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`extract`] | PDF / DOCX / text page extraction |
//! | [`loader`] | File and uploaded-bytes document loaders |
//! | [`embedding`] | Ollama, OpenAI, hash, and local embedders |
//! | [`generate`] | Ollama and OpenAI answer generators |
//! | [`sqlite_index`] | Durable, lock-protected vector index |
//! | [`db`] | SQLite connection and schema |
//! | [`commands`] | CLI command implementations |
//! | [`logging`] | Tracing subscriber setup |

pub mod commands;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod generate;
pub mod http;
pub mod loader;
pub mod logging;
pub mod sqlite_index;

pub use docrag_core;
