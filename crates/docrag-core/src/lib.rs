//! # docrag core
//!
//! Shared, WASM-safe logic for docrag: the document data model, the
//! boundary-respecting chunker, the embedder and generator capability
//! traits, vector index lifecycle, top-k retrieval, and prompt assembly.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or network
//! dependencies. Concrete loaders, embedders, generators, and the durable
//! index live in the `docrag` application crate.
//!
//! ## Pipeline
//!
//! ```text
//! Document ─▶ Chunker ─▶ chunks ─▶ Embedder ─▶ VectorIndex (build)
//!
//! Query ─▶ Embedder ─▶ Retriever ─▶ ranked chunks ─▶ PromptBuilder ─▶ AnswerGenerator
//! ```
//!
//! The [`session::Session`] type owns one index and drives the pipeline
//! through its `Empty → Ingesting → Indexed → Querying` states.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod generate;
pub mod index;
pub mod loader;
pub mod models;
pub mod prompt;
pub mod retrieve;
pub mod session;

pub use error::{Error, Result};
