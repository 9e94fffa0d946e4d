//! SQLite connection and schema for the durable index.
//!
//! WAL mode is enabled so a reader never blocks on the single writer. The
//! schema is two tables:
//!
//! - `entries`: one row per chunk with its metadata and embedding BLOB
//! - `manifest`: at most one row, written in the same transaction as the
//!   entries; its presence marks a committed build

use docrag_core::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

pub(crate) fn storage_err(e: impl std::fmt::Display) -> Error {
    Error::Storage(e.to_string())
}

/// Open a pool on `db_path`. With `create == false` a missing file is an error.
pub async fn connect(db_path: &Path, create: bool) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
        .map_err(storage_err)?
        .create_if_missing(create)
        .journal_mode(SqliteJournalMode::Wal);

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(storage_err)
}

pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entries (
            chunk_id INTEGER PRIMARY KEY,
            doc_id TEXT NOT NULL,
            text TEXT NOT NULL,
            source_offset INTEGER NOT NULL,
            page INTEGER NOT NULL,
            hash TEXT NOT NULL,
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(storage_err)?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS manifest (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            build_id TEXT NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            entries INTEGER NOT NULL,
            built_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(storage_err)?;

    Ok(())
}
