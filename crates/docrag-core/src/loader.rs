//! Document loader capability.
//!
//! Loaders turn an external source (a file path, an uploaded byte stream)
//! into an immutable [`Document`]. Concrete PDF, DOCX, and plain-text
//! loaders live in the `docrag` app crate.

use crate::error::Result;
use crate::models::Document;

/// Produces a [`Document`] from some source.
///
/// Missing, unreadable, or corrupt input is reported as
/// [`Error::Load`](crate::Error::Load); no partial document is returned.
pub trait DocumentLoader: Send + Sync {
    /// Human-readable description of the source (usually a path or file name).
    fn source(&self) -> &str;

    fn load(&self) -> Result<Document>;
}
