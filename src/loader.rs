//! Concrete [`DocumentLoader`]s: files on disk and uploaded byte streams.

use std::path::{Path, PathBuf};

use docrag_core::loader::DocumentLoader;
use docrag_core::models::Document;
use docrag_core::{Error, Result};
use tracing::debug;

use crate::extract::{content_type_for_path, extract_pages, ExtractError};

fn load_error(source: &str, e: ExtractError) -> Error {
    Error::Load(format!("{}: {}", source, e))
}

/// Build a [`Document`] from raw bytes of a known content type.
pub fn document_from_bytes(source: &str, bytes: &[u8], content_type: &str) -> Result<Document> {
    if bytes.is_empty() {
        return Err(Error::Load(format!("{}: empty input", source)));
    }
    let pages = extract_pages(bytes, content_type).map_err(|e| load_error(source, e))?;
    debug!(source, content_type, pages = pages.len(), "document extracted");
    Ok(Document::new(source, pages))
}

/// Loads a document from a path; the content type comes from the extension.
pub struct FileLoader {
    path: PathBuf,
    source: String,
}

impl FileLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let source = path.display().to_string();
        Self { path, source }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DocumentLoader for FileLoader {
    fn source(&self) -> &str {
        &self.source
    }

    fn load(&self) -> Result<Document> {
        let content_type = content_type_for_path(&self.path).ok_or_else(|| {
            Error::Load(format!(
                "{}: unsupported file type (expected .pdf, .docx, .txt or .md)",
                self.source
            ))
        })?;
        let bytes = std::fs::read(&self.path)
            .map_err(|e| load_error(&self.source, ExtractError::Io(e)))?;
        document_from_bytes(&self.source, &bytes, content_type)
    }
}

/// Loads an uploaded document held in memory.
///
/// The content type may be declared by the uploader; otherwise it is
/// inferred from the file name.
pub struct BytesLoader {
    name: String,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

impl BytesLoader {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: None,
            bytes,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

impl DocumentLoader for BytesLoader {
    fn source(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<Document> {
        let content_type = match &self.content_type {
            Some(ct) => ct.as_str(),
            None => content_type_for_path(Path::new(&self.name)).ok_or_else(|| {
                Error::Load(format!("{}: cannot infer content type", self.name))
            })?,
        };
        document_from_bytes(&self.name, &self.bytes, content_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::MIME_TEXT;

    #[test]
    fn test_file_loader_reads_text() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "Heading\n\nSome body text.").unwrap();

        let doc = FileLoader::new(&path).load().unwrap();
        assert_eq!(doc.pages().len(), 1);
        assert_eq!(doc.text(), "Heading\n\nSome body text.");
        assert_eq!(doc.source(), path.display().to_string());
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = FileLoader::new(dir.path().join("absent.pdf")).load().unwrap_err();
        assert!(matches!(err, Error::Load(_)));
    }

    #[test]
    fn test_unknown_extension_is_load_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("picture.png");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();
        assert!(matches!(FileLoader::new(&path).load(), Err(Error::Load(_))));
    }

    #[test]
    fn test_corrupt_pdf_is_load_error() {
        let loader = BytesLoader::new("upload.pdf", b"%PDF-garbage".to_vec());
        assert!(matches!(loader.load(), Err(Error::Load(_))));
    }

    #[test]
    fn test_empty_bytes_rejected() {
        let loader = BytesLoader::new("upload.txt", Vec::new());
        assert!(matches!(loader.load(), Err(Error::Load(_))));
    }

    #[test]
    fn test_declared_content_type_wins() {
        let loader =
            BytesLoader::new("upload.bin", b"plain words".to_vec()).with_content_type(MIME_TEXT);
        let doc = loader.load().unwrap();
        assert_eq!(doc.text(), "plain words");
        assert_eq!(doc.source(), "upload.bin");
    }

    #[test]
    fn test_same_bytes_same_doc_id() {
        let a = BytesLoader::new("a.txt", b"same".to_vec()).load().unwrap();
        let b = BytesLoader::new("b.txt", b"same".to_vec()).load().unwrap();
        assert_eq!(a.doc_id(), b.doc_id());
    }
}
