//! Integration tests for document formats: DOCX, PDF, text, and Markdown
//! loaded through the `docrag` binary and through the library loaders.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use docrag::loader::{BytesLoader, FileLoader};
use docrag_core::loader::DocumentLoader;
use docrag_core::Error;
use tempfile::TempDir;

fn docrag_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop();
    path.pop();
    path.push("docrag");
    path
}

/// Minimal hand-built PDF with one page of Helvetica text and correct
/// xref offsets.
fn minimal_pdf_with_phrase() -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(b"4 0 obj << /Length 46 >> stream\nBT /F1 12 Tf 100 700 Td (quarterly figures) Tj ET\nendstream endobj\n");
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

/// Minimal docx (ZIP) whose body is the given raw WordprocessingML.
fn minimal_docx(body_xml: &str) -> Vec<u8> {
    use std::io::Write;
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file(
            "word/document.xml",
            zip::write::SimpleFileOptions::default(),
        )
        .unwrap();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
            body_xml
        );
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

fn paragraph(text: &str) -> String {
    format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", text)
}

const PAGE_BREAK: &str = "<w:p><w:r><w:br w:type=\"page\"/></w:r></w:p>";

fn setup_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    fs::create_dir_all(root.join("config")).unwrap();
    fs::create_dir_all(root.join("files")).unwrap();

    let config_content = r#"[chunking]
chunk_size = 200
overlap = 20

[embedding]
provider = "hash"

[generation]
provider = "disabled"
"#;
    let config_path = root.join("config").join("docrag.toml");
    fs::write(&config_path, config_content).unwrap();
    (tmp, config_path)
}

fn run_docrag(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = docrag_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docrag: {}", e));
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

// ─── DOCX ───

#[test]
fn test_docx_chunked_through_cli() {
    let (tmp, config_path) = setup_env();
    let file = tmp.path().join("files").join("lease.docx");
    fs::write(&file, minimal_docx(&paragraph("office test phrase"))).unwrap();

    let (stdout, stderr, success) =
        run_docrag(&config_path, &["chunk", file.to_str().unwrap(), "--json"]);
    assert!(success, "chunk failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("office test phrase"), "got: {}", stdout);
}

#[test]
fn test_docx_page_breaks_become_pages() {
    let body = format!(
        "{}{}{}",
        paragraph("Introduction to the lease."),
        PAGE_BREAK,
        paragraph("Termination clauses follow.")
    );
    let doc = BytesLoader::new("lease.docx", minimal_docx(&body))
        .load()
        .unwrap();

    assert_eq!(doc.pages().len(), 2);
    assert!(doc.pages()[0].contains("Introduction"));
    assert!(doc.pages()[1].contains("Termination"));
    let offset = doc.text().find("Termination").unwrap();
    assert_eq!(doc.page_at(offset), 2);
}

#[test]
fn test_docx_retrieve_finds_phrase() {
    let (tmp, config_path) = setup_env();
    let file = tmp.path().join("files").join("notes.docx");
    let body = format!(
        "{}{}",
        paragraph("The harvest festival starts in October."),
        paragraph("Parking is available behind the town hall.")
    );
    fs::write(&file, minimal_docx(&body)).unwrap();

    let (stdout, stderr, success) = run_docrag(
        &config_path,
        &["retrieve", file.to_str().unwrap(), "harvest festival"],
    );
    assert!(success, "retrieve failed: {}", stderr);
    assert!(stdout.contains("harvest festival"), "got: {}", stdout);
}

#[test]
fn test_docx_without_document_xml_fails() {
    use std::io::Write;
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/styles.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"<styles/>").unwrap();
        zip.finish().unwrap();
    }
    let err = BytesLoader::new("broken.docx", buf).load().unwrap_err();
    assert!(matches!(err, Error::Load(_)));
}

// ─── PDF ───

#[test]
fn test_corrupt_pdf_fails_to_load() {
    let (tmp, config_path) = setup_env();
    let file = tmp.path().join("files").join("bad.pdf");
    fs::write(&file, b"not a valid pdf").unwrap();

    let err = FileLoader::new(&file).load().unwrap_err();
    assert!(matches!(err, Error::Load(_)));

    let (_, stderr, success) = run_docrag(&config_path, &["chunk", file.to_str().unwrap()]);
    assert!(!success, "corrupt PDF must fail");
    assert!(stderr.contains("bad.pdf"), "error should name the file: {}", stderr);
}

#[test]
fn test_minimal_pdf_does_not_crash() {
    // pdf-extract may or may not recover text from a font without metrics;
    // either way loading must return rather than panic.
    let result = BytesLoader::new("figures.pdf", minimal_pdf_with_phrase()).load();
    match result {
        Ok(doc) => assert!(!doc.pages().is_empty()),
        Err(err) => assert!(matches!(err, Error::Load(_))),
    }
}

// ─── Text and Markdown ───

#[test]
fn test_markdown_and_text_are_single_page() {
    let (tmp, _) = setup_env();
    let md = tmp.path().join("files").join("readme.md");
    let txt = tmp.path().join("files").join("notes.txt");
    fs::write(&md, "# Readme\n\nPlain text file for tests.\n").unwrap();
    fs::write(&txt, "Line one.\nLine two.\n").unwrap();

    let md_doc = FileLoader::new(&md).load().unwrap();
    let txt_doc = FileLoader::new(&txt).load().unwrap();
    assert_eq!(md_doc.pages().len(), 1);
    assert_eq!(txt_doc.pages().len(), 1);
    assert!(md_doc.text().contains("Plain text file"));
}

#[test]
fn test_unknown_extension_rejected() {
    let (tmp, config_path) = setup_env();
    let file = tmp.path().join("files").join("image.png");
    fs::write(&file, [0x89u8, b'P', b'N', b'G']).unwrap();

    let (_, _, success) = run_docrag(&config_path, &["chunk", file.to_str().unwrap()]);
    assert!(!success, "unsupported file types must fail");
}

#[test]
fn test_same_bytes_same_doc_id() {
    let (tmp, _) = setup_env();
    let a = tmp.path().join("files").join("a.txt");
    let b = tmp.path().join("files").join("b.txt");
    fs::write(&a, "identical content").unwrap();
    fs::write(&b, "identical content").unwrap();

    let doc_a = FileLoader::new(&a).load().unwrap();
    let doc_b = FileLoader::new(&b).load().unwrap();
    assert_eq!(doc_a.doc_id(), doc_b.doc_id());
    assert_ne!(doc_a.source(), doc_b.source());
}
