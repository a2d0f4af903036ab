//! Turning files and raw text into [`Document`]s.
//!
//! PDFs are read with `pdf-extract` first; when that fails or yields nothing
//! but whitespace, the loader falls back to page-by-page extraction through
//! `lopdf`. Plain text formats are read as UTF-8.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::document::{DIRECT_TEXT_SOURCE, Document, SOURCE_KEY};
use crate::error::{RagError, Result};

/// File extensions (lowercase, without the dot) read as UTF-8 text.
pub const TEXT_EXTENSIONS: [&str; 3] = ["txt", "md", "html"];

static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("valid regex"));
static SPACE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" +").expect("valid regex"));

/// Load a file into a [`Document`].
///
/// The document id and `source` metadata are `original_filename` when given
/// (uploads are often staged under temporary names), else the file's basename.
///
/// # Errors
///
/// - [`RagError::UnsupportedFileType`] for extensions other than
///   `pdf`, `txt`, `md`, `html`.
/// - [`RagError::LoaderError`] when the file cannot be read or a PDF has no
///   extractable text.
pub fn load_file(path: &Path, original_filename: Option<&str>) -> Result<Document> {
    let extension =
        path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).unwrap_or_default();

    let text = match extension.as_str() {
        "pdf" => parse_pdf(path)?,
        ext if TEXT_EXTENSIONS.contains(&ext) => {
            std::fs::read_to_string(path).map_err(|e| loader_error(path, e))?
        }
        "" => return Err(RagError::UnsupportedFileType("(none)".to_string())),
        other => return Err(RagError::UnsupportedFileType(format!(".{other}"))),
    };

    let filename = match original_filename {
        Some(name) => name.to_string(),
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string()),
    };

    debug!(path = %path.display(), source = %filename, text_len = text.len(), "loaded file");

    Ok(Document {
        id: filename.clone(),
        text,
        metadata: HashMap::from([(SOURCE_KEY.to_string(), filename)]),
        source_uri: Some(path.display().to_string()),
    })
}

/// Wrap raw text as a [`Document`].
///
/// Without metadata the `source` is `direct_text_input`. The document id is
/// the `source` value.
pub fn from_text(text: impl Into<String>, metadata: Option<HashMap<String, String>>) -> Document {
    let mut metadata = metadata.unwrap_or_default();
    let source = metadata
        .entry(SOURCE_KEY.to_string())
        .or_insert_with(|| DIRECT_TEXT_SOURCE.to_string())
        .clone();
    Document { id: source, text: text.into(), metadata, source_uri: None }
}

/// Normalize extracted text: blank-line runs collapse to one blank line, tabs
/// become spaces, space runs collapse, and the ends are trimmed.
pub fn clean_text(text: &str) -> String {
    let text = BLANK_LINES.replace_all(text, "\n\n");
    let text = text.replace('\t', " ");
    let text = SPACE_RUNS.replace_all(&text, " ");
    text.trim().to_string()
}

fn parse_pdf(path: &Path) -> Result<String> {
    // pdf-extract panics on some malformed font tables.
    let mut text = match std::panic::catch_unwind(|| pdf_extract::extract_text(path)) {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            warn!(path = %path.display(), error = %e, "pdf-extract failed, trying lopdf");
            String::new()
        }
        Err(_) => {
            warn!(path = %path.display(), "pdf-extract panicked, trying lopdf");
            String::new()
        }
    };

    if text.trim().is_empty() {
        text = match extract_pages_with_lopdf(path) {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "lopdf extraction failed");
                String::new()
            }
        };
    }

    let text = clean_text(&text);
    if text.is_empty() {
        return Err(RagError::LoaderError {
            path: path.display().to_string(),
            message: format!("Could not extract text from PDF: {}", path.display()),
        });
    }
    Ok(text)
}

fn extract_pages_with_lopdf(path: &Path) -> std::result::Result<String, lopdf::Error> {
    let pdf = lopdf::Document::load(path)?;
    let mut pages = Vec::new();
    for page_number in pdf.get_pages().keys() {
        match pdf.extract_text(&[*page_number]) {
            Ok(content) if !content.is_empty() => pages.push(content),
            Ok(_) => {}
            Err(e) => debug!(page = page_number, error = %e, "skipping unreadable page"),
        }
    }
    Ok(pages.join("\n"))
}

fn loader_error(path: &Path, e: impl std::fmt::Display) -> RagError {
    RagError::LoaderError { path: path.display().to_string(), message: e.to_string() }
}
