//! Splitting documents into overlapping chunks.
//!
//! - [`RecursiveChunker`]: paragraphs, then lines, then words, then characters (default)
//! - [`FixedSizeChunker`]: plain character windows
//! - [`MarkdownChunker`]: one chunk per header section
//!
//! Sizes count characters, not bytes, so multi-byte text is only ever cut on
//! `char` boundaries.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::config::{ChunkStrategy, RagConfig};
use crate::document::{Chunk, Document};

/// A strategy for splitting documents into chunks.
///
/// Implementations produce [`Chunk`]s with text and metadata but no embeddings.
/// Embeddings are attached later by the pipeline.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has empty text.
    /// Each returned chunk has an empty embedding vector.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// Build the chunker selected by `config.chunk_strategy`.
pub fn chunker_for(config: &RagConfig) -> Arc<dyn Chunker> {
    match config.chunk_strategy {
        ChunkStrategy::Recursive => {
            Arc::new(RecursiveChunker::new(config.chunk_size, config.chunk_overlap))
        }
        ChunkStrategy::Fixed => {
            Arc::new(FixedSizeChunker::new(config.chunk_size, config.chunk_overlap))
        }
        ChunkStrategy::Markdown => {
            Arc::new(MarkdownChunker::new(config.chunk_size, config.chunk_overlap))
        }
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn into_chunks(document: &Document, texts: Vec<String>) -> Vec<Chunk> {
    texts.into_iter().enumerate().map(|(i, text)| Chunk::for_document(document, i, text)).collect()
}

/// Cuts text into windows of `chunk_size` characters, consecutive windows
/// sharing `chunk_overlap` characters. Ignores word boundaries.
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { chunk_size, chunk_overlap }
    }
}

/// Character windows of `chunk_size` advancing by `chunk_size - chunk_overlap`.
fn split_by_size(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    let step = chunk_size.saturating_sub(chunk_overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    chunks
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        if document.text.is_empty() {
            return Vec::new();
        }
        into_chunks(document, split_by_size(&document.text, self.chunk_size, self.chunk_overlap))
    }
}

/// Splits text recursively on a list of separators, merging small pieces back
/// together up to `chunk_size` characters with `chunk_overlap` characters of
/// carry-over between consecutive chunks.
///
/// The first separator present in the text is used; pieces that are still too
/// long are split again with the remaining separators. The empty separator
/// splits into single characters, so every chunk fits within `chunk_size`.
/// Separators stay attached to the start of the piece that follows them and
/// every chunk is whitespace-trimmed.
///
/// # Example
///
/// ```rust,ignore
/// use docrag::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(500, 50);
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveChunker {
    /// Separators tried in order: paragraphs, lines, words, characters.
    pub const DEFAULT_SEPARATORS: [&'static str; 4] = ["\n\n", "\n", " ", ""];

    /// Create a new `RecursiveChunker` with the default separators.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            separators: Self::DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Replace the separator list.
    pub fn with_separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    /// Split raw text into chunk strings.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        if text.is_empty() || self.chunk_size == 0 {
            return Vec::new();
        }
        let separators: Vec<&str> = self.separators.iter().map(String::as_str).collect();
        self.split_recursive(text, &separators)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut separator = "";
        let mut remaining: &[&str] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = candidate;
                break;
            }
            if text.contains(candidate) {
                separator = candidate;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut output = Vec::new();
        let mut small: Vec<&str> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                small.push(piece);
                continue;
            }
            if !small.is_empty() {
                output.extend(self.merge_pieces(&small));
                small.clear();
            }
            if remaining.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    output.push(trimmed.to_string());
                }
            } else {
                output.extend(self.split_recursive(piece, remaining));
            }
        }

        if !small.is_empty() {
            output.extend(self.merge_pieces(&small));
        }

        output
    }

    /// Greedily join pieces into chunks, keeping up to `chunk_overlap`
    /// characters of the previous chunk at the start of the next one.
    fn merge_pieces(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0;

        for piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                push_trimmed(&mut chunks, &window);
                while total > self.chunk_overlap || (total > 0 && total + len > self.chunk_size) {
                    match window.pop_front() {
                        Some((_, front_len)) => total -= front_len,
                        None => break,
                    }
                }
            }
            window.push_back((piece, len));
            total += len;
        }

        push_trimmed(&mut chunks, &window);
        chunks
    }
}

fn push_trimmed(chunks: &mut Vec<String>, window: &VecDeque<(&str, usize)>) {
    let joined: String = window.iter().map(|(piece, _)| *piece).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// Split text at `separator`, attaching each separator to the start of the
/// piece that follows it. The empty separator splits into characters.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text.char_indices().map(|(i, c)| &text[i..i + c.len_utf8()]).collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (pos, _) in text.match_indices(separator) {
        if pos > start {
            pieces.push(&text[start..pos]);
        }
        start = pos;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        if document.text.is_empty() {
            return Vec::new();
        }
        into_chunks(document, self.split_text(&document.text))
    }
}

/// One chunk per markdown section, prefixed with its `A > B > C` header
/// path, which is also stored as `header_path` metadata. Sections longer than
/// `chunk_size` go through a [`RecursiveChunker`].
#[derive(Debug, Clone)]
pub struct MarkdownChunker {
    chunk_size: usize,
    inner: RecursiveChunker,
}

impl MarkdownChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { chunk_size, inner: RecursiveChunker::new(chunk_size, chunk_overlap) }
    }
}

struct MarkdownSection {
    header_path: String,
    text: String,
}

/// Sections of `text` as delimited by `#` header lines.
fn parse_markdown_sections(text: &str) -> Vec<MarkdownSection> {
    let mut sections = Vec::new();
    let mut headers: Vec<String> = Vec::new();
    let mut current_body = String::new();
    let mut current_header_path = String::new();

    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with('#') {
            if !current_body.is_empty() || !current_header_path.is_empty() {
                sections.push(MarkdownSection {
                    header_path: current_header_path.clone(),
                    text: current_body.trim().to_string(),
                });
                current_body = String::new();
            }

            let level = trimmed.chars().take_while(|c| *c == '#').count();
            let header_text = trimmed[level..].trim().to_string();

            headers.truncate(level.saturating_sub(1));
            headers.push(header_text);
            current_header_path = headers.join(" > ");
        } else {
            if !current_body.is_empty() {
                current_body.push('\n');
            }
            current_body.push_str(line);
        }
    }

    if !current_body.is_empty() || !current_header_path.is_empty() {
        sections.push(MarkdownSection {
            header_path: current_header_path,
            text: current_body.trim().to_string(),
        });
    }

    sections
}

impl Chunker for MarkdownChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        if document.text.is_empty() {
            return Vec::new();
        }

        let mut chunks = Vec::new();

        for section in parse_markdown_sections(&document.text) {
            let section_text = if section.header_path.is_empty() {
                section.text.clone()
            } else if section.text.is_empty() {
                section.header_path.clone()
            } else {
                format!("{}\n{}", section.header_path, section.text)
            };

            if section_text.is_empty() {
                continue;
            }

            let sub_chunks = if char_len(&section_text) > self.chunk_size {
                self.inner.split_text(&section_text)
            } else {
                vec![section_text]
            };

            for text in sub_chunks {
                let mut chunk = Chunk::for_document(document, chunks.len(), text);
                chunk.metadata.insert("header_path".to_string(), section.header_path.clone());
                chunks.push(chunk);
            }
        }

        chunks
    }
}
