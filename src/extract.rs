//! PDF text extraction and failure classification.
//!
//! Wraps `pdf-extract` (page-wise text) and `lopdf` (page count, Info-dictionary
//! metadata, encryption detection). Extraction runs on blocking threads upstream; this
//! module is synchronous. Scanned, image-only PDFs come back with empty or near-empty
//! text; [`ExtractedDocument::is_low_yield`] lets callers reject those before any
//! indexing work happens.

use std::path::{Path, PathBuf};

use lopdf::{Dictionary, Document, Object};
use serde::Serialize;
use thiserror::Error;

use crate::error::{ErrorKind, ToolFault};

/// Minimum average characters per page before a document counts as extractable.
const LOW_YIELD_CHARS_PER_PAGE: usize = 100;

/// Errors raised while opening or parsing a PDF.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The file does not exist.
    #[error("PDF not found: {0}")]
    NotFound(PathBuf),
    /// The document is password-protected.
    #[error("PDF is password-protected: {0}")]
    Encrypted(PathBuf),
    /// The bytes could not be parsed as a PDF.
    #[error("Failed to read PDF {path}: {detail}")]
    Unreadable {
        /// Path of the offending file.
        path: PathBuf,
        /// Parser diagnostic.
        detail: String,
    },
}

impl ExtractError {
    /// Convert into the wire-level fault payload.
    pub fn to_fault(&self) -> ToolFault {
        ToolFault::new(ErrorKind::ExtractFailed, self.to_string())
    }
}

/// Text content of a PDF, page by page.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    /// Extracted text per page, in page order.
    pub pages: Vec<String>,
    /// Full document text (pages joined with blank lines).
    pub text: String,
}

impl ExtractedDocument {
    /// Number of pages in the document.
    pub fn num_pages(&self) -> usize {
        self.pages.len()
    }

    /// Number of characters of extracted text.
    pub fn num_characters(&self) -> usize {
        self.text.chars().count()
    }

    /// Whether extracted text density is too low to index (image-only PDFs).
    pub fn is_low_yield(&self) -> bool {
        if self.pages.is_empty() {
            return true;
        }
        self.num_characters() / self.pages.len() < LOW_YIELD_CHARS_PER_PAGE
    }
}

/// Document metadata surfaced by the `extract_pdf_metadata` tool.
#[derive(Debug, Clone, Serialize)]
pub struct PdfMetadata {
    /// Title from the Info dictionary, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Author from the Info dictionary, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Page count.
    pub num_pages: usize,
    /// Size of the file on disk, in bytes.
    pub file_size: u64,
}

/// A needle occurrence inside a document.
#[derive(Debug, Clone, Serialize)]
pub struct SearchMatch {
    /// 1-based page number.
    pub page: usize,
    /// Character offset of the match within the page text.
    pub offset: usize,
    /// Surrounding context.
    pub snippet: String,
}

/// Extract page-wise text from a PDF on disk.
pub fn extract_document(path: &Path) -> Result<ExtractedDocument, ExtractError> {
    classify_pdf(path)?;
    let pages = pdf_extract::extract_text_by_pages(path).map_err(|error| {
        ExtractError::Unreadable {
            path: path.to_path_buf(),
            detail: error.to_string(),
        }
    })?;
    let text = pages
        .iter()
        .map(|page| page.trim_end())
        .collect::<Vec<_>>()
        .join("\n\n");
    Ok(ExtractedDocument { pages, text })
}

/// Read document metadata without extracting text.
pub fn extract_metadata(path: &Path) -> Result<PdfMetadata, ExtractError> {
    let document = classify_pdf(path)?;
    let file_size = std::fs::metadata(path)
        .map(|meta| meta.len())
        .unwrap_or_default();
    let info = info_dictionary(&document);
    Ok(PdfMetadata {
        title: info.and_then(|dict| info_string(&document, dict, b"Title")),
        author: info.and_then(|dict| info_string(&document, dict, b"Author")),
        num_pages: document.get_pages().len(),
        file_size,
    })
}

/// Locate every occurrence of `needle` across the given pages.
///
/// Case-insensitive matching is ASCII-insensitive; offsets count characters from the
/// start of the page.
pub fn search_pages(pages: &[String], needle: &str, case_sensitive: bool) -> Vec<SearchMatch> {
    let mut matches = Vec::new();
    if needle.is_empty() {
        return matches;
    }
    for (page_index, page) in pages.iter().enumerate() {
        let mut char_offset = 0usize;
        for (byte_index, _) in page.char_indices() {
            if let Some(candidate) = page.get(byte_index..byte_index + needle.len()) {
                let hit = if case_sensitive {
                    candidate == needle
                } else {
                    candidate.eq_ignore_ascii_case(needle)
                };
                if hit {
                    matches.push(SearchMatch {
                        page: page_index + 1,
                        offset: char_offset,
                        snippet: snippet_around(page, byte_index, needle.len()),
                    });
                }
            }
            char_offset += 1;
        }
    }
    matches
}

/// Open the PDF with lopdf and classify missing/encrypted/unreadable failures.
fn classify_pdf(path: &Path) -> Result<Document, ExtractError> {
    if !path.exists() {
        return Err(ExtractError::NotFound(path.to_path_buf()));
    }
    let document = Document::load(path).map_err(|error| ExtractError::Unreadable {
        path: path.to_path_buf(),
        detail: error.to_string(),
    })?;
    if document.is_encrypted() {
        return Err(ExtractError::Encrypted(path.to_path_buf()));
    }
    Ok(document)
}

fn info_dictionary(document: &Document) -> Option<&Dictionary> {
    let info = document.trailer.get(b"Info").ok()?;
    resolve_object(document, info)?.as_dict().ok()
}

fn info_string(document: &Document, dict: &Dictionary, key: &[u8]) -> Option<String> {
    let object = resolve_object(document, dict.get(key).ok()?)?;
    match object {
        Object::String(bytes, _) => {
            let decoded = decode_pdf_text(bytes);
            let trimmed = decoded.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        _ => None,
    }
}

fn resolve_object<'a>(document: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => document.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Decode a PDF text string: UTF-16BE when BOM-prefixed, byte passthrough otherwise.
fn decode_pdf_text(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let utf16: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&utf16)
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

fn snippet_around(page: &str, match_start: usize, match_len: usize) -> String {
    const CONTEXT_BYTES: usize = 40;
    let start = snap_left(page, match_start.saturating_sub(CONTEXT_BYTES));
    let end = snap_right(page, (match_start + match_len + CONTEXT_BYTES).min(page.len()));
    page[start..end].trim().to_string()
}

fn snap_left(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn snap_right(text: &str, mut index: usize) -> usize {
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index
}
