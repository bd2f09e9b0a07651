//! PDF document parser.

use super::{DocumentParser, Extraction};
use crate::error::{IngestError, IngestResult};
use crate::tables::count_tables;
use lopdf::{Document, Object};
use std::path::Path;
use tracing::{debug, warn};

/// Parser for PDF files.
///
/// Structure (pages, embedded images) comes from `lopdf`; text comes from
/// `pdf-extract`, with `lopdf`'s own text extraction as a fallback.
pub struct PdfParser;

impl PdfParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PdfParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentParser for PdfParser {
    fn parse(&self, path: &Path) -> IngestResult<Extraction> {
        debug!("Parsing PDF: {:?}", path);

        let document = Document::load(path)
            .map_err(|e| IngestError::extraction(path, format!("invalid PDF: {}", e)))?;
        let pages: Vec<u32> = document.get_pages().keys().copied().collect();
        let images = count_images(&document);

        let text = match extract_with_pdf_extract(path) {
            Some(text) if !text.trim().is_empty() => text,
            _ => document
                .extract_text(&pages)
                .map_err(|e| IngestError::extraction(path, format!("no readable text: {}", e)))?,
        };
        let text = clean_pdf_text(&text);

        debug!(pages = pages.len(), images, chars = text.len(), "Extracted PDF");

        Ok(Extraction::new(text.as_str(), "pdf")
            .with_images(images)
            .with_tables(count_tables(&text))
            .with_field("pages", serde_json::json!(pages.len())))
    }

    fn extensions(&self) -> &[&str] {
        &["pdf"]
    }
}

/// `pdf-extract` panics on some malformed files; treat that as "no text".
fn extract_with_pdf_extract(path: &Path) -> Option<String> {
    match std::panic::catch_unwind(|| pdf_extract::extract_text(path)) {
        Ok(Ok(text)) => Some(text),
        Ok(Err(e)) => {
            warn!("pdf-extract failed for {:?}: {}", path, e);
            None
        }
        Err(_) => {
            warn!("pdf-extract panicked for {:?}", path);
            None
        }
    }
}

/// Count image XObjects in the file.
fn count_images(document: &Document) -> usize {
    document
        .objects
        .values()
        .filter(|object| match object {
            Object::Stream(stream) => matches!(
                stream.dict.get(b"Subtype").and_then(Object::as_name),
                Ok(name) if name == &b"Image"[..]
            ),
            _ => false,
        })
        .count()
}

/// Trim lines, collapse blank runs and turn form feeds into paragraph breaks.
fn clean_pdf_text(text: &str) -> String {
    text.replace('\x0C', "\n\n")
        .lines()
        .map(|line| line.trim())
        .fold(Vec::new(), |mut acc: Vec<&str>, line| {
            let last_was_empty = acc.last().map(|s| s.is_empty()).unwrap_or(false);
            if !(line.is_empty() && last_was_empty) {
                acc.push(line);
            }
            acc
        })
        .join("\n")
        .trim()
        .to_string()
}
