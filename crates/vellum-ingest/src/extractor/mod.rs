//! Text and structural metadata extraction for supported file formats.

mod markdown;
mod pdf;
mod text;

pub use markdown::MarkdownParser;
pub use pdf::PdfParser;
pub use text::TextParser;

use crate::error::{IngestError, IngestResult};
use serde_json::{json, Value};
use std::path::Path;

/// Raw text of a document plus what the classifier needs to know about its structure.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub text: String,
    /// Always carries `format`, `images_count`, `tables_count`, `char_count`,
    /// `word_count` and `file_name`.
    pub metadata: Value,
}

impl Extraction {
    pub fn new(text: impl Into<String>, format: &str) -> Self {
        Self {
            text: text.into(),
            metadata: json!({
                "format": format,
                "images_count": 0,
                "tables_count": 0,
            }),
        }
    }

    pub fn with_images(mut self, count: usize) -> Self {
        self.metadata["images_count"] = json!(count);
        self
    }

    pub fn with_tables(mut self, count: usize) -> Self {
        self.metadata["tables_count"] = json!(count);
        self
    }

    pub fn with_field(mut self, key: &str, value: Value) -> Self {
        self.metadata[key] = value;
        self
    }

    pub fn images_count(&self) -> u64 {
        self.metadata["images_count"].as_u64().unwrap_or(0)
    }

    pub fn tables_count(&self) -> u64 {
        self.metadata["tables_count"].as_u64().unwrap_or(0)
    }

    fn finish(mut self, path: &Path) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.metadata["char_count"] = json!(self.text.chars().count());
        self.metadata["word_count"] = json!(self.text.split_whitespace().count());
        self.metadata["file_name"] = json!(file_name);
        self
    }
}

/// A parser for one family of file formats.
pub trait DocumentParser: Send + Sync {
    fn parse(&self, path: &Path) -> IngestResult<Extraction>;

    fn extensions(&self) -> &[&str];

    fn supports(&self, extension: &str) -> bool {
        self.extensions()
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(extension))
    }
}

fn parsers() -> [Box<dyn DocumentParser>; 3] {
    [
        Box::new(PdfParser::new()),
        Box::new(MarkdownParser::new()),
        Box::new(TextParser::new()),
    ]
}

/// Whether any parser handles this extension.
pub fn is_supported(path: &Path) -> bool {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    parsers().iter().any(|p| p.supports(extension))
}

/// Extract a file, choosing the parser by extension.
///
/// Blocking; call from `spawn_blocking` in async code.
pub fn extract(path: &Path) -> IngestResult<Extraction> {
    if !path.is_file() {
        return Err(IngestError::extraction(path, "file not found"));
    }
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    let parser = parsers()
        .into_iter()
        .find(|p| p.supports(extension))
        .ok_or_else(|| {
            IngestError::extraction(path, format!("unsupported file type '{}'", extension))
        })?;

    Ok(parser.parse(path)?.finish(path))
}

/// Read a file as UTF-8, mapping failures to extraction errors.
pub(crate) fn read_text(path: &Path) -> IngestResult<String> {
    let bytes = std::fs::read(path).map_err(|e| IngestError::extraction(path, e))?;
    String::from_utf8(bytes).map_err(|_| IngestError::extraction(path, "file is not valid UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_extract_dispatches_and_fills_metadata() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "three little words").unwrap();

        let extraction = extract(&path).unwrap();
        assert_eq!(extraction.metadata["format"], "text");
        assert_eq!(extraction.metadata["word_count"], 3);
        assert_eq!(extraction.metadata["char_count"], 18);
        assert_eq!(extraction.metadata["file_name"], "notes.txt");
        assert_eq!(extraction.images_count(), 0);
    }

    #[test]
    fn test_unsupported_and_missing_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("song.mp3");
        std::fs::write(&path, [0u8, 1, 2]).unwrap();

        assert!(!is_supported(&path));
        assert!(matches!(extract(&path), Err(IngestError::Extraction { .. })));
        assert!(matches!(
            extract(&dir.path().join("absent.md")),
            Err(IngestError::Extraction { .. })
        ));
    }

    #[test]
    fn test_corrupt_pdf_is_extraction_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not really a pdf").unwrap();

        let err = extract(&path).unwrap_err();
        assert_eq!(err.kind(), "extraction");
    }
}
