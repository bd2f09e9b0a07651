//! Plain text and delimited-table parser.

use super::{read_text, DocumentParser, Extraction};
use crate::error::IngestResult;
use crate::tables::count_tables;
use std::path::Path;

/// Parser for plain text, CSV and TSV files.
///
/// Delimited files are rendered as pipe rows, one table per file.
pub struct TextParser;

impl TextParser {
    pub fn new() -> Self {
        Self
    }

    fn delimiter(extension: &str) -> Option<char> {
        match extension.to_lowercase().as_str() {
            "csv" => Some(','),
            "tsv" | "tab" => Some('\t'),
            _ => None,
        }
    }
}

impl Default for TextParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Split one delimited line, honoring double-quoted fields.
fn split_fields(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            c if c == delimiter && !in_quotes => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            c => current.push(c),
        }
    }
    fields.push(current.trim().to_string());
    fields
}

fn render_rows(content: &str, delimiter: char) -> (String, usize) {
    let rows: Vec<String> = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| format!("| {} |", split_fields(line, delimiter).join(" | ")))
        .collect();
    (rows.join("\n"), rows.len())
}

impl DocumentParser for TextParser {
    fn parse(&self, path: &Path) -> IngestResult<Extraction> {
        let content = read_text(path)?;
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match Self::delimiter(extension) {
            Some(delimiter) => {
                let (text, rows) = render_rows(&content, delimiter);
                let format = if delimiter == ',' { "csv" } else { "tsv" };
                Ok(Extraction::new(text, format)
                    .with_tables(usize::from(rows > 0))
                    .with_field("rows", serde_json::json!(rows)))
            }
            None => {
                let text = content.trim().to_string();
                let tables = count_tables(&text);
                Ok(Extraction::new(text, "text").with_tables(tables))
            }
        }
    }

    fn extensions(&self) -> &[&str] {
        &["txt", "text", "csv", "tsv", "tab"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_text() {
        let mut file = NamedTempFile::with_suffix(".txt").unwrap();
        writeln!(file, "This is a plain text file.\nWith multiple lines.").unwrap();

        let extraction = TextParser::new().parse(file.path()).unwrap();
        assert!(extraction.text.contains("plain text file"));
        assert_eq!(extraction.metadata["format"], "text");
        assert_eq!(extraction.tables_count(), 0);
    }

    #[test]
    fn test_parse_csv_renders_table() {
        let mut file = NamedTempFile::with_suffix(".csv").unwrap();
        writeln!(file, "compound,mass\n\"water, pure\",18.02\nethanol,46.07").unwrap();

        let extraction = TextParser::new().parse(file.path()).unwrap();
        assert_eq!(extraction.metadata["format"], "csv");
        assert_eq!(extraction.metadata["rows"], 3);
        assert_eq!(extraction.tables_count(), 1);
        assert!(extraction.text.contains("| water, pure | 18.02 |"));
        assert_eq!(count_tables(&extraction.text), 1);
    }

    #[test]
    fn test_split_fields_quotes() {
        assert_eq!(split_fields(r#"a,"b ""c""",d"#, ','), vec!["a", "b \"c\"", "d"]);
        assert_eq!(split_fields("x\ty", '\t'), vec!["x", "y"]);
    }

    #[test]
    fn test_invalid_utf8_is_extraction_error() {
        let mut file = NamedTempFile::with_suffix(".txt").unwrap();
        file.write_all(&[0xff, 0xfe, 0x00]).unwrap();
        let err = TextParser::new().parse(file.path()).unwrap_err();
        assert_eq!(err.kind(), "extraction");
    }
}
