//! Markdown document parser.

use super::{read_text, DocumentParser, Extraction};
use crate::error::IngestResult;
use pulldown_cmark::{Event, Options, Parser, Tag};
use std::path::Path;

/// Parser for Markdown files.
///
/// Tables are rendered back as pipe rows so that table-aware chunking can
/// find them again in the plain text.
pub struct MarkdownParser {
    preserve_code_blocks: bool,
}

#[derive(Debug, Default)]
struct Rendered {
    text: String,
    title: Option<String>,
    images: usize,
    tables: usize,
}

impl MarkdownParser {
    pub fn new() -> Self {
        Self {
            preserve_code_blocks: true,
        }
    }

    fn render(&self, markdown: &str) -> Rendered {
        let parser = Parser::new_ext(markdown, Options::ENABLE_TABLES);
        let mut out = Rendered::default();
        let mut in_heading = false;
        let mut heading = String::new();
        let mut row: Vec<String> = Vec::new();
        let mut cell: Option<String> = None;

        for event in parser {
            match event {
                Event::Start(Tag::Heading(..)) => {
                    in_heading = true;
                    heading.clear();
                }
                Event::End(Tag::Heading(..)) => {
                    in_heading = false;
                    if out.title.is_none() {
                        out.title = Some(heading.trim().to_string());
                    }
                    out.text.push_str(heading.trim());
                    out.text.push_str("\n\n");
                }
                Event::Start(Tag::Image(..)) => out.images += 1,
                Event::Start(Tag::Table(_)) => out.tables += 1,
                Event::End(Tag::Table(_)) => out.text.push('\n'),
                Event::Start(Tag::TableHead) | Event::Start(Tag::TableRow) => row.clear(),
                Event::End(Tag::TableHead) | Event::End(Tag::TableRow) => {
                    out.text.push_str("| ");
                    out.text.push_str(&row.join(" | "));
                    out.text.push_str(" |\n");
                }
                Event::Start(Tag::TableCell) => cell = Some(String::new()),
                Event::End(Tag::TableCell) => row.push(cell.take().unwrap_or_default().trim().to_string()),
                Event::Start(Tag::CodeBlock(_)) if self.preserve_code_blocks => {
                    out.text.push_str("```\n");
                }
                Event::End(Tag::CodeBlock(_)) if self.preserve_code_blocks => {
                    out.text.push_str("```\n\n");
                }
                Event::End(Tag::Paragraph) => out.text.push_str("\n\n"),
                Event::End(Tag::List(_)) => out.text.push('\n'),
                Event::Start(Tag::Item) => out.text.push_str("- "),
                Event::End(Tag::Item) => out.text.push('\n'),
                Event::Text(t) | Event::Code(t) => {
                    if let Some(cell) = cell.as_mut() {
                        cell.push_str(&t);
                    } else if in_heading {
                        heading.push_str(&t);
                    } else {
                        out.text.push_str(&t);
                    }
                }
                Event::SoftBreak | Event::HardBreak => {
                    if cell.is_none() {
                        out.text.push('\n');
                    }
                }
                _ => {}
            }
        }

        out.text = out.text.trim().to_string();
        out
    }
}

impl Default for MarkdownParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentParser for MarkdownParser {
    fn parse(&self, path: &Path) -> IngestResult<Extraction> {
        let content = read_text(path)?;
        let rendered = self.render(&content);

        let mut extraction = Extraction::new(rendered.text, "markdown")
            .with_images(rendered.images)
            .with_tables(rendered.tables);
        if let Some(title) = rendered.title {
            extraction = extraction.with_field("title", serde_json::json!(title));
        }
        Ok(extraction)
    }

    fn extensions(&self) -> &[&str] {
        &["md", "markdown", "mdown", "mkd"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::count_tables;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_markdown() {
        let mut file = NamedTempFile::with_suffix(".md").unwrap();
        writeln!(
            file,
            r#"# Catalysis Results

Yields improved with temperature.

![setup](setup.png)

| Catalyst | Yield |
|----------|-------|
| Pd       | 91%   |
| Ni       | 78%   |

```python
print("done")
```
"#
        )
        .unwrap();

        let parser = MarkdownParser::new();
        let extraction = parser.parse(file.path()).unwrap();

        assert_eq!(extraction.metadata["title"], "Catalysis Results");
        assert_eq!(extraction.images_count(), 1);
        assert_eq!(extraction.tables_count(), 1);
        assert!(extraction.text.contains("Yields improved"));
        assert!(extraction.text.contains("| Pd | 91% |"));
        assert!(extraction.text.contains("print(\"done\")"));
        assert_eq!(count_tables(&extraction.text), 1);
    }

    #[test]
    fn test_no_structure() {
        let mut file = NamedTempFile::with_suffix(".md").unwrap();
        writeln!(file, "Just some text without a heading.").unwrap();

        let extraction = MarkdownParser::new().parse(file.path()).unwrap();
        assert_eq!(extraction.images_count(), 0);
        assert_eq!(extraction.tables_count(), 0);
        assert!(extraction.metadata.get("title").is_none());
    }
}
