//! Chunking strategies.
//!
//! All sizes are in characters. Each strategy returns trimmed, non-empty
//! chunks in document order.

use crate::tables::{is_separator_row, split_blocks, Block};
use vellum_config::ChunkingConfig;
use vellum_core::ChunkingStrategy;

/// Separators tried in order by the recursive splitter. The empty string
/// means a hard split by characters.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "; ", ", ", " ", ""];

/// Configuration for chunking.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Target size of each chunk.
    pub chunk_size: usize,
    /// Characters repeated between consecutive chunks.
    pub chunk_overlap: usize,
    /// A trailing paragraph chunk shorter than this is folded into the previous one.
    pub min_chunk_size: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self::from_config(&ChunkingConfig::default())
    }
}

impl ChunkConfig {
    pub fn from_config(config: &ChunkingConfig) -> Self {
        let chunk_size = config.chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: config.chunk_overlap.min(chunk_size - 1),
            min_chunk_size: config.min_chunk_size,
        }
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Splits text with one of the [`ChunkingStrategy`] implementations.
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkConfig,
}

impl Chunker {
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    pub fn split(&self, strategy: ChunkingStrategy, text: &str) -> Vec<String> {
        let text = text.trim();
        if text.is_empty() {
            return vec![];
        }
        match strategy {
            ChunkingStrategy::Recursive => self.recursive(text),
            ChunkingStrategy::TableAware => self.table_aware(text),
            ChunkingStrategy::Paragraph => self.paragraph(text),
        }
    }

    // Recursive

    /// Split on the coarsest separator that yields pieces within the window,
    /// then pack the pieces with overlap.
    pub fn recursive(&self, text: &str) -> Vec<String> {
        let mut pieces = Vec::new();
        self.split_pieces(text, SEPARATORS, &mut pieces);
        self.merge_pieces(pieces)
    }

    fn split_pieces(&self, text: &str, separators: &[&str], out: &mut Vec<String>) {
        if char_len(text) <= self.config.chunk_size {
            if !text.is_empty() {
                out.push(text.to_string());
            }
            return;
        }
        match separators.split_first() {
            Some((sep, rest)) if !sep.is_empty() => {
                if !text.contains(sep) {
                    self.split_pieces(text, rest, out);
                    return;
                }
                for part in text.split_inclusive(sep) {
                    self.split_pieces(part, rest, out);
                }
            }
            _ => out.extend(self.hard_split(text)),
        }
    }

    /// Split by character count with no regard for boundaries.
    fn hard_split(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        chars
            .chunks(self.config.chunk_size)
            .map(|c| c.iter().collect())
            .collect()
    }

    /// Pack pieces into windows of at most `chunk_size`. Each new window
    /// starts with up to `chunk_overlap` trailing characters of the previous
    /// one, cut at a word boundary.
    fn merge_pieces(&self, pieces: Vec<String>) -> Vec<String> {
        let size = self.config.chunk_size;
        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut current_len = 0;
        // Whether `current` holds anything beyond carried overlap.
        let mut fresh = false;

        for piece in pieces {
            let len = char_len(&piece);
            if fresh && current_len + len > size {
                push_chunk(&mut chunks, current.clone());
                current = self.overlap_tail(&current, size - len);
                current_len = char_len(&current);
            }
            current.push_str(&piece);
            current_len += len;
            fresh = true;
        }

        if fresh {
            push_chunk(&mut chunks, current);
        }
        chunks
    }

    fn overlap_tail(&self, text: &str, room: usize) -> String {
        let limit = self.config.chunk_overlap.min(room);
        if limit == 0 {
            return String::new();
        }
        let chars: Vec<char> = text.chars().collect();
        let start = chars.len().saturating_sub(limit);
        let tail: String = chars[start..].iter().collect();
        if start == 0 {
            return tail;
        }
        match tail.find(char::is_whitespace) {
            Some(pos) => tail[pos..].trim_start().to_string(),
            None => String::new(),
        }
    }

    // Table-aware

    /// Keep each table whole when it fits; otherwise split it by rows,
    /// repeating the header row(s) in every part. Prose between tables is
    /// split recursively.
    pub fn table_aware(&self, text: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        for block in split_blocks(text) {
            match block {
                Block::Prose(lines) => {
                    let prose = lines.join("\n");
                    let prose = prose.trim();
                    if !prose.is_empty() {
                        chunks.extend(self.recursive(prose));
                    }
                }
                Block::Table(rows) => chunks.extend(self.split_table(&rows)),
            }
        }
        chunks
    }

    fn split_table(&self, rows: &[&str]) -> Vec<String> {
        let whole = rows.join("\n");
        if char_len(&whole) <= self.config.chunk_size {
            return vec![whole];
        }

        let header_len = if rows.len() > 1 && is_separator_row(rows[1]) { 2 } else { 1 };
        let (header, body) = rows.split_at(header_len.min(rows.len()));
        let header = header.join("\n");
        let budget = self.config.chunk_size.saturating_sub(char_len(&header) + 1);

        let mut chunks = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut current_len = 0;
        for &row in body {
            let len = char_len(row) + 1;
            if !current.is_empty() && current_len + len > budget {
                chunks.push(format!("{}\n{}", header, current.join("\n")));
                current.clear();
                current_len = 0;
            }
            current.push(row);
            current_len += len;
        }
        if !current.is_empty() {
            chunks.push(format!("{}\n{}", header, current.join("\n")));
        }
        if chunks.is_empty() {
            chunks.push(header);
        }
        chunks
    }

    // Paragraph

    /// Pack whole paragraphs up to the window; paragraphs that are too long
    /// are packed sentence by sentence.
    pub fn paragraph(&self, text: &str) -> Vec<String> {
        let size = self.config.chunk_size;
        let mut chunks: Vec<String> = Vec::new();
        let mut current = String::new();

        for para in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
            let para_len = char_len(para);
            if para_len > size {
                push_chunk(&mut chunks, std::mem::take(&mut current));
                for sentence in split_sentences(para) {
                    for piece in self.fit(sentence) {
                        let piece_len = char_len(&piece);
                        if !current.is_empty() && char_len(&current) + piece_len + 1 > size {
                            push_chunk(&mut chunks, std::mem::take(&mut current));
                        }
                        if !current.is_empty() {
                            current.push(' ');
                        }
                        current.push_str(&piece);
                    }
                }
                push_chunk(&mut chunks, std::mem::take(&mut current));
                continue;
            }

            if !current.is_empty() && char_len(&current) + para_len + 2 > size {
                push_chunk(&mut chunks, std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(para);
        }
        push_chunk(&mut chunks, std::mem::take(&mut current));

        // Fold a runt tail into its predecessor.
        if chunks.len() > 1 {
            let last_len = chunks.last().map(|c| char_len(c)).unwrap_or(0);
            if last_len < self.config.min_chunk_size {
                if let Some(tail) = chunks.pop() {
                    if let Some(prev) = chunks.last_mut() {
                        prev.push_str("\n\n");
                        prev.push_str(&tail);
                    }
                }
            }
        }
        chunks
    }

    /// A sentence longer than the window is hard-split.
    fn fit(&self, sentence: &str) -> Vec<String> {
        if char_len(sentence) <= self.config.chunk_size {
            vec![sentence.to_string()]
        } else {
            self.hard_split(sentence)
        }
    }
}

fn push_chunk(chunks: &mut Vec<String>, chunk: String) {
    let trimmed = chunk.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// Split text into sentences at `.`, `!` or `?` followed by whitespace.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for (i, c) in text.char_indices() {
        if matches!(c, '.' | '!' | '?') {
            let next = i + c.len_utf8();
            if next >= text.len() || text[next..].starts_with(char::is_whitespace) {
                let sentence = text[start..next].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                start = next;
            }
        }
    }

    let remaining = text[start..].trim();
    if !remaining.is_empty() {
        sentences.push(remaining);
    }
    sentences
}
