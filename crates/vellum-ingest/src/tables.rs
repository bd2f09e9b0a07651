//! Plain-text table detection shared by extraction and table-aware chunking.

/// A run of lines that is either prose or a table.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Block<'a> {
    Prose(Vec<&'a str>),
    Table(Vec<&'a str>),
}

/// Minimum consecutive row-like lines that make a table.
const MIN_TABLE_ROWS: usize = 2;

/// A line that looks like a table row: pipe-delimited (leading pipe or at
/// least two pipes) with at least two cells, or tab-delimited.
pub(crate) fn is_table_row(line: &str) -> bool {
    let line = line.trim();
    if line.is_empty() {
        return false;
    }
    if line.contains('\t') {
        return line.split('\t').filter(|c| !c.trim().is_empty()).count() >= 2;
    }
    let delimited = line.starts_with('|') || line.matches('|').count() >= 2;
    delimited && line.split('|').filter(|c| !c.trim().is_empty()).count() >= 2
}

/// A markdown header separator such as `|---|:--:|`.
pub(crate) fn is_separator_row(line: &str) -> bool {
    let line = line.trim();
    line.contains('-')
        && line
            .chars()
            .all(|c| matches!(c, '|' | '-' | ':' | ' ' | '+'))
}

/// Split text into alternating prose and table blocks, preserving line order.
pub(crate) fn split_blocks(text: &str) -> Vec<Block<'_>> {
    let lines: Vec<&str> = text.lines().collect();
    let mut blocks = Vec::new();
    let mut prose: Vec<&str> = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let mut end = i;
        while end < lines.len() && (is_table_row(lines[end]) || (end > i && is_separator_row(lines[end]))) {
            end += 1;
        }

        if end - i >= MIN_TABLE_ROWS {
            if !prose.is_empty() {
                blocks.push(Block::Prose(std::mem::take(&mut prose)));
            }
            blocks.push(Block::Table(lines[i..end].to_vec()));
            i = end;
        } else {
            prose.push(lines[i]);
            i += 1;
        }
    }

    if !prose.is_empty() {
        blocks.push(Block::Prose(prose));
    }
    blocks
}

/// Number of table blocks in the text.
pub(crate) fn count_tables(text: &str) -> usize {
    split_blocks(text)
        .iter()
        .filter(|b| matches!(b, Block::Table(_)))
        .count()
}
