use tracing::debug;

use crate::{DefinitionIndex, Term};

/// One `;`-run followed by its `:`-run, before term extraction.
struct RawBlock<'a> {
    term_lines: Vec<&'a str>,
    definition_lines: Vec<&'a str>,
}

enum Line<'a> {
    Term(&'a str),
    Definition(&'a str),
    Other,
}

/// Build a fresh index from glossary source text.
///
/// Never fails: text without a well-formed block structure yields an empty index.
pub fn parse_glossary(text: &str) -> DefinitionIndex {
    let mut index = DefinitionIndex::new();
    parse_into(text, &mut index);
    index
}

/// Add every `; term` / `: definition` block of `text` to `index`.
///
/// Each block is one or more lines starting with `;` followed by one or more
/// lines starting with `:`. A `;` line may carry several aliases separated by
/// further `;`. The definition is the block's `:` lines, trimmed and joined by
/// a space. A term run that no definition run closes, such as a `;Note`
/// pseudo-heading, is skipped without affecting the blocks around it. Returns
/// the number of blocks that produced an entry.
pub fn parse_into(text: &str, index: &mut DefinitionIndex) -> usize {
    let Some(blocks) = scan_blocks(text) else {
        debug!("glossary text has no usable term/definition structure");
        return 0;
    };

    let mut added = 0usize;
    for block in blocks {
        let terms = extract_terms(&block.term_lines);
        if terms.is_empty() {
            continue;
        }
        let definition = block
            .definition_lines
            .iter()
            .map(|line| line.trim())
            .collect::<Vec<_>>()
            .join(" ");
        if index.add_entry(terms, definition).is_some() {
            added += 1;
        }
    }
    debug!("parsed {added} glossary entries");
    added
}

fn scan_blocks(text: &str) -> Option<Vec<RawBlock<'_>>> {
    let mut blocks = Vec::new();
    let mut dangling = 0usize;
    let mut term_lines: Vec<&str> = Vec::new();
    let mut definition_lines: Vec<&str> = Vec::new();

    for raw in text.lines() {
        match classify(raw) {
            Line::Term(rest) => {
                if !definition_lines.is_empty() {
                    blocks.push(RawBlock {
                        term_lines: std::mem::take(&mut term_lines),
                        definition_lines: std::mem::take(&mut definition_lines),
                    });
                }
                term_lines.push(rest);
            }
            Line::Definition(rest) => {
                // A `:` line outside a block is plain indentation, not a definition.
                if term_lines.is_empty() {
                    continue;
                }
                definition_lines.push(rest);
            }
            Line::Other => {
                if !definition_lines.is_empty() {
                    blocks.push(RawBlock {
                        term_lines: std::mem::take(&mut term_lines),
                        definition_lines: std::mem::take(&mut definition_lines),
                    });
                } else if !term_lines.is_empty() {
                    dangling += 1;
                    term_lines.clear();
                }
            }
        }
    }
    if !definition_lines.is_empty() {
        blocks.push(RawBlock {
            term_lines,
            definition_lines,
        });
    } else if !term_lines.is_empty() {
        dangling += 1;
    }

    if dangling > 0 {
        debug!("skipped {dangling} term runs without a definition");
    }
    if blocks.is_empty() {
        return None;
    }
    Some(blocks)
}

fn classify(raw: &str) -> Line<'_> {
    let line = raw.strip_suffix('\r').unwrap_or(raw);
    if let Some(rest) = line.strip_prefix(';')
        && !rest.trim().is_empty()
    {
        return Line::Term(rest);
    }
    if let Some(rest) = line.strip_prefix(':')
        && !rest.trim().is_empty()
    {
        return Line::Definition(rest);
    }
    Line::Other
}

fn extract_terms(lines: &[&str]) -> Vec<Term> {
    lines
        .iter()
        .flat_map(|line| line.split(';'))
        .filter_map(|piece| Term::new(piece).ok())
        .collect()
}
