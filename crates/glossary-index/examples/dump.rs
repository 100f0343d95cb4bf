use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use glossary_index::{INDEX_VERSION, parse_glossary};

fn main() -> Result<()> {
    let source = env::args()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: cargo run -p glossary-index --example dump -- <glossary.wiki>")?;

    let text = std::fs::read_to_string(&source)
        .with_context(|| format!("reading glossary source {}", source.display()))?;
    let index = parse_glossary(&text);

    println!("Source       : {}", source.display());
    println!("Entries      : {}", index.size());
    println!("Terms        : {}", index.term_count());
    println!("Min term len : {}", index.min_term_length());

    for (id, entry) in index.entries() {
        let aliases: Vec<&str> = entry.terms().iter().map(|t| t.as_str()).collect();
        println!("  #{:<3} {} => {}", id.0, aliases.join(" | "), entry.definition());
    }

    let blob = index.to_bytes()?;
    println!("Cache blob (v{INDEX_VERSION}): {} bytes", blob.len());

    Ok(())
}
