use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use glossary_annotate::{AnnotateOptions, Annotator};
use glossary_index::parse_glossary;

fn main() -> Result<()> {
    let mut args = env::args().skip(1);
    let usage = "usage: cargo run -p glossary-annotate --example annotate -- <glossary.wiki> <page.html> [--once]";
    let glossary = args.next().map(PathBuf::from).context(usage)?;
    let page = args.next().map(PathBuf::from).context(usage)?;
    let display_once = args.any(|a| a == "--once");

    let text = std::fs::read_to_string(&glossary)
        .with_context(|| format!("reading glossary source {}", glossary.display()))?;
    let html = std::fs::read_to_string(&page)
        .with_context(|| format!("reading page {}", page.display()))?;

    let index = parse_glossary(&text);
    let options = AnnotateOptions {
        display_once,
        ..AnnotateOptions::default()
    };
    let annotator = Annotator::new(&index, options);
    let out = annotator.annotate(&html);

    eprintln!(
        "{} terms, {} replacements (display once: {display_once})",
        annotator.rule_count(),
        out.replacements
    );
    println!("{}", out.html);
    Ok(())
}
