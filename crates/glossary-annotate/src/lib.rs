//! Glossary annotation for rendered HTML.
//!
//! The annotator walks the text nodes of a fragment and wraps every
//! occurrence of a glossary term in tooltip markup carrying its definition.
//! It leaves links, scripts, raw-text elements, configured element types and
//! any subtree marked with the exclusion class untouched.
//!
//! # How it works
//! 1. Compile one rule per term, in index order. A rule matches the literal
//!    term unless a closing `</span>` follows later on the same line of the
//!    text being rewritten, so generated markup is never wrapped twice.
//!    Matches starting inside a generated tag or an entity are skipped.
//! 2. Parse the fragment tolerantly and collect eligible text nodes.
//! 3. Skip nodes shorter than the index's shortest term, then run every
//!    active rule over the node's text. In display-once mode a rule that
//!    fired is retired for the rest of the document.
//! 4. Re-parse each rewritten text as markup and splice the new nodes in,
//!    all at once after the walk.
//!
//! Matching is substring based: a term also matches inside a longer word.
//!
//! # Example
//! ```
//! use glossary_annotate::{AnnotateOptions, Annotator};
//! use glossary_index::parse_glossary;
//!
//! let index = parse_glossary("; foo\n; bar\n: a thing\n");
//! let annotator = Annotator::new(&index, AnnotateOptions::default());
//! let out = annotator.annotate("<p>A foo is here</p>");
//! assert_eq!(out.replacements, 1);
//! assert!(out.html.contains(r#"data-tippy-content="a thing">foo</span>"#));
//! ```
//!
//! For a runnable demo, see `cargo run -p glossary-annotate --example annotate -- <glossary.wiki> <page.html>`.

mod dom;

use std::collections::BTreeSet;

use fancy_regex::Regex;
use glossary_index::DefinitionIndex;
use glossary_types::{
    EXCLUSION_CLASS, TOOLTIP_CLASS, Term, TooltipStyle, escape_text, render_tooltip,
};
use tracing::{debug, warn};

use crate::dom::{Exclusions, Fragment, replace_node, text_of};

/// Knobs for a single annotator.
#[derive(Clone, Debug)]
pub struct AnnotateOptions {
    /// Wrap each term at most once per document.
    pub display_once: bool,
    /// Keep markup inside rich tooltip payloads instead of stripping it.
    pub allow_html: bool,
    pub tooltip_style: TooltipStyle,
    /// Element names (lowercase) whose subtrees are never annotated.
    pub disabled_elements: BTreeSet<String>,
    /// Class token that opts a subtree out of annotation.
    pub exclusion_class: String,
}

impl Default for AnnotateOptions {
    fn default() -> Self {
        Self {
            display_once: false,
            allow_html: false,
            tooltip_style: TooltipStyle::Rich,
            disabled_elements: BTreeSet::new(),
            exclusion_class: EXCLUSION_CLASS.to_string(),
        }
    }
}

/// Rewritten fragment plus the number of wrapped occurrences.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Annotated {
    pub html: String,
    pub replacements: usize,
}

impl Annotated {
    fn unchanged(html: &str) -> Self {
        Self {
            html: html.to_string(),
            replacements: 0,
        }
    }
}

struct Rule {
    term: Term,
    pattern: Regex,
    payload: String,
}

/// Compiled replacement rules for one index.
///
/// Holds no per-document state, so one annotator can serve any number of
/// concurrent `annotate` calls.
pub struct Annotator {
    rules: Vec<Rule>,
    min_term_len: usize,
    options: AnnotateOptions,
}

impl Annotator {
    pub fn new(index: &DefinitionIndex, options: AnnotateOptions) -> Self {
        let strip = !options.allow_html;
        let mut rules = Vec::with_capacity(index.term_count());
        for (term, entry) in index.term_entries() {
            let source = format!(
                "{}(?!.*?</span>)",
                fancy_regex::escape(&escape_text(term.as_str()))
            );
            match Regex::new(&source) {
                Ok(pattern) => rules.push(Rule {
                    term: term.clone(),
                    pattern,
                    payload: entry.tooltip_payload(options.tooltip_style, strip),
                }),
                Err(err) => warn!("skipping term {term:?}: {err}"),
            }
        }
        debug!("compiled {} annotation rules", rules.len());

        Self {
            rules,
            min_term_len: index.min_term_length(),
            options,
        }
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Wrap glossary terms found in `html`.
    ///
    /// Returns the input untouched with a zero count when there is nothing to
    /// do or nothing matched.
    pub fn annotate(&self, html: &str) -> Annotated {
        if html.is_empty() || self.rules.is_empty() {
            return Annotated::unchanged(html);
        }
        let Some(fragment) = Fragment::parse(html) else {
            warn!("parsed fragment has no body; leaving it untouched");
            return Annotated::unchanged(html);
        };

        let exclusions = Exclusions {
            class: &self.options.exclusion_class,
            elements: &self.options.disabled_elements,
        };
        let nodes = exclusions.eligible_text_nodes(fragment.body());

        let limit = self.options.display_once.then_some(1);
        let mut active: Vec<&Rule> = self.rules.iter().collect();
        let mut rewrites = Vec::new();
        let mut replacements = 0usize;

        for node in nodes {
            if active.is_empty() {
                break;
            }
            let Some(text) = text_of(&node) else {
                continue;
            };
            if text == " " || text.chars().count() < self.min_term_len {
                continue;
            }

            let mut working = escape_text(&text);
            let mut node_hits = 0usize;
            let mut idx = 0;
            while idx < active.len() {
                let rule = active[idx];
                if let Some((rewritten, hits)) =
                    rule.apply(&working, self.options.tooltip_style, limit)
                {
                    working = rewritten;
                    node_hits += hits;
                    if self.options.display_once {
                        active.remove(idx);
                        continue;
                    }
                }
                idx += 1;
            }

            if node_hits > 0 {
                replacements += node_hits;
                rewrites.push((node, working));
            }
        }

        if replacements == 0 {
            return Annotated::unchanged(html);
        }

        for (node, markup) in rewrites {
            let nodes = Fragment::parse(&markup)
                .map(Fragment::into_children)
                .unwrap_or_default();
            if !replace_node(&node, nodes) {
                warn!("text node vanished before it could be rewritten");
            }
        }

        match fragment.to_html() {
            Ok(out) => {
                debug!("wrapped {replacements} glossary terms");
                Annotated {
                    html: out,
                    replacements,
                }
            }
            Err(err) => {
                warn!("failed to serialize annotated fragment: {err}");
                Annotated::unchanged(html)
            }
        }
    }
}

impl Rule {
    /// Wrap matches in `text`, at most `limit` of them. `None` when nothing matched.
    fn apply(&self, text: &str, style: TooltipStyle, limit: Option<usize>) -> Option<(String, usize)> {
        let mut out = String::with_capacity(text.len());
        let mut last = 0usize;
        let mut hits = 0usize;

        for found in self.pattern.find_iter(text) {
            let m = match found {
                Ok(m) => m,
                Err(err) => {
                    warn!("matching {:?} stopped: {err}", self.term);
                    break;
                }
            };
            // Escaped text only contains `&` as the start of an entity and
            // `<` as the start of a generated tag.
            if splits_entity(text, m.start()) || inside_tag(text, m.start()) {
                continue;
            }
            out.push_str(&text[last..m.start()]);
            out.push_str(&render_tooltip(style, &self.payload, m.as_str()));
            last = m.end();
            hits += 1;
            if limit.is_some_and(|max| hits >= max) {
                break;
            }
        }

        if hits == 0 {
            return None;
        }
        out.push_str(&text[last..]);
        Some((out, hits))
    }
}

fn splits_entity(text: &str, start: usize) -> bool {
    let Some(amp) = text[..start].rfind('&') else {
        return false;
    };
    let name = &text.as_bytes()[amp + 1..];
    let name_len = name
        .iter()
        .take_while(|b| b.is_ascii_alphanumeric() || **b == b'#')
        .count();
    name.get(name_len) == Some(&b';') && start <= amp + 1 + name_len
}

fn inside_tag(text: &str, start: usize) -> bool {
    let before = &text[..start];
    match (before.rfind('<'), before.rfind('>')) {
        (Some(open), Some(close)) => open > close,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

/// Whether `html` already carries generated tooltip markup.
pub fn already_annotated(html: &str) -> bool {
    html.contains(TOOLTIP_CLASS)
}

/// Wrap `inner_html` in a container the annotator will not touch.
pub fn no_glossary_block(inner_html: &str) -> String {
    format!(r#"<div class="{EXCLUSION_CLASS}">{inner_html}</div>"#)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glossary_index::parse_glossary;

    const TIP_FOO: &str =
        r#"<span class="simple-terms-tooltip" role="tooltip" data-tippy-content="a thing">foo</span>"#;

    fn annotator(source: &str, options: AnnotateOptions) -> Annotator {
        Annotator::new(&parse_glossary(source), options)
    }

    fn once() -> AnnotateOptions {
        AnnotateOptions {
            display_once: true,
            ..AnnotateOptions::default()
        }
    }

    #[test]
    fn wraps_term_in_paragraph() {
        let out = annotator("; foo\n; bar\n: a thing\n", AnnotateOptions::default())
            .annotate("<p>A foo is here</p>");
        assert_eq!(out.replacements, 1);
        assert_eq!(out.html, format!("<p>A {TIP_FOO} is here</p>"));
    }

    #[test]
    fn empty_index_is_a_no_op() {
        let ann = annotator("not a glossary", AnnotateOptions::default());
        assert_eq!(ann.rule_count(), 0);
        let input = "<p>foo <b>unclosed";
        let out = ann.annotate(input);
        assert_eq!(out, Annotated::unchanged(input));
    }

    #[test]
    fn unmatched_input_is_returned_verbatim() {
        let input = "<P>nothing   to see</P>";
        let out = annotator("; foo\n: a thing\n", AnnotateOptions::default()).annotate(input);
        assert_eq!(out.replacements, 0);
        assert_eq!(out.html, input);
    }

    #[test]
    fn never_wraps_inside_links() {
        let out = annotator("; foo\n: a thing\n", AnnotateOptions::default())
            .annotate(r#"<p><a href="/foo">the foo page</a></p>"#);
        assert_eq!(out.replacements, 0);
    }

    #[test]
    fn never_wraps_inside_excluded_subtree() {
        let ann = annotator("; foo\n: a thing\n", AnnotateOptions::default());
        let out = ann.annotate(&format!(
            "{}<p>foo</p>",
            no_glossary_block("<p>a foo <i>and foo</i></p>")
        ));
        assert_eq!(out.replacements, 1);
        assert!(out.html.starts_with(r#"<div class="noglossary"><p>a foo <i>and foo</i></p></div>"#));
    }

    #[test]
    fn display_once_wraps_a_single_occurrence_per_document() {
        let input = "<p>foo one</p><p>foo two</p>";
        let out = annotator("; foo\n: a thing\n", once()).annotate(input);
        assert_eq!(out.replacements, 1);
        assert_eq!(out.html, format!("<p>{TIP_FOO} one</p><p>foo two</p>"));
    }

    #[test]
    fn without_display_once_every_occurrence_is_wrapped() {
        let input = "<p>foo one</p><p>foo two foo</p>";
        let out = annotator("; foo\n: a thing\n", AnnotateOptions::default()).annotate(input);
        assert_eq!(out.replacements, 3);
        assert_eq!(out.html.matches(TOOLTIP_CLASS).count(), 3);
    }

    #[test]
    fn nodes_below_min_length_are_never_scanned() {
        let mut ann = annotator("; foo\n: a thing\n", AnnotateOptions::default());
        assert_eq!(ann.annotate("<p>foo here</p>").replacements, 1);
        ann.min_term_len = 10;
        let out = ann.annotate("<p>foo here</p><p>and a foo over there</p>");
        assert_eq!(out.replacements, 1);
        assert!(out.html.starts_with("<p>foo here</p>"));
    }

    #[test]
    fn shortest_term_still_matches_its_own_node() {
        let ann = annotator("; ab\n: short\n; abcdef\n: long\n", AnnotateOptions::default());
        assert_eq!(ann.annotate("<p>ab</p><p> </p>").replacements, 1);
    }

    #[test]
    fn earlier_term_claims_overlapping_text() {
        let out = annotator("; Style\n: first\n; Style Sheets\n: second\n", AnnotateOptions::default())
            .annotate("<p>Style Sheets</p>");
        assert_eq!(out.replacements, 1);
        assert!(out.html.contains(r#"data-tippy-content="first">Style</span> Sheets"#));
    }

    #[test]
    fn text_before_generated_span_is_left_alone() {
        // The guard looks for any later `</span>` on the line.
        let out = annotator("; foo\n: a thing\n; bar\n: b thing\n", AnnotateOptions::default())
            .annotate("<p>bar foo</p>");
        assert_eq!(out.replacements, 1);
        assert!(out.html.starts_with("<p>bar <span"));
    }

    #[test]
    fn generated_tags_are_never_matched() {
        let ann = annotator(
            "; foo\n: a thing\n; span\n: an inline element\n",
            AnnotateOptions::default(),
        );
        let out = ann.annotate("<p>foo</p>");
        assert_eq!(out.replacements, 1);
        assert_eq!(out.html, format!("<p>{TIP_FOO}</p>"));

        let out = ann.annotate("<p>foo and span</p>");
        assert_eq!(out.replacements, 2);
        assert_eq!(
            out.html,
            format!(
                r#"<p>{TIP_FOO} and <span class="simple-terms-tooltip" role="tooltip" data-tippy-content="an inline element">span</span></p>"#
            )
        );
    }

    #[test]
    fn matches_inside_longer_words() {
        let out = annotator("; cat\n: feline\n", AnnotateOptions::default()).annotate("<p>concatenate</p>");
        assert_eq!(out.replacements, 1);
    }

    #[test]
    fn keeps_escaping_and_entities_intact() {
        let out = annotator("; R&D\n: research\n; amp\n: volts\n", AnnotateOptions::default())
            .annotate("<p>R&amp;D &lt;3 amp</p>");
        assert_eq!(out.replacements, 2);
        assert!(out.html.contains(r#"data-tippy-content="research">R&amp;D</span>"#));
        assert!(out.html.contains("&lt;3"));
        assert!(out.html.contains(r#"data-tippy-content="volts">amp</span>"#));
    }

    #[test]
    fn strips_payload_markup_unless_allowed() {
        let source = "; foo\n: a <b>bold</b> thing\n";
        let ann = annotator(source, AnnotateOptions::default());
        assert_eq!(ann.rules[0].payload, "a bold thing");
        let out = ann.annotate("<p>foo</p>");
        assert!(out.html.contains(r#"data-tippy-content="a bold thing""#));

        let allowed = AnnotateOptions {
            allow_html: true,
            ..AnnotateOptions::default()
        };
        let ann = annotator(source, allowed);
        assert_eq!(ann.rules[0].payload, "a &lt;b&gt;bold&lt;/b&gt; thing");
        // Plain tooltips cannot render markup.
        let plain = AnnotateOptions {
            allow_html: true,
            tooltip_style: TooltipStyle::Plain,
            ..AnnotateOptions::default()
        };
        assert_eq!(annotator(source, plain).rules[0].payload, "a bold thing");
    }

    #[test]
    fn plain_style_uses_title_attribute() {
        let options = AnnotateOptions {
            tooltip_style: TooltipStyle::Plain,
            ..AnnotateOptions::default()
        };
        let out = annotator("; foo\n: a thing\n", options).annotate("<p>foo</p>");
        assert_eq!(
            out.html,
            r#"<p><span class="simple-terms-tooltip" title="a thing">foo</span></p>"#
        );
    }

    #[test]
    fn skips_scripts_and_disabled_elements() {
        let options = AnnotateOptions {
            disabled_elements: BTreeSet::from(["code".to_string()]),
            ..AnnotateOptions::default()
        };
        let out = annotator("; foo\n: a thing\n", options)
            .annotate("<script>var foo = 1;</script><code>foo()</code><p>foo</p>");
        assert_eq!(out.replacements, 1);
        assert!(out.html.contains("<script>var foo = 1;</script><code>foo()</code>"));
    }

    #[test]
    fn output_is_recognisably_annotated() {
        let ann = annotator("; foo\n: a thing\n", AnnotateOptions::default());
        assert!(!already_annotated("<p>foo and more</p>"));
        let first = ann.annotate("<p>foo and more</p>");
        assert!(already_annotated(&first.html));
    }

    #[test]
    fn malformed_markup_is_recovered() {
        let out = annotator("; foo\n: a thing\n", AnnotateOptions::default())
            .annotate("<div><p>foo<span>bar</div></b>");
        assert_eq!(out.replacements, 1);
        assert!(out.html.contains(TIP_FOO));
    }
}
