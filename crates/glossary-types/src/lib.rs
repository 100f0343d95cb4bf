//! Shared types for glossary annotation: terms, definition entries and the
//! tooltip markup they render to.
//!
//! A [`Term`] is a validated glossary key (trimmed, no line breaks, never
//! empty). A [`DefinitionEntry`] groups one or more alias terms under a single
//! definition and knows how to render itself as tooltip markup. [`EntryId`] is
//! the stable handle an index hands out for an entry.
//!
//! The markup produced here is a compatibility contract with the client-side
//! tooltip script, so the class name and attribute layout are fixed:
//!
//! ```rust
//! use glossary_types::{DefinitionEntry, Term, TooltipStyle};
//!
//! let entry = DefinitionEntry::new(vec![Term::new("foo").unwrap()], "a <b>thing</b>");
//! assert_eq!(
//!     entry.tooltip(None, TooltipStyle::Rich, true),
//!     r#"<span class="simple-terms-tooltip" role="tooltip" data-tippy-content="a thing">foo</span>"#
//! );
//! ```

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Class carried by every generated tooltip wrapper.
pub const TOOLTIP_CLASS: &str = "simple-terms-tooltip";

/// Class that opts a subtree out of annotation.
pub const EXCLUSION_CLASS: &str = "noglossary";

static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->|</?[A-Za-z!?][^>]*>").expect("valid tag pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TermError {
    #[error("term is empty after trimming")]
    Empty,
}

/// A glossary key. Case-sensitive; compared by exact text.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Term(String);

impl Term {
    /// Strip line breaks and surrounding whitespace, rejecting empty results.
    pub fn new(raw: &str) -> Result<Self, TermError> {
        let joined: String = raw.chars().filter(|c| !matches!(c, '\r' | '\n')).collect();
        let trimmed = joined.trim();
        if trimmed.is_empty() {
            return Err(TermError::Empty);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in characters, the unit used for the index's minimum length.
    pub fn char_len(&self) -> usize {
        self.0.chars().count()
    }
}

impl AsRef<str> for Term {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for Term {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Term {
    type Error = TermError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Term::new(&value)
    }
}

impl From<Term> for String {
    fn from(term: Term) -> Self {
        term.0
    }
}

/// Stable arena handle of an entry inside an index.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub usize);

/// Which attribute carries the definition in generated markup.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum TooltipStyle {
    /// `role="tooltip" data-tippy-content="..."`, picked up by the tooltip script.
    #[default]
    Rich,
    /// Browser-native `title="..."`; definition markup is always stripped.
    Plain,
}

impl TooltipStyle {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "rich" | "tippy" => Some(TooltipStyle::Rich),
            "plain" | "title" => Some(TooltipStyle::Plain),
            _ => None,
        }
    }
}

impl fmt::Display for TooltipStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TooltipStyle::Rich => "rich",
            TooltipStyle::Plain => "plain",
        })
    }
}

/// A group of alias terms sharing one definition.
///
/// Serializes as `{"terms": [...], "definition": "..."}`, the element shape
/// of the cached index blob.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DefinitionEntry {
    terms: Vec<Term>,
    definition: String,
}

impl DefinitionEntry {
    /// Duplicate aliases are collapsed, first occurrence wins.
    pub fn new(terms: Vec<Term>, definition: impl Into<String>) -> Self {
        let mut unique: Vec<Term> = Vec::with_capacity(terms.len());
        for term in terms {
            if !unique.contains(&term) {
                unique.push(term);
            }
        }
        Self {
            terms: unique,
            definition: definition.into(),
        }
    }

    /// Whether `term` (trimmed) is one of this entry's aliases.
    pub fn defines(&self, term: &str) -> bool {
        let needle = term.trim();
        self.terms.iter().any(|t| t.as_str() == needle)
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    pub fn definition(&self) -> &str {
        &self.definition
    }

    pub fn into_parts(self) -> (Vec<Term>, String) {
        (self.terms, self.definition)
    }

    pub(crate) fn first_term(&self) -> Option<&Term> {
        self.terms.first()
    }

    /// Drop one alias; returns whether it was present.
    pub fn remove_term(&mut self, term: &str) -> bool {
        let before = self.terms.len();
        self.terms.retain(|t| t.as_str() != term);
        before != self.terms.len()
    }

    /// Attribute-escaped definition text as it appears inside the wrapper.
    pub fn tooltip_payload(&self, style: TooltipStyle, strip: bool) -> String {
        let text = if strip || style == TooltipStyle::Plain {
            strip_tags(&self.definition)
        } else {
            self.definition.clone()
        };
        escape_attribute(&text)
    }

    /// Render the wrapper for `term`, falling back to the first alias.
    pub fn tooltip(&self, term: Option<&str>, style: TooltipStyle, strip: bool) -> String {
        let visible = term
            .or_else(|| self.first_term().map(Term::as_str))
            .unwrap_or_default();
        render_tooltip(
            style,
            &self.tooltip_payload(style, strip),
            &escape_text(visible),
        )
    }
}

/// Assemble the wrapper from an already escaped payload and visible HTML.
pub fn render_tooltip(style: TooltipStyle, payload: &str, visible_html: &str) -> String {
    match style {
        TooltipStyle::Rich => format!(
            r#"<span class="{TOOLTIP_CLASS}" role="tooltip" data-tippy-content="{payload}">{visible_html}</span>"#
        ),
        TooltipStyle::Plain => {
            format!(r#"<span class="{TOOLTIP_CLASS}" title="{payload}">{visible_html}</span>"#)
        }
    }
}

/// Remove comments and markup tags, keeping the text between them.
pub fn strip_tags(html: &str) -> String {
    TAG_PATTERN.replace_all(html, "").into_owned()
}

/// Escape text for use between tags.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    out
}

/// Escape text for use inside a double-quoted attribute.
pub fn escape_attribute(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    out
}
