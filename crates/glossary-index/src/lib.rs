//! In-memory glossary index built from loosely structured wiki text.
//!
//! [`DefinitionIndex`] maps every alias [`Term`] to a stable [`EntryId`] in an
//! arena of [`DefinitionEntry`] values. Entries are only ever added through
//! [`DefinitionIndex::add_entry`]: adding an entry whose aliases overlap an
//! existing one replaces that entry in place, keeping its handle. The index
//! also tracks the shortest registered term so annotators can skip text that
//! is too short to hold any term.
//!
//! [`parse_glossary`] builds an index from source text made of
//! `; term` / `: definition` blocks. Malformed text never fails; it simply
//! produces an empty index.
//!
//! # Example
//! ```
//! use glossary_index::{DefinitionIndex, parse_glossary};
//!
//! # fn main() -> Result<(), glossary_index::IndexError> {
//! let index = parse_glossary("; foo\n; bar\n: a thing\n");
//! assert_eq!(index.size(), 1);
//! assert_eq!(index.lookup("bar").map(|e| e.definition()), Some("a thing"));
//!
//! let bytes = index.to_bytes()?;
//! let restored = DefinitionIndex::from_bytes(&bytes)?;
//! assert_eq!(restored.min_term_length(), 3);
//! # Ok(()) }
//! ```
//!
//! For a runnable demo, see `cargo run -p glossary-index --example dump -- <glossary.wiki>`.

mod parser;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub use glossary_types::{DefinitionEntry, EntryId, Term};
pub use parser::{parse_glossary, parse_into};

/// Bumped whenever the cached blob layout changes; part of the cache key.
pub const INDEX_VERSION: u32 = 1;

/// Minimum term length reported by an index without terms.
pub const EMPTY_MIN_TERM_LENGTH: usize = 1000;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("\"{0}\" does not exist")]
    NotFound(String),
    #[error("failed to decode cached index: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("failed to encode index: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Term to entry mapping with insertion-ordered terms and stable entry handles.
#[derive(Debug, Clone)]
pub struct DefinitionIndex {
    terms: IndexMap<Term, EntryId>,
    entries: Vec<Option<DefinitionEntry>>,
    live: usize,
    min_term_len: usize,
}

#[derive(Serialize)]
struct SerializedIndexRef<'a> {
    terms: &'a IndexMap<Term, EntryId>,
    elements: Vec<&'a DefinitionEntry>,
}

/// The `terms` map of a blob is derived data; decoding rebuilds it from `elements`.
#[derive(Deserialize)]
struct SerializedIndex {
    elements: Vec<DefinitionEntry>,
}

impl Default for DefinitionIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl DefinitionIndex {
    pub fn new() -> Self {
        Self {
            terms: IndexMap::new(),
            entries: Vec::new(),
            live: 0,
            min_term_len: EMPTY_MIN_TERM_LENGTH,
        }
    }

    /// Add an entry, or replace the entry any of `terms` already belongs to.
    ///
    /// Returns `None` when `terms` is empty, since an entry needs at least one alias.
    pub fn add_entry<I>(&mut self, terms: I, definition: impl Into<String>) -> Option<EntryId>
    where
        I: IntoIterator<Item = Term>,
    {
        self.add(DefinitionEntry::new(terms.into_iter().collect(), definition))
    }

    /// Same as [`DefinitionIndex::add_entry`] for a prebuilt entry.
    pub fn add(&mut self, entry: DefinitionEntry) -> Option<EntryId> {
        if entry.term_count() == 0 {
            return None;
        }
        if entry.terms().iter().any(|t| self.terms.contains_key(t)) {
            return self.replace_entry(entry);
        }

        let id = EntryId(self.entries.len());
        for term in entry.terms() {
            self.terms.insert(term.clone(), id);
            self.min_term_len = self.min_term_len.min(term.char_len());
        }
        self.entries.push(Some(entry));
        self.live += 1;
        Some(id)
    }

    /// Put `entry` into the slot of the first existing entry sharing one of its terms.
    ///
    /// The old entry's aliases are unmapped. Other entries that lose aliases to
    /// `entry` keep their handle, or disappear when no alias is left. Falls back
    /// to a plain append when nothing overlaps.
    pub fn replace_entry(&mut self, entry: DefinitionEntry) -> Option<EntryId> {
        let Some(target) = self
            .terms
            .iter()
            .find(|(term, _)| entry.terms().contains(term))
            .map(|(_, id)| *id)
        else {
            return self.add(entry);
        };

        let mut displaced: Vec<EntryId> = Vec::new();
        for term in entry.terms() {
            if let Some(id) = self.terms.get(term).copied()
                && id != target
                && !displaced.contains(&id)
            {
                displaced.push(id);
            }
        }

        if let Some(old) = self.entries[target.0].take() {
            for term in old.terms() {
                self.terms.shift_remove(term.as_str());
            }
        }

        for id in displaced {
            if let Some(slot) = self.entries.get_mut(id.0)
                && let Some(other) = slot.as_mut()
            {
                for term in entry.terms() {
                    if other.remove_term(term.as_str()) {
                        self.terms.shift_remove(term.as_str());
                    }
                }
                if other.term_count() == 0 {
                    debug!("entry {} lost its last alias during replace", id.0);
                    *slot = None;
                    self.live -= 1;
                }
            }
        }

        for term in entry.terms() {
            self.terms.insert(term.clone(), target);
        }
        debug!(
            "replaced entry {} with {} aliases",
            target.0,
            entry.term_count()
        );
        self.entries[target.0] = Some(entry);
        self.recompute_min_len();
        Some(target)
    }

    /// Unmap one term; the owning entry goes away with its last alias.
    pub fn remove_term(&mut self, term: &str) -> Result<(), IndexError> {
        let key = term.trim();
        let Some(id) = self.terms.shift_remove(key) else {
            return Err(IndexError::NotFound(key.to_string()));
        };

        if let Some(slot) = self.entries.get_mut(id.0)
            && let Some(entry) = slot.as_mut()
        {
            entry.remove_term(key);
            if entry.term_count() == 0 {
                *slot = None;
                self.live -= 1;
            }
        }
        self.recompute_min_len();
        Ok(())
    }

    /// Trimmed exact-match lookup.
    pub fn lookup(&self, term: &str) -> Option<&DefinitionEntry> {
        let id = self.terms.get(term.trim())?;
        self.get(*id)
    }

    pub fn can_define(&self, term: &str) -> bool {
        self.terms.contains_key(term.trim())
    }

    pub fn get(&self, id: EntryId) -> Option<&DefinitionEntry> {
        self.entries.get(id.0).and_then(Option::as_ref)
    }

    /// Terms in index-map order: insertion order, with replaced aliases moved to the end.
    pub fn all_terms(&self) -> impl Iterator<Item = &Term> {
        self.terms.keys()
    }

    /// Terms paired with the entry each one maps to, in [`DefinitionIndex::all_terms`] order.
    pub fn term_entries(&self) -> impl Iterator<Item = (&Term, &DefinitionEntry)> {
        self.terms
            .iter()
            .filter_map(|(term, id)| self.get(*id).map(|entry| (term, entry)))
    }

    /// Live entries in handle order.
    pub fn entries(&self) -> impl Iterator<Item = (EntryId, &DefinitionEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|entry| (EntryId(idx), entry)))
    }

    pub fn min_term_length(&self) -> usize {
        self.min_term_len
    }

    /// Number of entries, not terms.
    pub fn size(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    /// Encode as the flat `{terms, elements}` JSON blob used for caching.
    pub fn to_bytes(&self) -> Result<Vec<u8>, IndexError> {
        let flat = SerializedIndexRef {
            terms: &self.terms,
            elements: self.entries().map(|(_, entry)| entry).collect(),
        };
        serde_json::to_vec(&flat).map_err(IndexError::Encode)
    }

    /// Rebuild an index by replaying every cached element through [`DefinitionIndex::add`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IndexError> {
        let mut index = Self::new();
        index.extend_from_bytes(bytes)?;
        Ok(index)
    }

    /// Replay cached elements into this index, returning how many were applied.
    ///
    /// Applying the same blob twice is harmless: every element overlaps its
    /// earlier copy and replaces it in place.
    pub fn extend_from_bytes(&mut self, bytes: &[u8]) -> Result<usize, IndexError> {
        let data: SerializedIndex = serde_json::from_slice(bytes).map_err(IndexError::Decode)?;
        let mut applied = 0usize;
        for element in data.elements {
            let (terms, definition) = element.into_parts();
            if self.add_entry(terms, definition).is_some() {
                applied += 1;
            }
        }
        Ok(applied)
    }

    fn recompute_min_len(&mut self) {
        self.min_term_len = self
            .terms
            .keys()
            .map(Term::char_len)
            .min()
            .unwrap_or(EMPTY_MIN_TERM_LENGTH);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn terms(raw: &[&str]) -> Vec<Term> {
        raw.iter().map(|t| Term::new(t).unwrap()).collect()
    }

    fn term_set(index: &DefinitionIndex) -> BTreeSet<String> {
        index.all_terms().map(|t| t.to_string()).collect()
    }

    #[test]
    fn empty_index_reports_sentinel() {
        let index = DefinitionIndex::new();
        assert_eq!(index.size(), 0);
        assert!(index.is_empty());
        assert_eq!(index.min_term_length(), EMPTY_MIN_TERM_LENGTH);
        assert!(index.lookup("anything").is_none());
    }

    #[test]
    fn adds_entries_and_tracks_min_length() {
        let mut index = DefinitionIndex::new();
        let first = index.add_entry(terms(&["glossary", "lexicon"]), "word list");
        let second = index.add_entry(terms(&["api"]), "interface");
        assert_eq!(first, Some(EntryId(0)));
        assert_eq!(second, Some(EntryId(1)));
        assert_eq!(index.size(), 2);
        assert_eq!(index.term_count(), 3);
        assert_eq!(index.min_term_length(), 3);
        assert!(index.can_define("  lexicon "));
        assert_eq!(index.lookup("api").unwrap().definition(), "interface");
    }

    #[test]
    fn rejects_entries_without_terms() {
        let mut index = DefinitionIndex::new();
        assert_eq!(index.add_entry(Vec::new(), "nothing"), None);
        assert!(index.is_empty());
    }

    #[test]
    fn overlapping_add_replaces_in_place() {
        let mut index = DefinitionIndex::new();
        index.add_entry(terms(&["foo", "bar"]), "old");
        index.add_entry(terms(&["baz"]), "other");
        let id = index.add_entry(terms(&["bar", "qux"]), "new");

        assert_eq!(id, Some(EntryId(0)));
        assert_eq!(index.size(), 2);
        assert!(!index.can_define("foo"));
        assert_eq!(index.lookup("bar").unwrap().definition(), "new");
        assert_eq!(index.lookup("qux").unwrap().definition(), "new");
        assert_eq!(index.get(EntryId(0)).unwrap().term_count(), 2);
        let order: Vec<&str> = index.all_terms().map(Term::as_str).collect();
        assert_eq!(order, vec!["baz", "bar", "qux"]);
    }

    #[test]
    fn replace_spanning_two_entries_drops_emptied_one() {
        let mut index = DefinitionIndex::new();
        index.add_entry(terms(&["a1"]), "first");
        index.add_entry(terms(&["b1", "b2"]), "second");
        index.add_entry(terms(&["c1"]), "third");
        index.add_entry(terms(&["a1", "c1"]), "merged");

        assert_eq!(index.size(), 2);
        assert_eq!(index.lookup("c1").unwrap().definition(), "merged");
        assert_eq!(index.lookup("b2").unwrap().definition(), "second");
        assert!(index.get(EntryId(2)).is_none());
    }

    #[test]
    fn remove_term_decrements_then_drops_entry() {
        let mut index = DefinitionIndex::new();
        index.add_entry(terms(&["ab", "abcdef"]), "letters");
        index.remove_term("ab").unwrap();
        assert_eq!(index.size(), 1);
        assert_eq!(index.min_term_length(), 6);
        assert_eq!(index.lookup("abcdef").unwrap().term_count(), 1);

        index.remove_term("abcdef").unwrap();
        assert_eq!(index.size(), 0);
        assert_eq!(index.min_term_length(), EMPTY_MIN_TERM_LENGTH);

        let err = index.remove_term("abcdef").unwrap_err();
        assert!(matches!(err, IndexError::NotFound(ref t) if t == "abcdef"));
    }

    #[test]
    fn round_trips_through_bytes() {
        let mut index = DefinitionIndex::new();
        index.add_entry(terms(&["foo", "bar"]), "a thing");
        index.add_entry(terms(&["quux"]), "a <b>bold</b> thing");
        index.add_entry(terms(&["zz"]), "short");
        index.remove_term("zz").unwrap();

        let bytes = index.to_bytes().unwrap();
        let restored = DefinitionIndex::from_bytes(&bytes).unwrap();

        assert_eq!(term_set(&restored), term_set(&index));
        assert_eq!(restored.min_term_length(), index.min_term_length());
        assert_eq!(restored.size(), index.size());
        for term in index.all_terms() {
            assert_eq!(
                restored.lookup(term.as_str()).map(DefinitionEntry::definition),
                index.lookup(term.as_str()).map(DefinitionEntry::definition)
            );
        }
    }

    #[test]
    fn blob_has_flat_shape() {
        let mut index = DefinitionIndex::new();
        index.add_entry(terms(&["foo", "bar"]), "a thing");
        let value: serde_json::Value = serde_json::from_slice(&index.to_bytes().unwrap()).unwrap();
        assert_eq!(value["terms"]["foo"], 0);
        assert_eq!(value["terms"]["bar"], 0);
        assert_eq!(value["elements"][0]["terms"][1], "bar");
        assert_eq!(value["elements"][0]["definition"], "a thing");
    }

    #[test]
    fn decoding_ignores_element_order() {
        let forward = br#"{"terms":{},"elements":[
            {"terms":["alpha"],"definition":"one"},
            {"terms":["beta","be"],"definition":"two"}]}"#;
        let reversed = br#"{"elements":[
            {"terms":["beta","be"],"definition":"two"},
            {"terms":["alpha"],"definition":"one"}]}"#;
        let a = DefinitionIndex::from_bytes(forward).unwrap();
        let b = DefinitionIndex::from_bytes(reversed).unwrap();
        assert_eq!(term_set(&a), term_set(&b));
        assert_eq!(a.min_term_length(), 2);
        assert_eq!(b.min_term_length(), 2);
        assert_eq!(a.lookup("be"), b.lookup("be"));
    }

    #[test]
    fn replaying_a_blob_twice_collapses() {
        let mut index = DefinitionIndex::new();
        index.add_entry(terms(&["foo", "bar"]), "a thing");
        let bytes = index.to_bytes().unwrap();

        let mut restored = DefinitionIndex::from_bytes(&bytes).unwrap();
        assert_eq!(restored.extend_from_bytes(&bytes).unwrap(), 1);
        assert_eq!(restored.size(), 1);
        assert_eq!(restored.term_count(), 2);
    }

    #[test]
    fn malformed_blob_is_a_decode_error() {
        let err = DefinitionIndex::from_bytes(b"{\"elements\": 3}").unwrap_err();
        assert!(matches!(err, IndexError::Decode(_)));
        let err = DefinitionIndex::from_bytes(br#"{"elements":[{"terms":[" "],"definition":"x"}]}"#)
            .unwrap_err();
        assert!(matches!(err, IndexError::Decode(_)));
    }
}
