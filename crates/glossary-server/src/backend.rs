//! Resolves the glossary index for the configured page and annotates pages with it.
//!
//! Lookup order is the in-process memo, then the [`IndexCache`], then the
//! page source. The memo keeps whatever index was built, even an empty one,
//! until [`GlossaryBackend::purge`]. Only non-empty indexes are written to the
//! cache, so after a purge a missing or malformed page is read again.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use glossary_annotate::{Annotated, Annotator, already_annotated};
use glossary_index::{DefinitionIndex, INDEX_VERSION, parse_glossary};
use tracing::{debug, info, warn};

use crate::cache::IndexCache;
use crate::config::{ConfigError, GlossaryConfig};
use crate::source::{ApprovedRevisions, SourceTextProvider, normalize_title};

/// A parsed index together with the annotator compiled from it.
pub struct Glossary {
    index: DefinitionIndex,
    annotator: Annotator,
}

impl Glossary {
    fn build(index: DefinitionIndex, config: &GlossaryConfig) -> Self {
        let annotator = Annotator::new(&index, config.annotate_options());
        Self { index, annotator }
    }

    pub fn index(&self) -> &DefinitionIndex {
        &self.index
    }

    pub fn annotator(&self) -> &Annotator {
        &self.annotator
    }
}

pub struct GlossaryBackend {
    config: GlossaryConfig,
    source: Arc<dyn SourceTextProvider>,
    approved: Option<Arc<dyn ApprovedRevisions>>,
    cache: Arc<dyn IndexCache>,
    loaded: RwLock<Option<Arc<Glossary>>>,
    rebuild: Mutex<()>,
}

impl GlossaryBackend {
    /// Fails when approved revisions are required but no lookup was supplied.
    pub fn new(
        config: GlossaryConfig,
        source: Arc<dyn SourceTextProvider>,
        approved: Option<Arc<dyn ApprovedRevisions>>,
        cache: Arc<dyn IndexCache>,
    ) -> Result<Self, ConfigError> {
        if config.approved_revisions && approved.is_none() {
            return Err(ConfigError::DependencyMissing("GLOSSARY_APPROVED_REVISIONS"));
        }
        Ok(Self {
            config,
            source,
            approved,
            cache,
            loaded: RwLock::new(None),
            rebuild: Mutex::new(()),
        })
    }

    pub fn cache_key() -> String {
        format!("glossary:definition-index:v{INDEX_VERSION}")
    }

    /// The current glossary, building it at most once across concurrent callers.
    pub fn glossary(&self) -> Arc<Glossary> {
        if let Some(glossary) = self.memo() {
            return glossary;
        }

        let _guard = self.rebuild.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(glossary) = self.memo() {
            return glossary;
        }

        let glossary = Arc::new(Glossary::build(self.load_index(), &self.config));
        *self.loaded.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&glossary));
        glossary
    }

    /// Drop the cached and memoized index; the next request rebuilds it.
    pub fn purge(&self) {
        let _guard = self.rebuild.lock().unwrap_or_else(PoisonError::into_inner);
        self.loaded
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let deleted = self.config.use_cache && self.cache.delete(&Self::cache_key());
        info!("glossary purged (cache entry deleted: {deleted})");
    }

    /// Purge when `title` names the glossary page; called on page save and page purge.
    pub fn purge_if_glossary_page(&self, title: &str) -> bool {
        match &self.config.page {
            Some(page) if normalize_title(page) == normalize_title(title) => {
                self.purge();
                true
            }
            _ => false,
        }
    }

    /// Annotate a rendered page of `namespace`.
    ///
    /// Pages outside the configured namespaces, pages rendered without a
    /// configured glossary and pages that already carry tooltips pass through
    /// unchanged.
    pub fn annotate(&self, namespace: i64, html: &str) -> Annotated {
        let unchanged = || Annotated {
            html: html.to_string(),
            replacements: 0,
        };
        if html.is_empty() || self.config.page.is_none() {
            return unchanged();
        }
        if !self.config.allows_namespace(namespace) {
            debug!("namespace {namespace} is not annotated");
            return unchanged();
        }
        if already_annotated(html) {
            debug!("page already carries glossary tooltips");
            return unchanged();
        }
        self.glossary().annotator().annotate(html)
    }

    fn memo(&self) -> Option<Arc<Glossary>> {
        self.loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn load_index(&self) -> DefinitionIndex {
        let key = Self::cache_key();
        if self.config.use_cache
            && let Some(bytes) = self.cache.get(&key)
        {
            match DefinitionIndex::from_bytes(&bytes) {
                Ok(index) => {
                    debug!("glossary index loaded from {} cache", self.cache.name());
                    return index;
                }
                Err(err) => warn!("discarding cached glossary index: {err}"),
            }
        }

        let start = Instant::now();
        let index = parse_glossary(&self.source_text());
        info!(
            "glossary index built in {} ms ({} entries, {} terms)",
            start.elapsed().as_millis(),
            index.size(),
            index.term_count()
        );

        if self.config.use_cache && !index.is_empty() {
            match index.to_bytes() {
                Ok(bytes) => {
                    if !self.cache.set(&key, bytes, self.config.cache_expiry) {
                        debug!("{} cache did not store the glossary index", self.cache.name());
                    }
                }
                Err(err) => warn!("could not encode glossary index: {err}"),
            }
        }
        index
    }

    /// Source text of the glossary page; every failure reads as empty text.
    fn source_text(&self) -> String {
        let Some(page) = self.config.page.as_deref() else {
            return String::new();
        };

        let text = match (&self.approved, self.config.approved_revisions) {
            (Some(approved), true) => approved.approved_text(page).map(Option::unwrap_or_default),
            _ => self.source.current_text(page),
        };
        text.unwrap_or_else(|err| {
            warn!("glossary page {page:?} is unavailable: {err}");
            String::new()
        })
    }
}
