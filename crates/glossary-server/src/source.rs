use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("\"{0}\" is not a valid page title")]
    InvalidTitle(String),
    #[error("failed to read page {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Current text of a page. A missing page reads as empty text.
pub trait SourceTextProvider: Send + Sync {
    fn current_text(&self, page: &str) -> Result<String, SourceError>;
}

/// Text of a page's approved revision, `None` when nothing is approved.
pub trait ApprovedRevisions: Send + Sync {
    fn approved_text(&self, page: &str) -> Result<Option<String>, SourceError>;
}

/// Canonical form of a page title: single spaces, first letter upper case.
pub fn normalize_title(title: &str) -> String {
    let spaced = title.replace('_', " ");
    let collapsed = spaced.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// File name a title is stored under, e.g. `Project:Glossary_terms.wiki`.
pub fn page_file_name(title: &str) -> Result<String, SourceError> {
    let normalized = normalize_title(title);
    if normalized.is_empty()
        || normalized.contains(['/', '\\', '\0'])
        || normalized.contains("..")
    {
        return Err(SourceError::InvalidTitle(title.to_string()));
    }
    Ok(format!("{}.wiki", normalized.replace(' ', "_")))
}

/// Pages stored as `<root>/<Title>.wiki` files.
#[derive(Clone, Debug)]
pub struct FilePages {
    root: PathBuf,
}

impl FilePages {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, title: &str) -> Result<PathBuf, SourceError> {
        Ok(self.root.join(page_file_name(title)?))
    }
}

impl SourceTextProvider for FilePages {
    fn current_text(&self, page: &str) -> Result<String, SourceError> {
        let path = self.path_for(page)?;
        read_optional(&path).map(Option::unwrap_or_default)
    }
}

/// Approved revisions stored beside the current ones, under `<root>/approved/`.
#[derive(Clone, Debug)]
pub struct ApprovedFilePages {
    pages: FilePages,
}

impl ApprovedFilePages {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            pages: FilePages::new(root.into().join("approved")),
        }
    }
}

impl ApprovedRevisions for ApprovedFilePages {
    fn approved_text(&self, page: &str) -> Result<Option<String>, SourceError> {
        let path = self.pages.path_for(page)?;
        read_optional(&path)
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, SourceError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!("page file {} does not exist", path.display());
            Ok(None)
        }
        Err(source) => Err(SourceError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
