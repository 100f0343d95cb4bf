pub mod backend;
pub mod cache;
pub mod config;
pub mod handlers;
pub mod source;

pub use backend::{Glossary, GlossaryBackend};
pub use cache::{IndexCache, MemoryCache, NullCache, cache_for};
pub use config::{CacheBackendKind, ConfigError, GlossaryConfig};
pub use handlers::{AppState, router};
pub use source::{ApprovedFilePages, ApprovedRevisions, FilePages, SourceError, SourceTextProvider};
