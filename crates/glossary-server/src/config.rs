use std::collections::BTreeSet;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use glossary_annotate::AnnotateOptions;
use glossary_types::{EXCLUSION_CLASS, TooltipStyle};
use thiserror::Error;

/// Thirty days.
pub const DEFAULT_CACHE_EXPIRY: Duration = Duration::from_secs(60 * 60 * 24 * 30);

/// The main content namespace.
pub const DEFAULT_NAMESPACE: i64 = 0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("\"{0}\" is not a valid cache backend (expected memory or none)")]
    UnknownBackend(String),
    #[error("{0} is enabled but no approved revision lookup is available")]
    DependencyMissing(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Storage used for the serialized index.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum CacheBackendKind {
    #[default]
    Memory,
    None,
}

impl FromStr for CacheBackendKind {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(CacheBackendKind::Memory),
            "none" => Ok(CacheBackendKind::None),
            _ => Err(ConfigError::UnknownBackend(raw.trim().to_string())),
        }
    }
}

impl fmt::Display for CacheBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CacheBackendKind::Memory => "memory",
            CacheBackendKind::None => "none",
        })
    }
}

#[derive(Clone, Debug)]
pub struct GlossaryConfig {
    /// Title of the page holding the glossary source. No page, no annotation.
    pub page: Option<String>,
    pub allow_html: bool,
    pub display_once: bool,
    pub namespaces: BTreeSet<i64>,
    pub disabled_elements: BTreeSet<String>,
    pub cache_expiry: Duration,
    pub cache_backend: CacheBackendKind,
    pub use_cache: bool,
    pub approved_revisions: bool,
    pub tooltip_style: TooltipStyle,
}

impl Default for GlossaryConfig {
    fn default() -> Self {
        Self {
            page: None,
            allow_html: false,
            display_once: false,
            namespaces: BTreeSet::from([DEFAULT_NAMESPACE]),
            disabled_elements: BTreeSet::new(),
            cache_expiry: DEFAULT_CACHE_EXPIRY,
            cache_backend: CacheBackendKind::default(),
            use_cache: true,
            approved_revisions: false,
            tooltip_style: TooltipStyle::default(),
        }
    }
}

impl GlossaryConfig {
    /// Read `GLOSSARY_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key/value source; unset keys keep their defaults.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        config.page = get("GLOSSARY_PAGE")
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        if let Some(raw) = get("GLOSSARY_ALLOW_HTML") {
            config.allow_html = parse_bool("GLOSSARY_ALLOW_HTML", &raw)?;
        }
        if let Some(raw) = get("GLOSSARY_DISPLAY_ONCE") {
            config.display_once = parse_bool("GLOSSARY_DISPLAY_ONCE", &raw)?;
        }
        if let Some(raw) = get("GLOSSARY_NAMESPACES") {
            config.namespaces = split_list(&raw)
                .map(|ns| {
                    ns.parse::<i64>().map_err(|_| ConfigError::Invalid {
                        key: "GLOSSARY_NAMESPACES",
                        value: raw.clone(),
                    })
                })
                .collect::<Result<_, _>>()?;
        }
        if let Some(raw) = get("GLOSSARY_DISABLED_ELEMENTS") {
            config.disabled_elements = split_list(&raw).map(|el| el.to_ascii_lowercase()).collect();
        }
        if let Some(raw) = get("GLOSSARY_CACHE_EXPIRY") {
            let secs = raw.trim().parse::<u64>().map_err(|_| ConfigError::Invalid {
                key: "GLOSSARY_CACHE_EXPIRY",
                value: raw.clone(),
            })?;
            config.cache_expiry = Duration::from_secs(secs);
        }
        if let Some(raw) = get("GLOSSARY_CACHE_BACKEND") {
            config.cache_backend = raw.parse()?;
        }
        if let Some(raw) = get("GLOSSARY_USE_CACHE") {
            config.use_cache = parse_bool("GLOSSARY_USE_CACHE", &raw)?;
        }
        if let Some(raw) = get("GLOSSARY_APPROVED_REVISIONS") {
            config.approved_revisions = parse_bool("GLOSSARY_APPROVED_REVISIONS", &raw)?;
        }
        if let Some(raw) = get("GLOSSARY_TOOLTIP_STYLE") {
            config.tooltip_style = TooltipStyle::from_name(&raw).ok_or(ConfigError::Invalid {
                key: "GLOSSARY_TOOLTIP_STYLE",
                value: raw.clone(),
            })?;
        }

        Ok(config)
    }

    pub fn allows_namespace(&self, namespace: i64) -> bool {
        self.namespaces.contains(&namespace)
    }

    pub fn annotate_options(&self) -> AnnotateOptions {
        AnnotateOptions {
            display_once: self.display_once,
            allow_html: self.allow_html,
            tooltip_style: self.tooltip_style,
            disabled_elements: self.disabled_elements.clone(),
            exclusion_class: EXCLUSION_CLASS.to_string(),
        }
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw.to_string(),
        }),
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}
