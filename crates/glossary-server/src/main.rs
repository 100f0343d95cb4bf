use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{Level, info, warn};
use tracing_subscriber::EnvFilter;

use glossary_server::{
    AppState, ApprovedFilePages, ApprovedRevisions, FilePages, GlossaryBackend, GlossaryConfig,
    cache_for, router,
};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PAGES_DIR: &str = "pages";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = load_config().context("invalid glossary configuration")?;
    info!("binding to {}:{}", config.host, config.port);
    info!("reading pages from {}", config.pages_dir.display());
    match &config.glossary.page {
        Some(page) => info!("glossary page: {page}"),
        None => warn!("GLOSSARY_PAGE is not set; pages pass through unannotated"),
    }
    if !config.glossary.use_cache {
        info!("index cache disabled");
    }
    info!(
        "cache backend: {} (expiry {} s)",
        config.glossary.cache_backend,
        config.glossary.cache_expiry.as_secs()
    );

    let approved_dir = config.pages_dir.join("approved");
    let approved: Option<Arc<dyn ApprovedRevisions>> = approved_dir
        .is_dir()
        .then(|| Arc::new(ApprovedFilePages::new(&config.pages_dir)) as Arc<dyn ApprovedRevisions>);
    let backend = GlossaryBackend::new(
        config.glossary.clone(),
        Arc::new(FilePages::new(&config.pages_dir)),
        approved,
        cache_for(config.glossary.cache_backend),
    )?;

    let backend = Arc::new(backend);
    let warmed = backend.glossary();
    info!(
        "glossary ready: {} entries, {} terms",
        warmed.index().size(),
        warmed.index().term_count()
    );

    let state = AppState { backend };
    let app = router(state).layer(TraceLayer::new_for_http());
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.host, config.port))?;
    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Debug, Clone)]
struct Config {
    host: String,
    port: u16,
    pages_dir: PathBuf,
    glossary: GlossaryConfig,
}

fn load_config() -> Result<Config, glossary_server::ConfigError> {
    let mut disable_cache = false;
    let mut cli_pages_dir: Option<PathBuf> = None;
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--no-cache" => disable_cache = true,
            "--pages-dir" => {
                if let Some(path) = args.next() {
                    cli_pages_dir = Some(PathBuf::from(path));
                }
            }
            _ => {
                if let Some(path) = arg.strip_prefix("--pages-dir=") {
                    cli_pages_dir = Some(PathBuf::from(path));
                }
            }
        }
    }

    let host = env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
    let port = env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);
    let pages_dir = cli_pages_dir
        .or_else(|| env::var("GLOSSARY_PAGES_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PAGES_DIR));

    let mut glossary = GlossaryConfig::from_env()?;
    if disable_cache {
        glossary.use_cache = false;
    }

    Ok(Config {
        host,
        port,
        pages_dir,
        glossary,
    })
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let max_level = env_filter
        .max_level_hint()
        .and_then(|hint| hint.into_level())
        .unwrap_or(Level::INFO);
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(true)
        .with_max_level(max_level)
        .init();
}
