//! catalyst-ingest binary entrypoint.
//! Loads config, starts the ingest loop, and serves the ops router.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use catalyst_ingest::api::{self, AppState};
use catalyst_ingest::config::AppConfig;
use catalyst_ingest::ingest::catalog::build_registry;
use catalyst_ingest::ingest::fetcher::RetryingFetcher;
use catalyst_ingest::ingest::scheduler::spawn_ingest_loop;
use catalyst_ingest::ingest::watchlist::InMemoryWatchlist;
use catalyst_ingest::metrics::Metrics;

/// Compact logs by default; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("catalyst_ingest=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load_default().context("loading configuration")?;
    let metrics = Metrics::init(cfg.rss_cache_ttl().as_millis() as u64, cfg.server.tick_secs)?;

    let fetcher = Arc::new(RetryingFetcher::new(cfg.retry_policy())?);
    let watchlist = cfg
        .watchlist
        .codes
        .iter()
        .fold(InMemoryWatchlist::new(&cfg.watchlist.symbols), |wl, (sym, code)| {
            wl.with_mapping(sym, code)
        });
    let registry = Arc::new(build_registry(&cfg, fetcher, Arc::new(watchlist))?);

    let (tx, mut rx) = mpsc::channel(1024);
    let ingest = spawn_ingest_loop(registry.clone(), tx, cfg.tick());

    tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            tracing::info!(
                target: "catalyst_ingest",
                source_id = %item.source_id,
                priority = u8::from(item.source_priority),
                published = %item.pub_date,
                link = %item.link,
                "{}",
                item.title
            );
        }
    });

    let app = api::router(AppState { registry }).merge(metrics.router());
    let listener = tokio::net::TcpListener::bind(&cfg.server.bind)
        .await
        .with_context(|| format!("binding {}", cfg.server.bind))?;
    tracing::info!(target: "catalyst_ingest", bind = %cfg.server.bind, "ops api listening");

    axum::serve(listener, app).await?;
    ingest.abort();
    Ok(())
}
