//! Built-in source catalog and registry assembly.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::config::AppConfig;
use crate::ingest::circuit_breaker::CircuitBreaker;
use crate::ingest::fetcher::RetryingFetcher;
use crate::ingest::providers::exchange::ExchangeAnnouncementsSource;
use crate::ingest::providers::merged::MergedFeedSource;
use crate::ingest::providers::rss::RssFeedSource;
use crate::ingest::providers::scraped::{ListingSelector, ScrapedListingSource};
use crate::ingest::registry::SourceRegistry;
use crate::ingest::types::{Lane, NewsSource, SourceConfig, SourcePriority, SourceTag, SourceType};
use crate::ingest::watchlist::WatchlistResolver;

pub const RBI_PRESS_RELEASES_RSS: &str = "https://www.rbi.org.in/pressreleases_rss.xml";
pub const RBI_NOTIFICATIONS_RSS: &str = "https://www.rbi.org.in/notifications_rss.xml";
pub const PIB_FINANCE_RSS: &str = "https://pib.gov.in/RssMain.aspx?ModId=6&Lang=1&Regid=3";
pub const SEBI_PRESS_RELEASES: &str =
    "https://www.sebi.gov.in/sebiweb/home/HomeAction.do?doListing=yes&sid=6&ssid=23&smid=0";

fn entry(
    id: &str,
    name: &str,
    source_type: SourceType,
    lane: Lane,
    poll_interval_minutes: u32,
) -> SourceConfig {
    SourceConfig {
        id: id.to_string(),
        name: name.to_string(),
        source_type,
        lane,
        priority: SourcePriority::Official,
        poll_interval_minutes,
        enabled: true,
    }
}

/// Static metadata for every built-in source.
pub fn default_catalog() -> Vec<SourceConfig> {
    vec![
        entry("bse_announcements", "BSE Announcements", SourceType::Api, Lane::Fast, 5),
        entry("rbi", "RBI", SourceType::Rss, Lane::Official, 15),
        entry("pib_finance", "PIB Finance", SourceType::Rss, Lane::Official, 15),
        entry("sebi", "SEBI", SourceType::Scrape, Lane::Official, 30),
    ]
}

fn tag(cfg: &SourceConfig) -> SourceTag {
    SourceTag::new(cfg.id.clone(), cfg.name.clone(), cfg.priority)
}

/// Build the registry from the catalog with per-source config overrides applied.
pub fn build_registry(
    cfg: &AppConfig,
    fetcher: Arc<RetryingFetcher>,
    watchlist: Arc<dyn WatchlistResolver>,
) -> Result<SourceRegistry> {
    let ttl = cfg.rss_cache_ttl();
    let mut registry = SourceRegistry::new(fetcher, CircuitBreaker::new(cfg.breaker_config()))
        .with_window(cfg.window.hours_ago, cfg.window.max_results);

    for mut sc in default_catalog() {
        if let Some(o) = cfg.source_override(&sc.id) {
            if let Some(enabled) = o.enabled {
                sc.enabled = enabled;
            }
            if let Some(every) = o.poll_interval_minutes {
                sc.poll_interval_minutes = every;
            }
        }

        let source: Arc<dyn NewsSource> = match sc.id.as_str() {
            "rbi" => Arc::new(
                MergedFeedSource::new(tag(&sc), RBI_PRESS_RELEASES_RSS, RBI_NOTIFICATIONS_RSS)
                    .with_ttl(ttl),
            ),
            "pib_finance" => Arc::new(RssFeedSource::new(tag(&sc), PIB_FINANCE_RSS).with_ttl(ttl)),
            "sebi" => Arc::new(ScrapedListingSource::new(
                tag(&sc),
                SEBI_PRESS_RELEASES,
                ListingSelector::sebi()?,
            )),
            "bse_announcements" => {
                Arc::new(ExchangeAnnouncementsSource::new(tag(&sc), watchlist.clone()))
            }
            other => anyhow::bail!("no adapter for catalog source {other}"),
        };

        info!(
            target: "ingest",
            source_id = %sc.id,
            enabled = sc.enabled,
            every_min = sc.poll_interval_minutes,
            "registered source"
        );
        registry.register(sc, source)?;
    }

    Ok(registry)
}
