mod common;

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Router};
use catalyst_ingest::ingest::providers::exchange::ExchangeAnnouncementsSource;
use catalyst_ingest::ingest::providers::merged::MergedFeedSource;
use catalyst_ingest::ingest::providers::rss::RssFeedSource;
use catalyst_ingest::ingest::providers::scraped::{ListingSelector, ScrapedListingSource};
use catalyst_ingest::ingest::types::{FetchContext, NewsSource, SourceError, SourcePriority, SourceTag};
use catalyst_ingest::ingest::watchlist::{InMemoryWatchlist, WatchlistResolver};
use chrono::{DateTime, TimeZone, Utc};
use common::{fast_policy, fetcher, rss, serve, Hits};

const RBI_XML: &str = include_str!("fixtures/rbi_press_releases.xml");
const SEBI_HTML: &str = include_str!("fixtures/sebi_press_releases.html");
const BSE_JSON: &str = include_str!("fixtures/bse_announcements.json");

fn official(id: &str) -> SourceTag {
    SourceTag::new(id, id.to_uppercase(), SourcePriority::Official)
}

fn ctx_at(now: DateTime<Utc>) -> FetchContext {
    FetchContext::new(fetcher(fast_policy(0))).at(now)
}

fn app(hits: Hits) -> Router {
    Router::new()
        .route("/rbi.xml", get(|| async { RBI_XML }))
        .route("/sebi", get(|| async { SEBI_HTML }))
        .route("/blocked", get(|| async { (StatusCode::FORBIDDEN, "Access Denied") }))
        .route("/broken", get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down") }))
        .route(
            "/press.xml",
            get(|| async {
                rss(&[
                    ("Policy rate held", "https://rbi.example/p/1", "Mon, 19 Oct 2026 09:00:00 +0000"),
                    ("Liquidity operation", "https://rbi.example/shared", "Mon, 19 Oct 2026 08:00:00 +0000"),
                ])
            }),
        )
        .route(
            "/notifications.xml",
            get(|| async {
                rss(&[
                    ("Liquidity operation (notification)", "https://rbi.example/shared", "Mon, 19 Oct 2026 07:00:00 +0000"),
                    ("KYC master direction amended", "https://rbi.example/n/7", "Mon, 19 Oct 2026 10:00:00 +0000"),
                ])
            }),
        )
        .route(
            "/ann",
            get(|State(h): State<Hits>| async move {
                h.bump();
                BSE_JSON
            }),
        )
        .route("/ann-throttled", get(|| async { "<html>Access Denied</html>" }))
        .with_state(hits)
}

#[tokio::test]
async fn rss_source_windows_fixture_items() {
    let base = serve(app(Hits::default())).await;
    let src = RssFeedSource::new(official("rbi"), format!("{base}/rbi.xml"));

    let now = Utc.with_ymd_and_hms(2026, 10, 17, 0, 0, 0).unwrap();
    let items = src.fetch(&ctx_at(now)).await.unwrap();
    assert_eq!(items.len(), 1);
    assert!(items[0].title.starts_with("RBI keeps repo rate"));

    let wide = ctx_at(now).with_window(24 * 7, 2);
    let items = src.fetch(&wide).await.unwrap();
    assert_eq!(items.len(), 2);
    assert!(items[0].pub_date > items[1].pub_date);
}

#[tokio::test]
async fn merged_feed_keeps_first_seen_and_sorts() {
    let base = serve(app(Hits::default())).await;
    let src = MergedFeedSource::new(
        official("rbi"),
        format!("{base}/press.xml"),
        format!("{base}/notifications.xml"),
    );
    let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
    let items = src.fetch(&ctx_at(now)).await.unwrap();

    let links: Vec<_> = items.iter().map(|i| i.link.as_str()).collect();
    assert_eq!(
        links,
        vec!["https://rbi.example/n/7", "https://rbi.example/p/1", "https://rbi.example/shared"]
    );
    let shared = items.iter().find(|i| i.link.ends_with("/shared")).unwrap();
    assert_eq!(shared.title, "Liquidity operation");
}

#[tokio::test]
async fn merged_feed_survives_one_dead_half_but_not_two() {
    let base = serve(app(Hits::default())).await;
    let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();

    let half = MergedFeedSource::new(official("rbi"), format!("{base}/press.xml"), format!("{base}/broken"));
    assert_eq!(half.fetch(&ctx_at(now)).await.unwrap().len(), 2);

    let dead = MergedFeedSource::new(official("rbi"), format!("{base}/blocked"), format!("{base}/broken"));
    assert!(matches!(dead.fetch(&ctx_at(now)).await, Err(SourceError::Fetch(_))));
}

#[tokio::test]
async fn scraped_listing_over_http() {
    let base = serve(app(Hits::default())).await;
    let now = Utc.with_ymd_and_hms(2026, 10, 18, 0, 0, 0).unwrap();

    let src = ScrapedListingSource::new(official("sebi"), format!("{base}/sebi"), ListingSelector::sebi().unwrap());
    let items = src.fetch(&ctx_at(now).with_window(96, 50)).await.unwrap();
    assert_eq!(items.len(), 3);
    assert!(items.iter().all(|i| i.source_id == "sebi"));

    let blocked = ScrapedListingSource::new(official("sebi"), format!("{base}/blocked"), ListingSelector::sebi().unwrap());
    assert!(matches!(
        blocked.fetch(&ctx_at(now)).await,
        Err(SourceError::Http { status: 403, .. })
    ));
}

#[tokio::test]
async fn exchange_source_filters_to_watchlist_and_learns_codes() {
    let hits = Hits::default();
    let base = serve(app(hits.clone())).await;
    let wl = Arc::new(InMemoryWatchlist::new(["RELIANCE", "TCS"]));
    let src = ExchangeAnnouncementsSource::new(official("bse_announcements"), wl.clone())
        .with_base_url(format!("{base}/ann"));

    let now = Utc.with_ymd_and_hms(2026, 10, 19, 15, 0, 0).unwrap();
    let items = src.fetch(&ctx_at(now)).await.unwrap();

    let titles: Vec<_> = items.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(
        titles,
        vec![
            "RELIANCE: Reliance Industries Ltd - Outcome of Board Meeting",
            "TCS: Tata Consultancy Services Ltd - Financial Results for Q2",
        ]
    );
    assert!(items[0].link.ends_with("5a1b2c3d-outcome.pdf"));
    assert_eq!(wl.code_for_symbol("TCS").await.as_deref(), Some("532540"));
    assert_eq!(wl.symbol_for_code("500209").await, None);
    assert_eq!(hits.get(), 1);
}

#[tokio::test]
async fn exchange_source_known_mapping_and_empty_watchlist() {
    let hits = Hits::default();
    let base = serve(app(hits.clone())).await;
    let now = Utc.with_ymd_and_hms(2026, 10, 19, 15, 0, 0).unwrap();

    let wl = Arc::new(InMemoryWatchlist::new(["INFY"]).with_mapping("INFY", "500209"));
    let src = ExchangeAnnouncementsSource::new(official("bse_announcements"), wl)
        .with_base_url(format!("{base}/ann"));
    let items = src.fetch(&ctx_at(now)).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].title, "INFY: Board Meeting Intimation");
    assert!(items[0].link.contains("newsid=abc-123"));

    let empty = ExchangeAnnouncementsSource::new(
        official("bse_announcements"),
        Arc::new(InMemoryWatchlist::default()),
    )
    .with_base_url(format!("{base}/ann"));
    assert!(empty.fetch(&ctx_at(now)).await.unwrap().is_empty());
    assert_eq!(hits.get(), 1);
}

#[tokio::test]
async fn exchange_throttle_page_yields_nothing() {
    let base = serve(app(Hits::default())).await;
    let src = ExchangeAnnouncementsSource::new(
        official("bse_announcements"),
        Arc::new(InMemoryWatchlist::new(["TCS"])),
    )
    .with_base_url(format!("{base}/ann-throttled"));
    let now = Utc.with_ymd_and_hms(2026, 10, 19, 15, 0, 0).unwrap();
    assert!(src.fetch(&ctx_at(now)).await.unwrap().is_empty());
}
