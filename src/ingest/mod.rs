// src/ingest/mod.rs
pub mod cache;
pub mod catalog;
pub mod circuit_breaker;
pub mod dedup;
pub mod fetcher;
pub mod providers;
pub mod registry;
pub mod scheduler;
pub mod types;
pub mod watchlist;

use std::collections::HashSet;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use sha2::{Digest, Sha256};

use crate::ingest::types::NewsItem;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "ingest_fetch_attempts_total",
            "HTTP attempts made by the retrying fetcher."
        );
        describe_counter!(
            "ingest_fetch_retries_total",
            "Attempts that failed transiently and were retried."
        );
        describe_counter!("ingest_rss_cache_hits_total", "Feed reads served from cache.");
        describe_counter!(
            "ingest_rss_cache_misses_total",
            "Feed reads that went to the network."
        );
        describe_counter!(
            "ingest_breaker_opened_total",
            "Circuit transitions into OPEN."
        );
        describe_counter!(
            "ingest_source_fetch_total",
            "Registry dispatches per outcome (ok, error, circuit_open)."
        );
        describe_counter!("ingest_items_total", "Items returned by adapters.");
        describe_counter!("ingest_runs_total", "Scheduler ticks that dispatched at least one source.");
        describe_gauge!(
            "ingest_pipeline_last_run_ts",
            "Unix time of the last dispatching scheduler tick."
        );
        describe_histogram!("ingest_parse_ms", "Adapter parse time in milliseconds.");
        describe_histogram!(
            "ingest_source_fetch_ms",
            "Wall time of one source fetch in milliseconds."
        );
    });
}

/// Normalize text: decode entities, strip tags, collapse whitespace, trim.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap: 500 chars (titles only)
    if out.chars().count() > 500 {
        out = out.chars().take(500).collect();
    }

    out
}

/// Recency filter + cap: drop items older than `hours_ago` before `now`, keep the
/// newest `max_results`, newest first.
pub fn apply_window(
    mut items: Vec<NewsItem>,
    now: DateTime<Utc>,
    hours_ago: u32,
    max_results: usize,
) -> Vec<NewsItem> {
    let cutoff = now - ChronoDuration::hours(i64::from(hours_ago));
    items.retain(|it| it.pub_date >= cutoff);
    // Stable sort keeps feed order among equal timestamps.
    items.sort_by(|a, b| b.pub_date.cmp(&a.pub_date));
    items.truncate(max_results);
    items
}

/// Concatenate feeds, keeping only the first occurrence of each link.
pub fn merge_by_link<I>(feeds: I) -> Vec<NewsItem>
where
    I: IntoIterator<Item = Vec<NewsItem>>,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for feed in feeds {
        for it in feed {
            if seen.insert(it.link.clone()) {
                out.push(it);
            }
        }
    }
    out
}

/// Stable link for rows that carry none: `{base}#{first 16 hex of sha256(title|date)}`.
pub fn synth_link(base: &str, title: &str, date: DateTime<Utc>) -> String {
    let mut h = Sha256::new();
    h.update(title.as_bytes());
    h.update(b"|");
    h.update(date.to_rfc3339().as_bytes());
    let hex = format!("{:x}", h.finalize());
    format!("{base}#{}", &hex[..16])
}
