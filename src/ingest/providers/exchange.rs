//! Exchange corporate-announcements API (BSE JSON feed), filtered to monitored companies.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Utc};
use metrics::histogram;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::ingest::fetcher::RequestOptions;
use crate::ingest::providers::{from_ist, ist};
use crate::ingest::types::{FetchContext, NewsItem, NewsSource, SourceError, SourceTag};
use crate::ingest::watchlist::WatchlistResolver;
use crate::ingest::{apply_window, normalize_text, synth_link};

pub const BSE_API_BASE: &str = "https://api.bseindia.com/BseIndiaAPI/api/AnnSubCategoryGetData/w";
pub const BSE_ATTACHMENT_BASE: &str = "https://www.bseindia.com/xml-data/corpfiling/AttachLive/";

#[derive(Debug, Deserialize)]
struct AnnouncementPage {
    #[serde(rename = "Table", default)]
    table: Vec<Announcement>,
}

#[derive(Debug, Deserialize)]
struct Announcement {
    #[serde(rename = "NEWSID")]
    news_id: Option<String>,
    #[serde(rename = "SCRIP_CD")]
    scrip_cd: Option<Value>,
    #[serde(rename = "HEADLINE")]
    headline: Option<String>,
    #[serde(rename = "NEWSSUB")]
    news_sub: Option<String>,
    #[serde(rename = "NEWS_DT")]
    news_dt: Option<String>,
    #[serde(rename = "DT_TM")]
    dt_tm: Option<String>,
    #[serde(rename = "ATTACHMENTNAME")]
    attachment: Option<String>,
    /// Company page URL; its second-to-last path segment is the exchange short symbol.
    #[serde(rename = "NSURL")]
    ns_url: Option<String>,
}

/// Decoded announcement before watchlist filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAnnouncement {
    pub scrip_code: String,
    pub headline: String,
    pub published: DateTime<Utc>,
    pub link: Option<String>,
    pub short_symbol: Option<String>,
}

fn scrip_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_exchange_ts(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%d/%m/%Y %H:%M:%S"]
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(s, layout).ok())
        .and_then(from_ist)
}

fn short_symbol_from_url(url: &str) -> Option<String> {
    let segs: Vec<&str> = url.trim_end_matches('/').rsplit('/').collect();
    // …/stock-share-price/<company-slug>/<short>/<code>
    segs.get(1)
        .map(|s| s.trim().to_ascii_uppercase())
        .filter(|s| !s.is_empty())
}

/// Decode the API payload. Malformed JSON (the API answers HTML when throttled) is an Err
/// for the caller to log; rows lacking a code, headline or timestamp are skipped.
pub fn parse_announcements(body: &str) -> Result<Vec<RawAnnouncement>, serde_json::Error> {
    let t0 = std::time::Instant::now();
    let page: AnnouncementPage = serde_json::from_str(body)?;

    let mut out = Vec::with_capacity(page.table.len());
    for a in page.table {
        let Some(scrip_code) = a.scrip_cd.as_ref().and_then(scrip_to_string) else {
            continue;
        };
        let headline = normalize_text(
            a.headline
                .as_deref()
                .filter(|h| !h.trim().is_empty())
                .or(a.news_sub.as_deref())
                .unwrap_or_default(),
        );
        if headline.is_empty() {
            continue;
        }
        let Some(published) = a
            .news_dt
            .as_deref()
            .and_then(parse_exchange_ts)
            .or_else(|| a.dt_tm.as_deref().and_then(parse_exchange_ts))
        else {
            debug!(target: "ingest", scrip_code = %scrip_code, "announcement without timestamp");
            continue;
        };
        let link = a
            .attachment
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(|n| format!("{BSE_ATTACHMENT_BASE}{n}"))
            .or_else(|| {
                a.news_id
                    .as_deref()
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(|id| format!("https://www.bseindia.com/corporates/ann.html?newsid={id}"))
            });

        out.push(RawAnnouncement {
            scrip_code,
            headline,
            published,
            link,
            short_symbol: a.ns_url.as_deref().and_then(short_symbol_from_url),
        });
    }

    histogram!("ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    Ok(out)
}

pub struct ExchangeAnnouncementsSource {
    tag: SourceTag,
    base_url: String,
    watchlist: Arc<dyn WatchlistResolver>,
    options: RequestOptions,
}

impl ExchangeAnnouncementsSource {
    pub fn new(tag: SourceTag, watchlist: Arc<dyn WatchlistResolver>) -> Self {
        Self {
            tag,
            base_url: BSE_API_BASE.to_string(),
            watchlist,
            // The API answers 403 without an exchange referer.
            options: RequestOptions::default()
                .header("Referer", "https://www.bseindia.com/")
                .header("Accept", "application/json"),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn request_url(&self, ctx: &FetchContext) -> String {
        let to = ctx.now.with_timezone(&ist());
        let from = (ctx.now - ChronoDuration::hours(i64::from(ctx.hours_ago))).with_timezone(&ist());
        format!(
            "{}?pageno=1&strCat=-1&strPrevDate={}&strScrip=&strSearch=P&strToDate={}&strType=C",
            self.base_url,
            from.format("%Y%m%d"),
            to.format("%Y%m%d")
        )
    }

    /// Map raw rows to monitored companies, learning code↔symbol pairs the payload reveals.
    async fn to_items(&self, raw: Vec<RawAnnouncement>, monitored: &[String]) -> Vec<NewsItem> {
        let mut out = Vec::new();
        for a in raw {
            let symbol = match self.watchlist.symbol_for_code(&a.scrip_code).await {
                Some(s) => Some(s),
                None => match a.short_symbol.as_deref() {
                    Some(short) if monitored.iter().any(|m| m == short) => {
                        debug!(target: "ingest", symbol = short, code = %a.scrip_code, "learned scrip mapping");
                        self.watchlist.upsert_mapping(short, &a.scrip_code).await;
                        Some(short.to_string())
                    }
                    _ => None,
                },
            };
            let Some(symbol) = symbol.filter(|s| monitored.iter().any(|m| m == s)) else {
                continue;
            };

            let title = format!("{symbol}: {}", a.headline);
            let link = a
                .link
                .unwrap_or_else(|| synth_link(&self.base_url, &title, a.published));
            out.push(self.tag.item(title, link, a.published));
        }
        out
    }
}

#[async_trait]
impl NewsSource for ExchangeAnnouncementsSource {
    fn id(&self) -> &str {
        &self.tag.id
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<Vec<NewsItem>, SourceError> {
        let monitored = self.watchlist.monitored_symbols().await;
        if monitored.is_empty() {
            debug!(target: "ingest", source_id = %self.tag.id, "no monitored symbols, skipping request");
            return Ok(Vec::new());
        }

        let url = self.request_url(ctx);
        let resp = ctx.fetcher.fetch_with_retry(&url, &self.options).await?;
        if !resp.is_ok() {
            return Err(SourceError::Http {
                status: resp.status,
                url,
            });
        }

        let raw = match parse_announcements(&resp.body) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(target: "ingest", source_id = %self.tag.id, error = %e, "announcement payload unreadable, yielding no items");
                return Ok(Vec::new());
            }
        };

        let items = self.to_items(raw, &monitored).await;
        Ok(apply_window(items, ctx.now, ctx.hours_ago, ctx.max_results))
    }
}
