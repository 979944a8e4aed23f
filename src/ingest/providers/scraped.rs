//! HTML listing pages (regulator press-release tables and similar).
//!
//! Rows are picked out with a regex carrying the named groups `link`, `title`
//! and `date`. A page redesign that breaks the pattern yields zero items and a
//! warning; it never counts against the circuit breaker.

use async_trait::async_trait;
use metrics::histogram;
use regex::Regex;
use reqwest::Url;
use tracing::{debug, warn};

use crate::ingest::fetcher::RequestOptions;
use crate::ingest::providers::parse_listing_date;
use crate::ingest::types::{FetchContext, NewsItem, NewsSource, SourceError, SourceTag};
use crate::ingest::{apply_window, normalize_text, synth_link};

/// SEBI "press releases" listing: `<td>Oct 17, 2026</td><td><a href="…">Title</a></td>`.
pub const SEBI_ROW_PATTERN: &str = r#"(?is)<tr[^>]*>\s*<td[^>]*>\s*(?P<date>[A-Za-z]{3}\s+\d{1,2},\s+\d{4})\s*</td>\s*<td[^>]*>\s*<a[^>]*?href\s*=\s*['"](?P<link>[^'"]*)['"][^>]*>(?P<title>.*?)</a>"#;
pub const SEBI_DATE_FORMAT: &str = "%b %d, %Y";

#[derive(Debug, Clone)]
pub struct ListingSelector {
    row: Regex,
    date_format: String,
}

impl ListingSelector {
    pub fn new(row_pattern: &str, date_format: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            row: Regex::new(row_pattern)?,
            date_format: date_format.into(),
        })
    }

    pub fn sebi() -> Result<Self, regex::Error> {
        Self::new(SEBI_ROW_PATTERN, SEBI_DATE_FORMAT)
    }
}

/// Extract items from a listing page. Rows with no title or no readable date are skipped.
pub fn parse_listing(html: &str, sel: &ListingSelector, tag: &SourceTag, page_url: &str) -> Vec<NewsItem> {
    let t0 = std::time::Instant::now();
    let base = Url::parse(page_url).ok();

    let mut out = Vec::new();
    for caps in sel.row.captures_iter(html) {
        let title = normalize_text(caps.name("title").map(|m| m.as_str()).unwrap_or_default());
        if title.is_empty() {
            continue;
        }
        let Some(date) = caps
            .name("date")
            .and_then(|m| parse_listing_date(m.as_str(), &sel.date_format))
        else {
            debug!(target: "ingest", source_id = %tag.id, title = %title, "row without usable date");
            continue;
        };

        let href = caps
            .name("link")
            .map(|m| html_escape::decode_html_entities(m.as_str().trim()).to_string())
            .filter(|h| !h.is_empty() && !h.starts_with("javascript:"));
        let link = href
            .and_then(|h| resolve(base.as_ref(), &h))
            .unwrap_or_else(|| synth_link(page_url, &title, date));

        out.push(tag.item(title, link, date));
    }

    histogram!("ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    out
}

fn resolve(base: Option<&Url>, href: &str) -> Option<String> {
    match Url::parse(href) {
        Ok(abs) => Some(abs.to_string()),
        Err(_) => base.and_then(|b| b.join(href).ok()).map(|u| u.to_string()),
    }
}

pub struct ScrapedListingSource {
    tag: SourceTag,
    url: String,
    selector: ListingSelector,
    options: RequestOptions,
}

impl ScrapedListingSource {
    pub fn new(tag: SourceTag, url: impl Into<String>, selector: ListingSelector) -> Self {
        Self {
            tag,
            url: url.into(),
            selector,
            options: RequestOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }
}

#[async_trait]
impl NewsSource for ScrapedListingSource {
    fn id(&self) -> &str {
        &self.tag.id
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<Vec<NewsItem>, SourceError> {
        let resp = ctx.fetcher.fetch_with_retry(&self.url, &self.options).await?;
        if !resp.is_ok() {
            return Err(SourceError::Http {
                status: resp.status,
                url: self.url.clone(),
            });
        }

        let items = parse_listing(&resp.body, &self.selector, &self.tag, &self.url);
        if items.is_empty() {
            warn!(target: "ingest", source_id = %self.tag.id, url = %self.url, "listing matched no rows");
        }
        Ok(apply_window(items, ctx.now, ctx.hours_ago, ctx.max_results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::SourcePriority;

    const SEBI_HTML: &str = include_str!("../../../tests/fixtures/sebi_press_releases.html");
    const PAGE: &str = "https://www.sebi.gov.in/sebiweb/home/HomeAction.do?doListing=yes&sid=6";

    fn tag() -> SourceTag {
        SourceTag::new("sebi", "SEBI", SourcePriority::Official)
    }

    #[test]
    fn extracts_rows_and_resolves_relative_links() {
        let items = parse_listing(SEBI_HTML, &ListingSelector::sebi().unwrap(), &tag(), PAGE);
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].title, "SEBI board meeting outcome");
        assert!(items[0].link.starts_with("https://www.sebi.gov.in/media-and-notifications/"));
        assert_eq!(
            items[1].link,
            "https://www.sebi.gov.in/media-and-notifications/press-releases/oct-2026/settlement-order_1002.html"
        );
    }

    #[test]
    fn row_without_href_gets_synthesized_link() {
        let items = parse_listing(SEBI_HTML, &ListingSelector::sebi().unwrap(), &tag(), PAGE);
        assert!(items[2].link.starts_with(&format!("{PAGE}#")));
    }

    #[test]
    fn redesigned_page_yields_nothing() {
        let html = "<div class='card'><span>Oct 17, 2026</span><a href='/x'>Moved</a></div>";
        assert!(parse_listing(html, &ListingSelector::sebi().unwrap(), &tag(), PAGE).is_empty());
    }
}
