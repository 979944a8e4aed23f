use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::histogram;
use quick_xml::de::from_str;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::ingest::fetcher::RequestOptions;
use crate::ingest::providers::{parse_feed_date, scrub_html_entities_for_xml};
use crate::ingest::types::{FetchContext, NewsItem, NewsSource, SourceError, SourceTag};
use crate::ingest::{apply_window, normalize_text, synth_link};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    guid: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

/// Parse an RSS 2.0 document into tagged items. Items without a title or a
/// readable date are skipped; items without a link get a synthesized one.
pub fn parse_rss(xml: &str, tag: &SourceTag, feed_url: &str) -> Result<Vec<NewsItem>> {
    let t0 = std::time::Instant::now();
    let xml_clean = scrub_html_entities_for_xml(xml);
    let rss: Rss = from_str(&xml_clean).with_context(|| format!("parsing {} rss xml", tag.id))?;

    let mut out = Vec::with_capacity(rss.channel.item.len());
    for it in rss.channel.item {
        let title = normalize_text(it.title.as_deref().unwrap_or_default());
        if title.is_empty() {
            continue;
        }
        let Some(pub_date) = it.pub_date.as_deref().and_then(parse_feed_date) else {
            debug!(target: "ingest", source_id = %tag.id, title = %title, "item without usable pubDate");
            continue;
        };
        let link = it
            .link
            .or(it.guid)
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| synth_link(feed_url, &title, pub_date));

        out.push(tag.item(title, link, pub_date));
    }

    histogram!("ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    Ok(out)
}

/// Generic cached RSS feed (government press releases, regulator circulars).
pub struct RssFeedSource {
    tag: SourceTag,
    url: String,
    ttl: Duration,
    options: RequestOptions,
}

impl RssFeedSource {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

    pub fn new(tag: SourceTag, url: impl Into<String>) -> Self {
        Self {
            tag,
            url: url.into(),
            ttl: Self::DEFAULT_TTL,
            options: RequestOptions::default(),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Shared by single and merged feeds: fetch through the cache, parse, swallow parse misses.
pub(crate) async fn fetch_feed(
    ctx: &FetchContext,
    tag: &SourceTag,
    url: &str,
    opts: &RequestOptions,
    ttl: Duration,
) -> Result<Vec<NewsItem>, SourceError> {
    let xml = ctx.fetcher.fetch_rss_with_cache(url, opts, ttl).await?;
    match parse_rss(&xml, tag, url) {
        Ok(items) => Ok(items),
        Err(e) => {
            warn!(target: "ingest", source_id = %tag.id, url, error = ?e, "feed parse failed, yielding no items");
            Ok(Vec::new())
        }
    }
}

#[async_trait]
impl NewsSource for RssFeedSource {
    fn id(&self) -> &str {
        &self.tag.id
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<Vec<NewsItem>, SourceError> {
        let items = fetch_feed(ctx, &self.tag, &self.url, &self.options, self.ttl).await?;
        Ok(apply_window(items, ctx.now, ctx.hours_ago, ctx.max_results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::SourcePriority;

    const RBI_XML: &str = include_str!("../../../tests/fixtures/rbi_press_releases.xml");

    fn tag() -> SourceTag {
        SourceTag::new("rbi", "RBI", SourcePriority::Official)
    }

    #[test]
    fn parses_fixture_and_tags_items() {
        let items = parse_rss(RBI_XML, &tag(), "https://rbi.example/press.xml").unwrap();
        assert_eq!(items.len(), 3);
        assert!(items.iter().all(|i| i.source_id == "rbi"));
        assert!(items.iter().all(|i| i.source_priority == SourcePriority::Official));
        assert!(items[0].title.starts_with("RBI keeps repo rate"));
    }

    #[test]
    fn missing_link_is_synthesized_and_html_entities_survive() {
        let items = parse_rss(RBI_XML, &tag(), "https://rbi.example/press.xml").unwrap();
        let no_link = items
            .iter()
            .find(|i| i.title.contains("Auction"))
            .expect("auction item");
        assert!(no_link.link.starts_with("https://rbi.example/press.xml#"));
        assert!(items.iter().any(|i| i.title.contains("Governor's statement - December")));
    }

    #[test]
    fn undated_items_are_skipped() {
        let items = parse_rss(RBI_XML, &tag(), "u").unwrap();
        assert!(items.iter().all(|i| !i.title.contains("Undated")));
    }

    #[test]
    fn malformed_xml_is_an_error_at_parse_level() {
        assert!(parse_rss("<rss><channel><item>", &tag(), "u").is_err());
    }

    #[test]
    fn items_split_by_other_channel_elements_are_all_kept() {
        let xml = r#"<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom"><channel>
            <title>PIB</title>
            <item><title>First</title><link>https://pib.example/1</link>
              <pubDate>Fri, 16 Oct 2026 10:00:00 +0530</pubDate></item>
            <image><url>https://pib.example/logo.png</url><title>PIB</title></image>
            <atom:link href="https://pib.example/rss" rel="self"/>
            <item><title>Second</title><link>https://pib.example/2</link>
              <pubDate>Fri, 16 Oct 2026 11:00:00 +0530</pubDate></item>
        </channel></rss>"#;
        let items = parse_rss(xml, &tag(), "u").unwrap();
        let titles: Vec<_> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["First", "Second"]);
    }

    #[test]
    fn empty_channel_parses_to_nothing() {
        let xml = r#"<rss version="2.0"><channel><title>x</title></channel></rss>"#;
        assert!(parse_rss(xml, &tag(), "u").unwrap().is_empty());
    }
}
