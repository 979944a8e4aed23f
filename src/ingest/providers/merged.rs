use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::ingest::fetcher::RequestOptions;
use crate::ingest::providers::rss::{fetch_feed, RssFeedSource};
use crate::ingest::types::{FetchContext, NewsItem, NewsSource, SourceError, SourceTag};
use crate::ingest::{apply_window, merge_by_link};

/// Two feeds from one publisher (e.g. press releases + notifications) reported
/// as a single source. Items shared by link are kept once, first feed first.
pub struct MergedFeedSource {
    tag: SourceTag,
    primary: String,
    secondary: String,
    ttl: Duration,
    options: RequestOptions,
}

impl MergedFeedSource {
    pub fn new(tag: SourceTag, primary: impl Into<String>, secondary: impl Into<String>) -> Self {
        Self {
            tag,
            primary: primary.into(),
            secondary: secondary.into(),
            ttl: RssFeedSource::DEFAULT_TTL,
            options: RequestOptions::default(),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

#[async_trait]
impl NewsSource for MergedFeedSource {
    fn id(&self) -> &str {
        &self.tag.id
    }

    /// One half failing is logged and tolerated; only both failing is a source failure.
    /// Items come back newest-first; first-seen order only breaks timestamp ties.
    async fn fetch(&self, ctx: &FetchContext) -> Result<Vec<NewsItem>, SourceError> {
        let (a, b) = tokio::join!(
            fetch_feed(ctx, &self.tag, &self.primary, &self.options, self.ttl),
            fetch_feed(ctx, &self.tag, &self.secondary, &self.options, self.ttl),
        );

        let merged = match (a, b) {
            (Ok(a), Ok(b)) => merge_by_link([a, b]),
            (Ok(a), Err(e)) => {
                warn!(target: "ingest", source_id = %self.tag.id, url = %self.secondary, error = %e, "secondary feed failed");
                a
            }
            (Err(e), Ok(b)) => {
                warn!(target: "ingest", source_id = %self.tag.id, url = %self.primary, error = %e, "primary feed failed");
                b
            }
            (Err(e), Err(_)) => return Err(e),
        };

        Ok(apply_window(merged, ctx.now, ctx.hours_ago, ctx.max_results))
    }
}
