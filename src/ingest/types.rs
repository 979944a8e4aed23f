// src/ingest/types.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ingest::fetcher::{FetchError, RetryingFetcher};

/// Trust level of a source. Lower is more trusted; downstream weighting keys off the integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum SourcePriority {
    Official = 0,
    VerifiedMedia = 1,
    Social = 2,
    Aggregator = 3,
}

impl From<SourcePriority> for u8 {
    fn from(p: SourcePriority) -> u8 {
        p as u8
    }
}

impl TryFrom<u8> for SourcePriority {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::Official),
            1 => Ok(Self::VerifiedMedia),
            2 => Ok(Self::Social),
            3 => Ok(Self::Aggregator),
            other => Err(format!("source priority must be 0..=3, got {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SourceType {
    Rss,
    Api,
    Scrape,
    Social,
}

/// Polling-frequency tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Lane {
    Fast,
    Official,
    Social,
    Media,
    Aggregator,
}

/// One news/event item as emitted by an adapter. `link` is the dedup key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewsItem {
    pub title: String,
    pub link: String,
    pub pub_date: DateTime<Utc>,
    /// Human-readable source name, e.g. "RBI".
    pub source: String,
    pub source_id: String,
    pub source_priority: SourcePriority,
}

/// Static catalog entry. Only `enabled` is toggled at runtime (through the registry).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceConfig {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub lane: Lane,
    pub priority: SourcePriority,
    pub poll_interval_minutes: u32,
    pub enabled: bool,
}

/// Provenance stamped onto every item an adapter produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTag {
    pub id: String,
    pub name: String,
    pub priority: SourcePriority,
}

impl SourceTag {
    pub fn new(id: impl Into<String>, name: impl Into<String>, priority: SourcePriority) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            priority,
        }
    }

    pub fn item(&self, title: String, link: String, pub_date: DateTime<Utc>) -> NewsItem {
        NewsItem {
            title,
            link,
            pub_date,
            source: self.name.clone(),
            source_id: self.id.clone(),
            source_priority: self.priority,
        }
    }
}

/// Everything an adapter needs for one fetch. Built fresh by the registry per dispatch.
#[derive(Clone)]
pub struct FetchContext {
    pub fetcher: Arc<RetryingFetcher>,
    /// Recency window; older items are dropped.
    pub hours_ago: u32,
    pub max_results: usize,
    pub now: DateTime<Utc>,
}

impl FetchContext {
    pub const DEFAULT_HOURS_AGO: u32 = 24;
    pub const DEFAULT_MAX_RESULTS: usize = 50;

    pub fn new(fetcher: Arc<RetryingFetcher>) -> Self {
        Self {
            fetcher,
            hours_ago: Self::DEFAULT_HOURS_AGO,
            max_results: Self::DEFAULT_MAX_RESULTS,
            now: Utc::now(),
        }
    }

    pub fn with_window(mut self, hours_ago: u32, max_results: usize) -> Self {
        self.hours_ago = hours_ago;
        self.max_results = max_results;
        self
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }
}

/// Failures an adapter reports to the registry. Every variant counts against the
/// source's circuit breaker; parse misses are not errors and never land here.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },
}

#[async_trait]
pub trait NewsSource: Send + Sync {
    fn id(&self) -> &str;
    async fn fetch(&self, ctx: &FetchContext) -> Result<Vec<NewsItem>, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_serializes_as_integer() {
        let s = serde_json::to_string(&SourcePriority::VerifiedMedia).unwrap();
        assert_eq!(s, "1");
        let p: SourcePriority = serde_json::from_str("0").unwrap();
        assert_eq!(p, SourcePriority::Official);
        assert!(serde_json::from_str::<SourcePriority>("7").is_err());
    }

    #[test]
    fn source_config_uses_wire_names() {
        let json = r#"{"id":"rbi","name":"RBI","type":"RSS","lane":"OFFICIAL","priority":0,
                       "poll_interval_minutes":10,"enabled":true}"#;
        let cfg: SourceConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.source_type, SourceType::Rss);
        assert_eq!(cfg.lane, Lane::Official);
        assert_eq!(cfg.priority, SourcePriority::Official);
    }
}
