//! Live quote lookup.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::ingest::fetcher::{FetchError, RequestOptions, RetryingFetcher};

#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub ticker: String,
    pub price: f64,
    pub change_percent: f64,
    pub volume: u64,
    /// 10-day average volume when the provider has one.
    pub average_volume: Option<u64>,
}

#[derive(Debug, Error)]
pub enum QuoteError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("quote provider answered HTTP {0}")]
    Http(u16),

    #[error("unreadable quote payload: {0}")]
    Decode(String),
}

#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Latest quotes for the tickers the provider recognises; unknown tickers are simply absent.
    async fn quotes(&self, tickers: &[String]) -> Result<Vec<Quote>, QuoteError>;

    /// Ticker candidates for a free-text query. Providers without search return nothing.
    async fn search(&self, _query: &str) -> Result<Vec<String>, QuoteError> {
        Ok(Vec::new())
    }
}

pub const YAHOO_QUOTE_BASE: &str = "https://query1.finance.yahoo.com";

#[derive(Debug, Deserialize)]
struct QuoteEnvelope {
    #[serde(rename = "quoteResponse")]
    quote_response: QuoteResponse,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(default)]
    result: Vec<YahooQuote>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YahooQuote {
    symbol: String,
    regular_market_price: Option<f64>,
    regular_market_change_percent: Option<f64>,
    regular_market_volume: Option<u64>,
    average_daily_volume10_day: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    #[serde(default)]
    quotes: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    symbol: Option<String>,
}

/// Decode a v7 quote payload. Rows without a price are dropped (an empty quote).
pub fn parse_quotes(body: &str) -> Result<Vec<Quote>, QuoteError> {
    let env: QuoteEnvelope =
        serde_json::from_str(body).map_err(|e| QuoteError::Decode(e.to_string()))?;
    Ok(env
        .quote_response
        .result
        .into_iter()
        .filter_map(|q| {
            Some(Quote {
                price: q.regular_market_price?,
                change_percent: q.regular_market_change_percent.unwrap_or(0.0),
                volume: q.regular_market_volume.unwrap_or(0),
                average_volume: q.average_daily_volume10_day,
                ticker: q.symbol,
            })
        })
        .collect())
}

pub struct YahooQuoteProvider {
    fetcher: Arc<RetryingFetcher>,
    base_url: String,
}

impl YahooQuoteProvider {
    pub fn new(fetcher: Arc<RetryingFetcher>) -> Self {
        Self {
            fetcher,
            base_url: YAHOO_QUOTE_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get(&self, url: &str) -> Result<String, QuoteError> {
        let resp = self
            .fetcher
            .fetch_with_retry(url, &RequestOptions::default())
            .await?;
        if !resp.is_ok() {
            return Err(QuoteError::Http(resp.status));
        }
        Ok(resp.body)
    }
}

#[async_trait]
impl QuoteProvider for YahooQuoteProvider {
    async fn quotes(&self, tickers: &[String]) -> Result<Vec<Quote>, QuoteError> {
        if tickers.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!(
            "{}/v7/finance/quote?symbols={}",
            self.base_url,
            tickers.join(",")
        );
        parse_quotes(&self.get(&url).await?)
    }

    async fn search(&self, query: &str) -> Result<Vec<String>, QuoteError> {
        let q: String = query
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '+' })
            .collect();
        let url = format!("{}/v1/finance/search?q={}&quotesCount=8&newsCount=0", self.base_url, q);
        let body = self.get(&url).await?;
        let env: SearchEnvelope =
            serde_json::from_str(&body).map_err(|e| QuoteError::Decode(e.to_string()))?;
        Ok(env.quotes.into_iter().filter_map(|h| h.symbol).collect())
    }
}
