//! # Market Validator
//! Confirms a detected catalyst against live price and volume.
//!
//! Resolution order for the instrument: explicit override on the asset, the
//! configured per-symbol overrides, the keyword → global futures table (for
//! commodity-like assets whose domestic quotes lag), then the asset's own NSE
//! listing for equities and ETFs. An unresolvable asset is a normal `None`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Timelike, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::market::quote::{Quote, QuoteProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetType {
    Equity,
    Etf,
    Commodity,
    MutualFund,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub symbol: String,
    pub name: String,
    pub asset_type: AssetType,
    /// Explicit instrument to check instead of the listing.
    #[serde(default)]
    pub validation_ticker: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sentiment {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketConfirmation {
    pub ticker: String,
    pub current_price: f64,
    pub price_change_percent: f64,
    pub current_volume: u64,
    pub average_volume: u64,
    pub volume_ratio: f64,
    pub volume_spike: bool,
    pub is_trending: bool,
    pub price_confirms_sentiment: bool,
}

/// Keyword → global futures ticker, matched case-insensitively as whole words of symbol and name.
pub fn default_keyword_tickers() -> Vec<(String, String)> {
    [
        ("gold", "GC=F"),
        ("silver", "SI=F"),
        ("crude", "CL=F"),
        ("oil", "CL=F"),
        ("natural gas", "NG=F"),
        ("natgas", "NG=F"),
        ("copper", "HG=F"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Checked in order; first hit wins.
    pub keyword_tickers: Vec<(String, String)>,
    /// Upper-case symbol → ticker.
    pub overrides: HashMap<String, String>,
    /// Exchange session timezone for the volume-spike hour scaling.
    pub session_offset: FixedOffset,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            keyword_tickers: default_keyword_tickers(),
            overrides: HashMap::new(),
            session_offset: crate::ingest::providers::ist(),
        }
    }
}

pub const SPIKE_BASE_MULTIPLE: f64 = 1.5;
pub const TRENDING_MOVE_PERCENT: f64 = 2.0;
pub const TRENDING_VOLUME_RATIO: f64 = 2.0;

/// `1.5 × clamp(hour / 16, 0.1, 1)`: volume accumulates through the session,
/// so the bar is lower near the open.
pub fn volume_spike_threshold(hour_of_day: u32) -> f64 {
    SPIKE_BASE_MULTIPLE * (f64::from(hour_of_day) / 16.0).clamp(0.1, 1.0)
}

pub fn price_confirms(sentiment: Sentiment, price_change_percent: f64) -> bool {
    match sentiment {
        Sentiment::Bullish => price_change_percent > 0.0,
        Sentiment::Bearish => price_change_percent < 0.0,
        Sentiment::Neutral => price_change_percent.abs() < 1.0,
    }
}

/// Pure scoring of one quote.
pub fn build_confirmation(quote: &Quote, sentiment: Sentiment, hour_of_day: u32) -> MarketConfirmation {
    let current = quote.volume;
    let average = quote.average_volume.filter(|v| *v > 0).unwrap_or(current);
    let volume_ratio = if average > 0 {
        current as f64 / average as f64
    } else {
        1.0
    };
    let volume_spike = volume_ratio > volume_spike_threshold(hour_of_day);
    let pct = quote.change_percent;

    MarketConfirmation {
        ticker: quote.ticker.clone(),
        current_price: quote.price,
        price_change_percent: pct,
        current_volume: current,
        average_volume: average,
        volume_ratio,
        volume_spike,
        is_trending: pct.abs() >= TRENDING_MOVE_PERCENT || volume_ratio >= TRENDING_VOLUME_RATIO,
        price_confirms_sentiment: price_confirms(sentiment, pct),
    }
}

/// Any one strong indicator is enough.
pub fn should_act_on_signal(c: &MarketConfirmation) -> bool {
    (c.price_confirms_sentiment && c.volume_spike)
        || (c.price_confirms_sentiment && c.price_change_percent.abs() > 1.0)
        || (c.volume_spike && c.volume_ratio > 2.0)
}

/// Lowercased alphanumeric words, so "Soil" never matches "oil".
fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn contains_phrase(hay: &[String], phrase: &[String]) -> bool {
    !phrase.is_empty() && hay.windows(phrase.len()).any(|w| w == phrase)
}

fn alternate_suffix(ticker: &str) -> Option<String> {
    if let Some(base) = ticker.strip_suffix(".NS") {
        Some(format!("{base}.BO"))
    } else {
        ticker.strip_suffix(".BO").map(|base| format!("{base}.NS"))
    }
}

pub struct MarketValidator {
    quotes: Arc<dyn QuoteProvider>,
    cfg: ValidatorConfig,
}

impl MarketValidator {
    pub fn new(quotes: Arc<dyn QuoteProvider>, cfg: ValidatorConfig) -> Self {
        Self { quotes, cfg }
    }

    pub fn get_validation_ticker(&self, asset: &Asset) -> Option<String> {
        if let Some(t) = asset
            .validation_ticker
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            return Some(t.to_string());
        }

        let symbol = asset.symbol.trim().to_ascii_uppercase();
        if let Some(t) = self.cfg.overrides.get(&symbol) {
            return Some(t.clone());
        }

        // Equities trade on their own listing even when the name mentions a commodity.
        if asset.asset_type != AssetType::Equity {
            let hay = words(&format!("{} {}", asset.symbol, asset.name));
            if let Some((_, t)) = self
                .cfg
                .keyword_tickers
                .iter()
                .find(|(kw, _)| contains_phrase(&hay, &words(kw)))
            {
                return Some(t.clone());
            }
        }

        match asset.asset_type {
            AssetType::Equity | AssetType::Etf if !symbol.is_empty() => {
                if symbol.contains('.') || symbol.contains('=') {
                    Some(symbol)
                } else {
                    Some(format!("{symbol}.NS"))
                }
            }
            _ => None,
        }
    }

    pub async fn validate_with_market(
        &self,
        asset: &Asset,
        sentiment: Sentiment,
    ) -> Option<MarketConfirmation> {
        self.validate_with_market_at(asset, sentiment, Utc::now()).await
    }

    pub async fn validate_with_market_at(
        &self,
        asset: &Asset,
        sentiment: Sentiment,
        now: DateTime<Utc>,
    ) -> Option<MarketConfirmation> {
        crate::market::ensure_metrics_described();
        let Some(ticker) = self.get_validation_ticker(asset) else {
            debug!(target: "market", symbol = %asset.symbol, "no validation ticker");
            counter!("market_validations_total", "outcome" => "no_ticker").increment(1);
            return None;
        };

        let Some(quote) = self.fetch_quote(&ticker).await else {
            counter!("market_validations_total", "outcome" => "no_quote").increment(1);
            if let Some(suggested) = self.suggest_ticker_correction(asset).await {
                // Advisory only; the override table is not updated.
                warn!(
                    target: "market",
                    symbol = %asset.symbol,
                    tried = %ticker,
                    suggested = %suggested,
                    "no quote for validation ticker; consider an override"
                );
            }
            return None;
        };

        let hour = now.with_timezone(&self.cfg.session_offset).hour();
        let c = build_confirmation(&quote, sentiment, hour);
        counter!("market_validations_total", "outcome" => "confirmed").increment(1);
        info!(
            target: "market",
            ticker = %c.ticker,
            change = c.price_change_percent,
            ratio = c.volume_ratio,
            spike = c.volume_spike,
            confirms = c.price_confirms_sentiment,
            "market check"
        );
        Some(c)
    }

    /// Primary ticker, then the alternate exchange suffix once if the first came back empty.
    async fn fetch_quote(&self, ticker: &str) -> Option<Quote> {
        if let Some(q) = self.quote_one(ticker).await {
            return Some(q);
        }
        let alt = alternate_suffix(ticker)?;
        debug!(target: "market", primary = ticker, alternate = %alt, "empty quote, trying alternate exchange");
        self.quote_one(&alt).await
    }

    async fn quote_one(&self, ticker: &str) -> Option<Quote> {
        match self.quotes.quotes(&[ticker.to_string()]).await {
            Ok(qs) => qs.into_iter().find(|q| q.ticker.eq_ignore_ascii_case(ticker)),
            Err(e) => {
                warn!(target: "market", ticker, error = %e, "quote lookup failed");
                None
            }
        }
    }

    /// Closest search candidate to the asset symbol (Jaro-Winkler ≥ 0.8), if any.
    pub async fn suggest_ticker_correction(&self, asset: &Asset) -> Option<String> {
        let query = if asset.name.trim().is_empty() {
            asset.symbol.as_str()
        } else {
            asset.name.as_str()
        };
        let candidates = match self.quotes.search(query).await {
            Ok(c) => c,
            Err(e) => {
                debug!(target: "market", error = %e, "ticker search failed");
                return None;
            }
        };

        let want = asset.symbol.trim().to_ascii_uppercase();
        candidates
            .into_iter()
            .map(|c| {
                let base = c.split('.').next().unwrap_or_default().to_ascii_uppercase();
                (strsim::jaro_winkler(&want, &base), c)
            })
            .filter(|(score, _)| *score >= 0.8)
            // Ties keep the provider's ranking.
            .fold(None::<(f64, String)>, |best, (score, c)| match best {
                Some((b, _)) if b >= score => best,
                _ => Some((score, c)),
            })
            .map(|(_, c)| c)
    }
}
