// src/config/mod.rs
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::ingest::circuit_breaker::BreakerConfig;
use crate::ingest::fetcher::{RetryPolicy, RetryingFetcher};
use crate::ingest::types::FetchContext;
use crate::market::quote::YahooQuoteProvider;
use crate::market::validator::{default_keyword_tickers, MarketValidator, ValidatorConfig};

pub const ENV_PATH: &str = "CATALYST_CONFIG_PATH";
pub const DEFAULT_PATH: &str = "config/catalyst.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSection {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub timeout_ms: u64,
    pub rss_cache_ttl_secs: u64,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            timeout_ms: 15_000,
            rss_cache_ttl_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSection {
    pub failure_threshold: u32,
    pub reset_timeout_secs: u64,
    pub half_open_max_attempts: u32,
}

impl Default for BreakerSection {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout_secs: 300,
            half_open_max_attempts: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSection {
    pub hours_ago: u32,
    pub max_results: usize,
}

impl Default for WindowSection {
    fn default() -> Self {
        Self {
            hours_ago: FetchContext::DEFAULT_HOURS_AGO,
            max_results: FetchContext::DEFAULT_MAX_RESULTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketSection {
    /// Exchange session timezone; IST by default.
    pub session_utc_offset_minutes: i32,
    /// Extra keyword → futures ticker pairs, checked before the built-in table.
    pub keywords: BTreeMap<String, String>,
    /// Symbol → ticker, highest priority after an asset's own override.
    pub overrides: BTreeMap<String, String>,
    pub quote_base_url: Option<String>,
}

impl Default for MarketSection {
    fn default() -> Self {
        Self {
            session_utc_offset_minutes: 330,
            keywords: BTreeMap::new(),
            overrides: BTreeMap::new(),
            quote_base_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
    pub tick_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            tick_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchlistSection {
    pub symbols: Vec<String>,
    /// Known symbol → exchange scrip code pairs.
    pub codes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceOverride {
    pub id: String,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub poll_interval_minutes: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub fetch: FetchSection,
    pub breaker: BreakerSection,
    pub window: WindowSection,
    pub market: MarketSection,
    pub server: ServerSection,
    pub watchlist: WatchlistSection,
    pub sources: Vec<SourceOverride>,
}

impl AppConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: AppConfig = toml::from_str(s)?;
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&data).with_context(|| format!("parsing {}", path.display()))
    }

    /// 1) $CATALYST_CONFIG_PATH  2) config/catalyst.toml  3) defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_PATH} points to non-existent path"));
            }
            return Self::load_from_file(&pb);
        }
        let default = PathBuf::from(DEFAULT_PATH);
        if default.exists() {
            return Self::load_from_file(&default);
        }
        Ok(Self::default())
    }

    /// Out-of-range values fall back to defaults instead of failing startup.
    pub fn sanitize(&mut self) {
        let fd = FetchSection::default();
        let f = &mut self.fetch;
        if f.timeout_ms == 0 {
            f.timeout_ms = fd.timeout_ms;
        }
        if !f.backoff_multiplier.is_finite() || f.backoff_multiplier < 1.0 {
            f.backoff_multiplier = fd.backoff_multiplier;
        }
        if f.initial_delay_ms > f.max_delay_ms {
            std::mem::swap(&mut f.initial_delay_ms, &mut f.max_delay_ms);
        }

        let bd = BreakerSection::default();
        if self.breaker.failure_threshold == 0 {
            self.breaker.failure_threshold = bd.failure_threshold;
        }
        if self.breaker.reset_timeout_secs == 0 {
            self.breaker.reset_timeout_secs = bd.reset_timeout_secs;
        }

        let wd = WindowSection::default();
        if self.window.hours_ago == 0 {
            self.window.hours_ago = wd.hours_ago;
        }
        if self.window.max_results == 0 {
            self.window.max_results = wd.max_results;
        }

        if self.market.session_utc_offset_minutes.abs() > 14 * 60 {
            self.market.session_utc_offset_minutes = MarketSection::default().session_utc_offset_minutes;
        }

        let sd = ServerSection::default();
        if self.server.bind.trim().is_empty() {
            self.server.bind = sd.bind;
        }
        if self.server.tick_secs == 0 {
            self.server.tick_secs = sd.tick_secs;
        }

        self.watchlist.symbols = clean_symbols(std::mem::take(&mut self.watchlist.symbols));
        self.sources.retain(|o| !o.id.trim().is_empty());
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.fetch.max_retries,
            initial_delay: Duration::from_millis(self.fetch.initial_delay_ms),
            max_delay: Duration::from_millis(self.fetch.max_delay_ms),
            backoff_multiplier: self.fetch.backoff_multiplier,
            timeout: Duration::from_millis(self.fetch.timeout_ms),
        }
    }

    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.breaker.failure_threshold,
            reset_timeout: Duration::from_secs(self.breaker.reset_timeout_secs),
            half_open_max_attempts: self.breaker.half_open_max_attempts,
        }
    }

    pub fn rss_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.fetch.rss_cache_ttl_secs)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.server.tick_secs)
    }

    pub fn session_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.market.session_utc_offset_minutes * 60)
            .unwrap_or_else(crate::ingest::providers::ist)
    }

    pub fn validator_config(&self) -> ValidatorConfig {
        let mut keyword_tickers: Vec<(String, String)> = self
            .market
            .keywords
            .iter()
            .map(|(k, v)| (k.to_lowercase(), v.trim().to_string()))
            .collect();
        keyword_tickers.extend(default_keyword_tickers());
        ValidatorConfig {
            keyword_tickers,
            overrides: self
                .market
                .overrides
                .iter()
                .map(|(k, v)| (k.trim().to_ascii_uppercase(), v.trim().to_string()))
                .collect(),
            session_offset: self.session_offset(),
        }
    }

    /// Quote client honouring `[market] quote_base_url`.
    pub fn quote_provider(&self, fetcher: Arc<RetryingFetcher>) -> YahooQuoteProvider {
        let provider = YahooQuoteProvider::new(fetcher);
        match self
            .market
            .quote_base_url
            .as_deref()
            .map(|u| u.trim().trim_end_matches('/'))
            .filter(|u| !u.is_empty())
        {
            Some(base) => provider.with_base_url(base),
            None => provider,
        }
    }

    pub fn market_validator(&self, fetcher: Arc<RetryingFetcher>) -> MarketValidator {
        MarketValidator::new(Arc::new(self.quote_provider(fetcher)), self.validator_config())
    }

    pub fn source_override(&self, id: &str) -> Option<&SourceOverride> {
        self.sources.iter().find(|o| o.id == id)
    }
}

fn clean_symbols(items: Vec<String>) -> Vec<String> {
    use std::collections::BTreeSet;
    items
        .into_iter()
        .map(|s| s.trim().to_ascii_uppercase())
        .filter(|s| !s.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
