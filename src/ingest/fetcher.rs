//! Retrying HTTP fetch for feed polling.
//!
//! One attempt per loop turn, each bounded by the policy timeout. Success and
//! 4xx come back as a [`FetchResponse`] straight away; 5xx, timeouts and
//! transport errors are retried with capped exponential backoff and end in
//! [`FetchError::Exhausted`] once the budget is spent.

use std::time::{Duration, Instant};

use metrics::counter;
use reqwest::header::USER_AGENT;
use thiserror::Error;
use tracing::{debug, warn};

use crate::ingest::cache::RssCache;

/// Government sites reject requests without a browser-like agent.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            timeout: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    /// Sleep before retrying after failed attempt number `attempt` (0-based):
    /// `min(initial_delay * multiplier^attempt, max_delay)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self
            .backoff_multiplier
            .max(1.0)
            .powi(attempt.min(i32::MAX as u32) as i32);
        let ms = self.initial_delay.as_millis() as f64 * factor;
        let cap = self.max_delay.as_millis() as f64;
        Duration::from_millis(ms.min(cap) as u64)
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Per-request knobs. GET only.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: Vec<(String, String)>,
    pub user_agent: Option<String>,
}

impl RequestOptions {
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl FetchResponse {
    pub fn is_ok(&self) -> bool {
        self.status < 400
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: String,
    },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("invalid request for {url}: {reason}")]
    InvalidRequest { url: String, reason: String },

    #[error("http client setup failed: {0}")]
    Client(String),
}

enum AttemptError {
    /// Retrying cannot help (malformed URL, bad header).
    Permanent(String),
    Transient(String),
}

fn classify(e: reqwest::Error) -> AttemptError {
    if e.is_builder() {
        AttemptError::Permanent(e.to_string())
    } else if e.is_timeout() {
        AttemptError::Transient(format!("timeout: {e}"))
    } else {
        AttemptError::Transient(e.to_string())
    }
}

pub struct RetryingFetcher {
    client: reqwest::Client,
    policy: RetryPolicy,
    cache: RssCache,
}

impl RetryingFetcher {
    pub fn new(policy: RetryPolicy) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self::with_client(client, policy))
    }

    pub fn with_client(client: reqwest::Client, policy: RetryPolicy) -> Self {
        Self {
            client,
            policy,
            cache: RssCache::new(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn cache(&self) -> &RssCache {
        &self.cache
    }

    /// `fetch_with_policy` with the fetcher's own policy.
    pub async fn fetch_with_retry(
        &self,
        url: &str,
        opts: &RequestOptions,
    ) -> Result<FetchResponse, FetchError> {
        self.fetch_with_policy(url, opts, &self.policy).await
    }

    pub async fn fetch_with_policy(
        &self,
        url: &str,
        opts: &RequestOptions,
        policy: &RetryPolicy,
    ) -> Result<FetchResponse, FetchError> {
        crate::ingest::ensure_metrics_described();

        let attempts = policy.total_attempts();
        let mut last = String::from("no attempt made");

        for attempt in 0..attempts {
            counter!("ingest_fetch_attempts_total").increment(1);
            debug!(target: "ingest", url, attempt, "fetch attempt");

            match self.attempt_once(url, opts, policy.timeout).await {
                Ok(resp) if resp.status < 400 => return Ok(resp),
                Ok(resp) if resp.status < 500 => {
                    debug!(target: "ingest", url, status = resp.status, "client error, not retrying");
                    return Ok(resp);
                }
                Ok(resp) => last = format!("HTTP {}", resp.status),
                Err(AttemptError::Permanent(reason)) => {
                    return Err(FetchError::InvalidRequest {
                        url: url.to_string(),
                        reason,
                    });
                }
                Err(AttemptError::Transient(reason)) => last = reason,
            }

            if attempt + 1 < attempts {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    target: "ingest",
                    url,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %last,
                    "fetch failed, retrying"
                );
                counter!("ingest_fetch_retries_total").increment(1);
                tokio::time::sleep(delay).await;
            }
        }

        Err(FetchError::Exhausted {
            url: url.to_string(),
            attempts,
            last,
        })
    }

    /// Feed fetch through the URL-keyed cache. Only successful payloads are stored;
    /// a non-ok response becomes [`FetchError::Status`].
    pub async fn fetch_rss_with_cache(
        &self,
        url: &str,
        opts: &RequestOptions,
        ttl: Duration,
    ) -> Result<String, FetchError> {
        crate::ingest::ensure_metrics_described();

        if let Some(body) = self.cache.get_fresh(url, ttl, Instant::now()) {
            counter!("ingest_rss_cache_hits_total").increment(1);
            debug!(target: "ingest", url, "rss cache hit");
            return Ok(body);
        }
        counter!("ingest_rss_cache_misses_total").increment(1);

        let resp = self.fetch_with_retry(url, opts).await?;
        if !resp.is_ok() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: resp.status,
            });
        }

        self.cache.insert(url, resp.body.clone(), Instant::now());
        Ok(resp.body)
    }

    async fn attempt_once(
        &self,
        url: &str,
        opts: &RequestOptions,
        timeout: Duration,
    ) -> Result<FetchResponse, AttemptError> {
        let mut req = self.client.get(url).timeout(timeout);
        if let Some(ua) = &opts.user_agent {
            req = req.header(USER_AGENT, ua.as_str());
        }
        for (name, value) in &opts.headers {
            req = req.header(name.as_str(), value.as_str());
        }

        let resp = req.send().await.map_err(classify)?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(classify)?;
        Ok(FetchResponse {
            url: url.to_string(),
            status,
            body,
        })
    }
}
