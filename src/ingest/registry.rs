//! Source catalog + circuit-gated dispatch.
//!
//! `fetch_from_source` never fails: breaker rejections, adapter errors and even
//! adapter panics come back as a [`FetchOutcome`] with `success == false`.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use futures::FutureExt;
use metrics::{counter, histogram};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::ingest::circuit_breaker::CircuitBreaker;
use crate::ingest::fetcher::RetryingFetcher;
use crate::ingest::types::{FetchContext, NewsItem, NewsSource, SourceConfig};

pub const CIRCUIT_OPEN_ERROR: &str = "Circuit breaker is OPEN";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("source id `{0}` is already registered")]
    DuplicateId(String),

    #[error("adapter id `{adapter}` does not match config id `{config}`")]
    IdMismatch { config: String, adapter: String },
}

pub struct RegisteredSource {
    config: SourceConfig,
    enabled: AtomicBool,
    source: Arc<dyn NewsSource>,
}

impl RegisteredSource {
    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn poll_interval_minutes(&self) -> u32 {
        self.config.poll_interval_minutes
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Static config with the live `enabled` flag.
    pub fn config(&self) -> SourceConfig {
        let mut c = self.config.clone();
        c.enabled = self.is_enabled();
        c
    }
}

/// Result record for one source dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct FetchOutcome {
    pub source_id: String,
    pub source_name: String,
    pub success: bool,
    pub items_found: usize,
    /// Filled in by the consumer after link dedup; equals `items_found` until then.
    pub new_items: usize,
    #[serde(skip)]
    pub items: Vec<NewsItem>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl FetchOutcome {
    fn succeeded(src: &RegisteredSource, items: Vec<NewsItem>, duration_ms: u64) -> Self {
        Self {
            source_id: src.id().to_string(),
            source_name: src.name().to_string(),
            success: true,
            items_found: items.len(),
            new_items: items.len(),
            items,
            error: None,
            duration_ms,
        }
    }

    fn failed(src: &RegisteredSource, error: String, duration_ms: u64) -> Self {
        Self {
            source_id: src.id().to_string(),
            source_name: src.name().to_string(),
            success: false,
            items_found: 0,
            new_items: 0,
            items: Vec::new(),
            error: Some(error),
            duration_ms,
        }
    }
}

pub struct SourceRegistry {
    entries: Vec<Arc<RegisteredSource>>,
    breaker: CircuitBreaker,
    fetcher: Arc<RetryingFetcher>,
    hours_ago: u32,
    max_results: usize,
}

impl SourceRegistry {
    pub fn new(fetcher: Arc<RetryingFetcher>, breaker: CircuitBreaker) -> Self {
        Self {
            entries: Vec::new(),
            breaker,
            fetcher,
            hours_ago: FetchContext::DEFAULT_HOURS_AGO,
            max_results: FetchContext::DEFAULT_MAX_RESULTS,
        }
    }

    pub fn with_window(mut self, hours_ago: u32, max_results: usize) -> Self {
        self.hours_ago = hours_ago;
        self.max_results = max_results;
        self
    }

    pub fn register(
        &mut self,
        config: SourceConfig,
        source: Arc<dyn NewsSource>,
    ) -> Result<(), RegistryError> {
        if source.id() != config.id {
            return Err(RegistryError::IdMismatch {
                config: config.id,
                adapter: source.id().to_string(),
            });
        }
        if self.entries.iter().any(|e| e.id() == config.id) {
            return Err(RegistryError::DuplicateId(config.id));
        }
        let enabled = AtomicBool::new(config.enabled);
        self.entries.push(Arc::new(RegisteredSource {
            config,
            enabled,
            source,
        }));
        Ok(())
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn all_sources(&self) -> &[Arc<RegisteredSource>] {
        &self.entries
    }

    pub fn get_source(&self, id: &str) -> Option<Arc<RegisteredSource>> {
        self.entries.iter().find(|e| e.id() == id).cloned()
    }

    /// Returns false for unknown ids.
    pub fn set_enabled(&self, id: &str, enabled: bool) -> bool {
        match self.entries.iter().find(|e| e.id() == id) {
            Some(e) => {
                e.enabled.store(enabled, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    pub fn get_enabled_sources(&self) -> Vec<Arc<RegisteredSource>> {
        self.entries
            .iter()
            .filter(|e| e.is_enabled())
            .cloned()
            .collect()
    }

    /// Enabled sources whose poll interval divides `minute_of_hour`.
    pub fn get_sources_for_interval(&self, minute_of_hour: u32) -> Vec<Arc<RegisteredSource>> {
        self.entries
            .iter()
            .filter(|e| e.is_enabled())
            .filter(|e| {
                let every = e.poll_interval_minutes();
                every > 0 && minute_of_hour % every == 0
            })
            .cloned()
            .collect()
    }

    pub fn context(&self) -> FetchContext {
        FetchContext::new(self.fetcher.clone())
            .with_window(self.hours_ago, self.max_results)
            .at(Utc::now())
    }

    pub async fn fetch_from_source(&self, src: &RegisteredSource) -> FetchOutcome {
        crate::ingest::ensure_metrics_described();
        let id = src.id();

        if !self.breaker.is_available(id) {
            debug!(target: "ingest", source_id = id, "skipped, circuit open");
            counter!("ingest_source_fetch_total", "outcome" => "circuit_open").increment(1);
            return FetchOutcome::failed(src, CIRCUIT_OPEN_ERROR.to_string(), 0);
        }

        let ctx = self.context();
        let t0 = Instant::now();
        let res = AssertUnwindSafe(src.source.fetch(&ctx)).catch_unwind().await;
        let ms = t0.elapsed().as_millis() as u64;
        histogram!("ingest_source_fetch_ms").record(ms as f64);

        match res {
            Ok(Ok(items)) => {
                self.breaker.record_success(id);
                counter!("ingest_source_fetch_total", "outcome" => "ok").increment(1);
                counter!("ingest_items_total").increment(items.len() as u64);
                debug!(target: "ingest", source_id = id, items = items.len(), ms, "source ok");
                FetchOutcome::succeeded(src, items, ms)
            }
            Ok(Err(e)) => {
                self.breaker.record_failure(id);
                counter!("ingest_source_fetch_total", "outcome" => "error").increment(1);
                warn!(target: "ingest", source_id = id, error = %e, ms, "source fetch failed");
                FetchOutcome::failed(src, e.to_string(), ms)
            }
            Err(panic) => {
                self.breaker.record_failure(id);
                counter!("ingest_source_fetch_total", "outcome" => "error").increment(1);
                let msg = panic_message(&*panic);
                warn!(target: "ingest", source_id = id, error = %msg, "source adapter panicked");
                FetchOutcome::failed(src, format!("adapter panicked: {msg}"), ms)
            }
        }
    }

    /// All sources concurrently; one outcome per input, in input order.
    pub async fn fetch_from_sources(&self, sources: &[Arc<RegisteredSource>]) -> Vec<FetchOutcome> {
        join_all(sources.iter().map(|s| self.fetch_from_source(s))).await
    }
}

fn panic_message(p: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = p.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = p.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
