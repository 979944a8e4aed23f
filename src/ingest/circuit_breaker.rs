//! Per-source circuit breaker.
//!
//! Closed → Open after `failure_threshold` consecutive failures. Open refuses
//! calls until `reset_timeout` has passed since the last failure; the first
//! availability check after that moves the source to HalfOpen. In HalfOpen a
//! success closes the circuit and a single failure re-opens it.
//!
//! State lives in one map keyed by source id and is created lazily. It is not
//! persisted: a fresh breaker starts every source Closed.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitStatus {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitState {
    pub status: CircuitStatus,
    pub failure_count: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub last_success_time: Option<DateTime<Utc>>,
}

impl Default for CircuitState {
    fn default() -> Self {
        Self {
            status: CircuitStatus::Closed,
            failure_count: 0,
            last_failure_time: None,
            last_success_time: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    /// Carried for configuration compatibility; HalfOpen does not limit concurrent probes.
    pub half_open_max_attempts: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(5 * 60),
            half_open_max_attempts: 1,
        }
    }
}

#[derive(Debug, Default)]
pub struct CircuitBreaker {
    cfg: BreakerConfig,
    states: Mutex<HashMap<String, CircuitState>>,
}

impl CircuitBreaker {
    pub fn new(cfg: BreakerConfig) -> Self {
        Self {
            cfg,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.cfg
    }

    pub fn is_available(&self, source_id: &str) -> bool {
        self.is_available_at(source_id, Utc::now())
    }

    /// May advance Open → HalfOpen once the reset timeout has elapsed.
    pub fn is_available_at(&self, source_id: &str, now: DateTime<Utc>) -> bool {
        let mut states = self.states.lock();
        let st = states.entry(source_id.to_string()).or_default();
        match st.status {
            CircuitStatus::Closed | CircuitStatus::HalfOpen => true,
            CircuitStatus::Open => {
                if self.cooldown_elapsed(st, now) {
                    st.status = CircuitStatus::HalfOpen;
                    info!(target: "ingest", source_id, "circuit half-open, probing");
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self, source_id: &str) {
        self.record_success_at(source_id, Utc::now())
    }

    pub fn record_success_at(&self, source_id: &str, now: DateTime<Utc>) {
        let mut states = self.states.lock();
        let st = states.entry(source_id.to_string()).or_default();
        st.failure_count = 0;
        st.last_success_time = Some(now);
        if st.status != CircuitStatus::Closed {
            info!(target: "ingest", source_id, from = ?st.status, "circuit closed");
            st.status = CircuitStatus::Closed;
        }
    }

    pub fn record_failure(&self, source_id: &str) {
        self.record_failure_at(source_id, Utc::now())
    }

    pub fn record_failure_at(&self, source_id: &str, now: DateTime<Utc>) {
        let mut states = self.states.lock();
        let st = states.entry(source_id.to_string()).or_default();
        st.failure_count = st.failure_count.saturating_add(1);
        st.last_failure_time = Some(now);

        let trip = match st.status {
            CircuitStatus::HalfOpen => true,
            CircuitStatus::Closed => st.failure_count >= self.cfg.failure_threshold,
            CircuitStatus::Open => false,
        };
        if trip {
            warn!(
                target: "ingest",
                source_id,
                failures = st.failure_count,
                from = ?st.status,
                "circuit opened"
            );
            st.status = CircuitStatus::Open;
            counter!("ingest_breaker_opened_total").increment(1);
        }
    }

    /// Force one source back to a pristine Closed state.
    pub fn reset(&self, source_id: &str) {
        let mut states = self.states.lock();
        states.insert(source_id.to_string(), CircuitState::default());
        info!(target: "ingest", source_id, "circuit manually reset");
    }

    pub fn reset_all(&self) {
        self.states.lock().clear();
        info!(target: "ingest", "all circuits reset");
    }

    /// Current state without side effects; unknown ids read as Closed.
    pub fn state(&self, source_id: &str) -> CircuitState {
        self.states
            .lock()
            .get(source_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> Vec<(String, CircuitState)> {
        let mut all: Vec<_> = self
            .states
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    fn cooldown_elapsed(&self, st: &CircuitState, now: DateTime<Utc>) -> bool {
        match st.last_failure_time {
            // Negative durations (clock stepped back) count as not elapsed.
            Some(t) => (now - t)
                .to_std()
                .map(|d| d >= self.cfg.reset_timeout)
                .unwrap_or(false),
            None => true,
        }
    }
}
