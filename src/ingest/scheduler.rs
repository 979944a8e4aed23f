// src/ingest/scheduler.rs
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::ingest::dedup::LinkDeduper;
use crate::ingest::registry::{FetchOutcome, RegisteredSource, SourceRegistry};
use crate::ingest::types::NewsItem;

/// Links remembered by the ingest loop before the oldest are forgotten.
pub const DEDUP_CAPACITY: usize = 20_000;

/// Min-heap of next due times, one slot per source with a non-zero interval.
///
/// Each source runs on its own grid `start + k × interval`. Disabled sources
/// keep their slot so that re-enabling them at runtime resumes the cadence.
pub struct DueScheduler {
    sources: Vec<Arc<RegisteredSource>>,
    heap: BinaryHeap<Reverse<(DateTime<Utc>, usize)>>,
}

impl DueScheduler {
    pub fn new(sources: Vec<Arc<RegisteredSource>>, start: DateTime<Utc>) -> Self {
        let heap = sources
            .iter()
            .enumerate()
            .filter(|(_, s)| s.poll_interval_minutes() > 0)
            .map(|(i, _)| Reverse((start, i)))
            .collect();
        Self { sources, heap }
    }

    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.heap.peek().map(|Reverse((at, _))| *at)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Enabled sources due at or before `now`. Each popped slot moves to the first
    /// point on its grid strictly after `now`, so a late tick fires a source once.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Vec<Arc<RegisteredSource>> {
        let mut due = Vec::new();
        while let Some(Reverse((at, idx))) = self.heap.peek().copied() {
            if at > now {
                break;
            }
            self.heap.pop();

            let src = &self.sources[idx];
            let every = ChronoDuration::minutes(i64::from(src.poll_interval_minutes()));
            let missed = (now - at).num_seconds() / every.num_seconds();
            let next = at + every * (missed as i32 + 1);
            self.heap.push(Reverse((next, idx)));

            if src.is_enabled() {
                due.push(src.clone());
            }
        }
        due
    }
}

#[derive(Debug, Default)]
pub struct TickReport {
    pub outcomes: Vec<FetchOutcome>,
    /// Items not emitted before, across all sources fetched this tick.
    pub fresh: Vec<NewsItem>,
}

/// One scheduler step: fetch what is due, drop links already emitted, fill in `new_items`.
pub async fn run_tick(
    registry: &SourceRegistry,
    sched: &mut DueScheduler,
    dedup: &mut LinkDeduper,
    now: DateTime<Utc>,
) -> TickReport {
    let due = sched.pop_due(now);
    if due.is_empty() {
        return TickReport::default();
    }

    let mut outcomes = registry.fetch_from_sources(&due).await;
    let mut fresh = Vec::new();
    for o in outcomes.iter_mut() {
        let new = dedup.retain_new(std::mem::take(&mut o.items));
        o.new_items = new.len();
        fresh.extend(new);
    }
    TickReport { outcomes, fresh }
}

/// Drive the registry forever, sending newly seen items to `sink`.
/// The loop stops once the receiving side is dropped.
pub fn spawn_ingest_loop(
    registry: Arc<SourceRegistry>,
    sink: mpsc::Sender<NewsItem>,
    tick: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut sched = DueScheduler::new(registry.all_sources().to_vec(), Utc::now());
        let mut dedup = LinkDeduper::with_capacity(DEDUP_CAPACITY);
        let mut ticker = tokio::time::interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let now = Utc::now();
            let report = run_tick(&registry, &mut sched, &mut dedup, now).await;
            if report.outcomes.is_empty() {
                continue;
            }

            let failed = report.outcomes.iter().filter(|o| !o.success).count();
            counter!("ingest_runs_total").increment(1);
            gauge!("ingest_pipeline_last_run_ts").set(now.timestamp() as f64);
            tracing::info!(
                target: "ingest",
                sources = report.outcomes.len(),
                failed,
                new_items = report.fresh.len(),
                "ingest tick"
            );
            for o in report.outcomes.iter().filter(|o| !o.success) {
                tracing::debug!(
                    target: "ingest",
                    source_id = %o.source_id,
                    error = o.error.as_deref().unwrap_or_default(),
                    "source failed this tick"
                );
            }

            for item in report.fresh {
                if sink.send(item).await.is_err() {
                    tracing::info!(target: "ingest", "item receiver dropped, stopping ingest loop");
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::circuit_breaker::CircuitBreaker;
    use crate::ingest::fetcher::{RetryPolicy, RetryingFetcher};
    use crate::ingest::types::{
        FetchContext, Lane, NewsSource, SourceConfig, SourceError, SourcePriority, SourceType,
    };
    use async_trait::async_trait;
    use chrono::TimeZone;

    struct Noop(&'static str);

    #[async_trait]
    impl NewsSource for Noop {
        fn id(&self) -> &str {
            self.0
        }
        async fn fetch(&self, _ctx: &FetchContext) -> Result<Vec<NewsItem>, SourceError> {
            Ok(vec![])
        }
    }

    fn registry(spec: &[(&'static str, u32, bool)]) -> SourceRegistry {
        let fetcher = Arc::new(RetryingFetcher::with_client(
            reqwest::Client::new(),
            RetryPolicy::default(),
        ));
        let mut r = SourceRegistry::new(fetcher, CircuitBreaker::default());
        for (id, every, enabled) in spec {
            r.register(
                SourceConfig {
                    id: id.to_string(),
                    name: id.to_string(),
                    source_type: SourceType::Rss,
                    lane: Lane::Official,
                    priority: SourcePriority::Official,
                    poll_interval_minutes: *every,
                    enabled: *enabled,
                },
                Arc::new(Noop(id)),
            )
            .unwrap();
        }
        r
    }

    fn ids(v: &[Arc<RegisteredSource>]) -> Vec<&str> {
        let mut out: Vec<&str> = v.iter().map(|s| s.id()).collect();
        out.sort();
        out
    }

    #[test]
    fn everything_is_due_at_start_then_follows_its_grid() {
        let r = registry(&[("fast", 5, true), ("slow", 15, true)]);
        let t0 = Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap();
        let mut s = DueScheduler::new(r.all_sources().to_vec(), t0);

        assert_eq!(ids(&s.pop_due(t0)), vec!["fast", "slow"]);
        assert_eq!(s.next_due(), Some(t0 + ChronoDuration::minutes(5)));
        assert!(s.pop_due(t0 + ChronoDuration::minutes(4)).is_empty());
        assert_eq!(ids(&s.pop_due(t0 + ChronoDuration::minutes(5))), vec!["fast"]);
        assert_eq!(
            ids(&s.pop_due(t0 + ChronoDuration::minutes(15))),
            vec!["fast", "slow"]
        );
    }

    #[test]
    fn late_tick_fires_once_and_realigns() {
        let r = registry(&[("fast", 5, true)]);
        let t0 = Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap();
        let mut s = DueScheduler::new(r.all_sources().to_vec(), t0);
        s.pop_due(t0);

        let late = t0 + ChronoDuration::minutes(23);
        assert_eq!(s.pop_due(late).len(), 1);
        assert_eq!(s.next_due(), Some(t0 + ChronoDuration::minutes(25)));
    }

    #[test]
    fn disabled_and_zero_interval_sources_are_not_dispatched() {
        let r = registry(&[("on", 5, true), ("off", 5, false), ("never", 0, true)]);
        let t0 = Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap();
        let mut s = DueScheduler::new(r.all_sources().to_vec(), t0);
        assert_eq!(s.len(), 2);
        assert_eq!(ids(&s.pop_due(t0)), vec!["on"]);

        r.set_enabled("off", true);
        assert_eq!(
            ids(&s.pop_due(t0 + ChronoDuration::minutes(5))),
            vec!["off", "on"]
        );
    }
}
