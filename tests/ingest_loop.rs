use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use catalyst_ingest::ingest::circuit_breaker::CircuitBreaker;
use catalyst_ingest::ingest::dedup::LinkDeduper;
use catalyst_ingest::ingest::fetcher::{RetryPolicy, RetryingFetcher};
use catalyst_ingest::ingest::registry::SourceRegistry;
use catalyst_ingest::ingest::scheduler::{run_tick, spawn_ingest_loop, DueScheduler};
use catalyst_ingest::ingest::types::{
    FetchContext, Lane, NewsItem, NewsSource, SourceConfig, SourceError, SourcePriority,
    SourceTag, SourceType,
};
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use tokio::sync::mpsc;

/// Returns the same headlines every call, with one duplicated link.
struct Repeating {
    tag: SourceTag,
    calls: AtomicUsize,
}

#[async_trait]
impl NewsSource for Repeating {
    fn id(&self) -> &str {
        &self.tag.id
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<Vec<NewsItem>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(["a", "b", "a"]
            .iter()
            .map(|k| {
                self.tag.item(
                    format!("{} item {k}", self.tag.name),
                    format!("https://{}.example/{k}", self.tag.id),
                    ctx.now,
                )
            })
            .collect())
    }
}

fn registry(ids: &[&str]) -> (Arc<SourceRegistry>, Vec<Arc<Repeating>>) {
    let fetcher = Arc::new(RetryingFetcher::with_client(
        reqwest::Client::new(),
        RetryPolicy::default(),
    ));
    let mut r = SourceRegistry::new(fetcher, CircuitBreaker::default());
    let mut stubs = Vec::new();
    for id in ids {
        let stub = Arc::new(Repeating {
            tag: SourceTag::new(*id, id.to_uppercase(), SourcePriority::Official),
            calls: AtomicUsize::new(0),
        });
        r.register(
            SourceConfig {
                id: id.to_string(),
                name: id.to_uppercase(),
                source_type: SourceType::Rss,
                lane: Lane::Official,
                priority: SourcePriority::Official,
                poll_interval_minutes: 5,
                enabled: true,
            },
            stub.clone(),
        )
        .unwrap();
        stubs.push(stub);
    }
    (Arc::new(r), stubs)
}

#[tokio::test]
async fn second_tick_reports_nothing_new() {
    let (r, stubs) = registry(&["rbi", "pib"]);
    let t0 = Utc.with_ymd_and_hms(2026, 10, 19, 4, 0, 0).unwrap();
    let mut sched = DueScheduler::new(r.all_sources().to_vec(), t0);
    let mut dedup = LinkDeduper::with_capacity(100);

    let first = run_tick(&r, &mut sched, &mut dedup, t0).await;
    assert_eq!(first.outcomes.len(), 2);
    assert!(first.outcomes.iter().all(|o| o.items_found == 3 && o.new_items == 2));
    assert_eq!(first.fresh.len(), 4);

    let idle = run_tick(&r, &mut sched, &mut dedup, t0 + ChronoDuration::minutes(1)).await;
    assert!(idle.outcomes.is_empty());

    let second = run_tick(&r, &mut sched, &mut dedup, t0 + ChronoDuration::minutes(5)).await;
    assert_eq!(second.outcomes.len(), 2);
    assert!(second.outcomes.iter().all(|o| o.items_found == 3 && o.new_items == 0));
    assert!(second.fresh.is_empty());
    assert!(stubs.iter().all(|s| s.calls.load(Ordering::SeqCst) == 2));
}

#[tokio::test]
async fn loop_streams_unique_items_and_stops_with_receiver() {
    let (r, stubs) = registry(&["rbi"]);
    let (tx, mut rx) = mpsc::channel(16);
    let handle = spawn_ingest_loop(r, tx, Duration::from_millis(20));

    let mut got = Vec::new();
    for _ in 0..2 {
        let item = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        got.push(item.link);
    }
    got.sort();
    assert_eq!(got, vec!["https://rbi.example/a", "https://rbi.example/b"]);

    // Nothing else is due for five minutes.
    assert!(tokio::time::timeout(Duration::from_millis(150), rx.recv()).await.is_err());
    assert_eq!(stubs[0].calls.load(Ordering::SeqCst), 1);

    drop(rx);
    handle.abort();
}
