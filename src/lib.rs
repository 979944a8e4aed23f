// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod config;
pub mod ingest;
pub mod market;
pub mod metrics;

pub use crate::api::router;
pub use crate::ingest::registry::{FetchOutcome, SourceRegistry};
pub use crate::ingest::types::{NewsItem, NewsSource, SourceConfig, SourcePriority};
