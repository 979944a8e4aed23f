//! Link-keyed "have we emitted this before" memory for the ingest loop.

use std::collections::{HashSet, VecDeque};

use crate::ingest::types::NewsItem;

/// Remembers the last `cap` links; oldest links are forgotten first.
#[derive(Debug)]
pub struct LinkDeduper {
    seen: HashSet<String>,
    order: VecDeque<String>,
    cap: usize,
}

impl LinkDeduper {
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            seen: HashSet::with_capacity(cap.min(10_000)),
            order: VecDeque::with_capacity(cap.min(10_000)),
            cap,
        }
    }

    /// Items whose link has not been seen yet, in input order. Duplicates inside
    /// `items` are collapsed to their first occurrence.
    pub fn retain_new(&mut self, items: Vec<NewsItem>) -> Vec<NewsItem> {
        let mut out = Vec::with_capacity(items.len());
        for it in items {
            if self.seen.contains(&it.link) {
                continue;
            }
            self.remember(it.link.clone());
            out.push(it);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn remember(&mut self, link: String) {
        self.seen.insert(link.clone());
        self.order.push_back(link);
        while self.order.len() > self.cap {
            if let Some(old) = self.order.pop_front() {
                self.seen.remove(&old);
            }
        }
    }
}
