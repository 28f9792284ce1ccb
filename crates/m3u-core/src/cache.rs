//! Media cache seam shared by the pipeline's caching decorator and cache maintenance

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;
use tracing::debug;

/// A cached byte range of one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSpan {
    pub key: String,
    pub position: u64,
    pub length: u64,
}

/// Byte cache used by the engine's data sources
pub trait MediaCache: Send + Sync {
    fn bytes_used(&self) -> u64;

    fn keys(&self) -> Vec<String>;

    fn spans(&self, key: &str) -> Vec<CacheSpan>;

    fn remove_span(&self, span: &CacheSpan);
}

/// Remove every span from `cache`, returning the bytes freed
pub fn clear(cache: &dyn MediaCache) -> u64 {
    let before = cache.bytes_used();
    for key in cache.keys() {
        for span in cache.spans(&key) {
            cache.remove_span(&span);
        }
    }
    let freed = before.saturating_sub(cache.bytes_used());
    debug!(freed, "Media cache cleared");
    freed
}

/// In-memory span index, for tests and headless runs
#[derive(Debug, Default)]
pub struct MemoryCache {
    spans: RwLock<BTreeMap<String, Vec<CacheSpan>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str, position: u64, length: u64) {
        if let Ok(mut spans) = self.spans.write() {
            spans.entry(key.to_string()).or_default().push(CacheSpan {
                key: key.to_string(),
                position,
                length,
            });
        }
    }
}

impl MediaCache for MemoryCache {
    fn bytes_used(&self) -> u64 {
        self.spans
            .read()
            .map(|spans| spans.values().flatten().map(|s| s.length).sum())
            .unwrap_or(0)
    }

    fn keys(&self) -> Vec<String> {
        self.spans
            .read()
            .map(|spans| spans.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn spans(&self, key: &str) -> Vec<CacheSpan> {
        self.spans
            .read()
            .ok()
            .and_then(|spans| spans.get(key).cloned())
            .unwrap_or_default()
    }

    fn remove_span(&self, span: &CacheSpan) {
        if let Ok(mut spans) = self.spans.write() {
            if let Some(list) = spans.get_mut(&span.key) {
                list.retain(|s| s != span);
                if list.is_empty() {
                    spans.remove(&span.key);
                }
            }
        }
    }
}
