//! Continue-watching policy and persistence seam
//!
//! The predicates decide *whether* a position may be stored, restored or
//! discarded. Persisting is left to a [`ContinueWatchingStore`].

use crate::format::MimeType;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ring::digest::{digest, SHA256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write as _;
use tokio::sync::RwLock;

/// Capability and timing snapshot of the current media item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PositionSnapshot {
    /// The engine can report and accept a current media item
    pub supports_media_item: bool,
    /// Live / dynamic window
    pub is_live: bool,
    pub is_seekable: bool,
    pub duration_ms: Option<u64>,
    pub position_ms: u64,
}

impl PositionSnapshot {
    pub fn remaining_ms(&self) -> Option<u64> {
        self.duration_ms
            .map(|duration| duration.saturating_sub(self.position_ms))
    }
}

/// Thresholds for the continue-watching predicates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContinueWatchingPolicy {
    /// Content shorter than this always starts from the beginning
    pub min_duration_ms: u64,
    /// Less than this left counts as watched
    pub min_remaining_ms: u64,
    /// Less than this fraction of the duration left counts as watched
    pub remaining_ratio: f64,
    /// Optional gate on storing short content
    pub min_storable_duration_ms: Option<u64>,
}

impl Default for ContinueWatchingPolicy {
    fn default() -> Self {
        Self {
            min_duration_ms: 15_000,
            min_remaining_ms: 5_000,
            remaining_ratio: 0.1,
            min_storable_duration_ms: None,
        }
    }
}

impl ContinueWatchingPolicy {
    pub fn is_storing_supported(&self, snapshot: &PositionSnapshot) -> bool {
        if snapshot.is_live || !snapshot.is_seekable {
            return false;
        }
        match (self.min_storable_duration_ms, snapshot.duration_ms) {
            (Some(min), Some(duration)) => duration >= min,
            (Some(_), None) => false,
            (None, _) => true,
        }
    }

    pub fn is_restoring_supported(&self, snapshot: &PositionSnapshot) -> bool {
        snapshot.supports_media_item
    }

    /// True when a stored position should be discarded rather than resumed
    pub fn is_resetting_supported(&self, snapshot: &PositionSnapshot) -> bool {
        if !snapshot.is_seekable || snapshot.is_live {
            return true;
        }
        let Some(duration) = snapshot.duration_ms else {
            return true;
        };
        if duration < self.min_duration_ms {
            return true;
        }
        let remaining = duration.saturating_sub(snapshot.position_ms);
        (remaining as f64) < duration as f64 * self.remaining_ratio
            || remaining < self.min_remaining_ms
    }
}

/// Stored resume point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinueWatchingEntry {
    pub resource_key: String,
    pub position_ms: u64,
    pub mime_type: Option<MimeType>,
    pub updated_at: DateTime<Utc>,
}

impl ContinueWatchingEntry {
    pub fn new(locator: &str, position_ms: u64, mime_type: Option<MimeType>) -> Self {
        Self {
            resource_key: resource_key(locator),
            position_ms,
            mime_type,
            updated_at: Utc::now(),
        }
    }
}

/// Stable key for a resource locator
pub fn resource_key(locator: &str) -> String {
    let hash = digest(&SHA256, locator.trim().as_bytes());
    hash.as_ref()
        .iter()
        .take(16)
        .fold(String::with_capacity(32), |mut key, byte| {
            let _ = write!(key, "{:02x}", byte);
            key
        })
}

/// Key-value persistence for resume points
#[async_trait]
pub trait ContinueWatchingStore: Send + Sync {
    async fn get(&self, resource_key: &str) -> Result<Option<ContinueWatchingEntry>>;

    async fn put(&self, entry: ContinueWatchingEntry) -> Result<()>;

    async fn remove(&self, resource_key: &str) -> Result<()>;
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, ContinueWatchingEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ContinueWatchingStore for MemoryStore {
    async fn get(&self, resource_key: &str) -> Result<Option<ContinueWatchingEntry>> {
        Ok(self.entries.read().await.get(resource_key).cloned())
    }

    async fn put(&self, entry: ContinueWatchingEntry) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(entry.resource_key.clone(), entry);
        Ok(())
    }

    async fn remove(&self, resource_key: &str) -> Result<()> {
        self.entries.write().await.remove(resource_key);
        Ok(())
    }
}
