//! Hot-swappable playback preferences and the watcher that reacts to them

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// What happens when a stream reaches its end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconnectMode {
    /// Stay ended
    #[default]
    No,
    /// Engine repeats the current item
    Retry,
    /// Full replay of the last command
    Reconnect,
}

/// Settings the session reads at `play()` time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferenceSnapshot {
    /// Transport connect timeout
    pub connect_timeout_ms: u64,
    /// Tunneled video playback
    pub tunneling: bool,
    /// Wrap http sources in the media cache
    pub cache_enabled: bool,
    pub reconnect_mode: ReconnectMode,
}

impl Default for PreferenceSnapshot {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 8_000,
            tunneling: false,
            cache_enabled: false,
            reconnect_mode: ReconnectMode::No,
        }
    }
}

impl PreferenceSnapshot {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Whether moving from `self` to `next` requires rebuilding the session.
    ///
    /// Reconnect mode never does: the running engine is switched in place.
    pub fn requires_replay(&self, next: &PreferenceSnapshot) -> bool {
        self.connect_timeout_ms != next.connect_timeout_ms
            || self.tunneling != next.tunneling
            || self.cache_enabled != next.cache_enabled
    }
}

/// Readable snapshot plus change stream
pub trait PreferenceSource: Send + Sync {
    fn snapshot(&self) -> PreferenceSnapshot;

    fn subscribe(&self) -> watch::Receiver<PreferenceSnapshot>;
}

/// In-memory preference store
#[derive(Debug)]
pub struct Preferences {
    tx: watch::Sender<PreferenceSnapshot>,
}

impl Preferences {
    pub fn new(initial: PreferenceSnapshot) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Publish a snapshot. Subscribers are notified even if nothing changed.
    pub fn set(&self, snapshot: PreferenceSnapshot) {
        self.tx.send_replace(snapshot);
    }

    /// Apply `f` and notify subscribers only if a field changed
    pub fn update(&self, f: impl FnOnce(&mut PreferenceSnapshot)) {
        self.tx.send_if_modified(|current| {
            let before = current.clone();
            f(current);
            *current != before
        });
    }
}

impl Default for Preferences {
    fn default() -> Self {
        Self::new(PreferenceSnapshot::default())
    }
}

impl PreferenceSource for Preferences {
    fn snapshot(&self) -> PreferenceSnapshot {
        self.tx.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<PreferenceSnapshot> {
        self.tx.subscribe()
    }
}

/// Change notification sent to the session.
///
/// With `replay` set the session replays, otherwise only the reconnect mode
/// moved and is applied to the running engine. Either way the session then
/// completes `applied`, and only after that does the watcher adopt `snapshot`
/// as its baseline.
#[derive(Debug)]
pub struct PreferenceChange {
    pub generation: u64,
    pub snapshot: PreferenceSnapshot,
    pub replay: bool,
    pub applied: oneshot::Sender<()>,
}

/// Watches the preference stream while a session is active
pub struct PreferenceWatcher {
    generation: u64,
    applied: PreferenceSnapshot,
    rx: watch::Receiver<PreferenceSnapshot>,
    cancel: CancellationToken,
}

impl PreferenceWatcher {
    /// `applied` is the snapshot the running pipeline was built from.
    ///
    /// The current value of `rx` is compared against it when the watcher
    /// starts, so a write that lands between reading `applied` and spawning
    /// the watcher is still reported.
    pub fn new(
        generation: u64,
        applied: PreferenceSnapshot,
        rx: watch::Receiver<PreferenceSnapshot>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            generation,
            applied,
            rx,
            cancel,
        }
    }

    pub fn spawn(self, tx: mpsc::Sender<PreferenceChange>) -> JoinHandle<()> {
        tokio::spawn(self.run(tx))
    }

    pub async fn run(mut self, tx: mpsc::Sender<PreferenceChange>) {
        let mut next = self.rx.borrow_and_update().clone();
        while self.notify(next, &tx).await {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                changed = self.rx.changed() => {
                    if changed.is_err() {
                        debug!("Preference source closed");
                        break;
                    }
                    next = self.rx.borrow_and_update().clone();
                }
            }
        }
        debug!(generation = self.generation, "Preference watcher stopped");
    }

    /// Report `next` if it differs from the applied baseline and wait for the
    /// session to apply it. Returns `false` once the watcher should stop.
    async fn notify(&mut self, next: PreferenceSnapshot, tx: &mpsc::Sender<PreferenceChange>) -> bool {
        let replay = self.applied.requires_replay(&next);
        if !replay && self.applied.reconnect_mode == next.reconnect_mode {
            self.applied = next;
            return true;
        }

        if replay {
            info!(
                connect_timeout_ms = next.connect_timeout_ms,
                tunneling = next.tunneling,
                cache_enabled = next.cache_enabled,
                "Playback preferences changed"
            );
        } else {
            info!(reconnect_mode = ?next.reconnect_mode, "Reconnect mode changed");
        }

        let (applied_tx, applied_rx) = oneshot::channel();
        let change = PreferenceChange {
            generation: self.generation,
            snapshot: next.clone(),
            replay,
            applied: applied_tx,
        };
        if tx.send(change).await.is_err() {
            return false;
        }

        tokio::select! {
            _ = self.cancel.cancelled() => false,
            result = applied_rx => {
                if result.is_err() {
                    return false;
                }
                self.applied = next;
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_replay() {
        let base = PreferenceSnapshot::default();
        assert!(!base.requires_replay(&base.clone()));

        let reconnect = PreferenceSnapshot {
            reconnect_mode: ReconnectMode::Reconnect,
            ..base.clone()
        };
        assert!(!base.requires_replay(&reconnect));

        let cache = PreferenceSnapshot {
            cache_enabled: true,
            ..base.clone()
        };
        assert!(base.requires_replay(&cache));

        let timeout = PreferenceSnapshot {
            connect_timeout_ms: 1_000,
            ..base.clone()
        };
        assert!(base.requires_replay(&timeout));
    }

    #[test]
    fn test_update_only_notifies_on_change() {
        let prefs = Preferences::default();
        let mut rx = prefs.subscribe();
        prefs.update(|p| p.tunneling = false);
        assert!(!rx.has_changed().unwrap());
        prefs.update(|p| p.tunneling = true);
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().tunneling);
    }

    #[test]
    fn test_snapshot_defaults_from_partial_json() {
        let snapshot: PreferenceSnapshot =
            serde_json::from_str(r#"{"cache_enabled": true, "reconnect_mode": "reconnect"}"#)
                .unwrap();
        assert!(snapshot.cache_enabled);
        assert_eq!(snapshot.connect_timeout_ms, 8_000);
        assert_eq!(snapshot.reconnect_mode, ReconnectMode::Reconnect);
    }

    #[tokio::test]
    async fn test_identical_snapshots_do_not_notify() {
        let prefs = Preferences::default();
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let watcher = PreferenceWatcher::new(1, prefs.snapshot(), prefs.subscribe(), cancel.clone());
        let handle = watcher.spawn(tx);

        prefs.set(PreferenceSnapshot::default());
        prefs.set(PreferenceSnapshot::default());
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_change_waits_for_replay_before_adopting() {
        let prefs = Preferences::default();
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let watcher = PreferenceWatcher::new(3, prefs.snapshot(), prefs.subscribe(), cancel.clone());
        let handle = watcher.spawn(tx);

        prefs.update(|p| p.cache_enabled = true);
        let change = rx.recv().await.unwrap();
        assert_eq!(change.generation, 3);
        assert!(change.snapshot.cache_enabled);
        assert!(change.replay);

        // Same change re-emitted while the replay is pending is coalesced
        prefs.set(change.snapshot.clone());
        change.applied.send(()).unwrap();
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_write_before_start_is_reported() {
        let prefs = Preferences::default();
        let applied = prefs.snapshot();
        let rx = prefs.subscribe();
        // Lands after the baseline was read but before the watcher runs
        prefs.update(|p| p.cache_enabled = true);
        let mut seen = rx.clone();
        seen.mark_unchanged();

        let (tx, mut changes) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let handle = PreferenceWatcher::new(1, applied, seen, cancel.clone()).spawn(tx);

        let change = changes.recv().await.unwrap();
        assert!(change.replay);
        assert!(change.snapshot.cache_enabled);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_reconnect_mode_change_is_applied_without_replay() {
        let prefs = Preferences::default();
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let handle =
            PreferenceWatcher::new(2, prefs.snapshot(), prefs.subscribe(), cancel.clone()).spawn(tx);

        prefs.update(|p| p.reconnect_mode = ReconnectMode::Retry);
        let change = rx.recv().await.unwrap();
        assert!(!change.replay);
        assert_eq!(change.snapshot.reconnect_mode, ReconnectMode::Retry);
        change.applied.send(()).unwrap();

        prefs.update(|p| p.tunneling = true);
        let change = rx.recv().await.unwrap();
        assert!(change.replay);
        assert_eq!(change.snapshot.reconnect_mode, ReconnectMode::Retry);

        cancel.cancel();
        handle.await.unwrap();
    }
}
