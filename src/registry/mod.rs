//! Heartbeat registry — concurrent per-key liveness tracking
//!
//! Each monitored key owns an [`Entry`] holding its last-seen timestamp
//! and a resettable single-fire deadline alarm, realized as a spawned
//! watcher task fed through a `watch` channel. Every mutation of an
//! entry mints a fresh `generation` stamp from a registry-wide counter;
//! removal is always conditional on the generation, so a timer that
//! fires after a reset, or against a re-created entry of the same key,
//! removes nothing and emits nothing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::events::{Event, MissedHeartbeatEvent, SharedEventBus, StaleEntryReclaimedEvent};
use crate::support::shutdown::{ShutdownSignal, TaskGauge};

pub mod sweeper;

/// Per-key state: last-seen time plus the armed deadline alarm.
///
/// The watch sender is the alarm's lifeline: dropping the entry drops
/// the sender, which cancels the watcher task without firing.
struct Entry {
    last_seen: DateTime<Utc>,
    generation: u64,
    deadline_tx: watch::Sender<Armed>,
}

/// What the watcher is currently armed for
#[derive(Debug, Clone, Copy)]
struct Armed {
    generation: u64,
    deadline: Instant,
}

/// Outcome of a timer fire against the registry
enum Reap {
    /// Entry removed, notification published
    Fired,
    /// A reset won the race; the watcher must rearm
    Rearmed,
    /// Entry already removed by another actor
    Gone,
}

/// Snapshot of one entry for monitoring
#[derive(Debug, Clone, Serialize)]
pub struct EntryStatus {
    pub key: String,
    pub last_seen: DateTime<Utc>,
    pub seconds_silent: i64,
}

/// Thread-safe registry of monitored keys
///
/// Built through [`shared`](Self::shared) only: each spawned watcher
/// holds a strong reference back to the registry, obtained through the
/// `weak_self` handle.
pub struct HeartbeatRegistry {
    entries: DashMap<String, Entry>,
    deadline: Duration,
    events: SharedEventBus,
    gauge: TaskGauge,
    shutdown: ShutdownSignal,
    generations: AtomicU64,
    weak_self: Weak<HeartbeatRegistry>,
}

/// Shared, reference-counted heartbeat registry
pub type SharedHeartbeatRegistry = Arc<HeartbeatRegistry>;

impl HeartbeatRegistry {
    pub fn shared(
        deadline: Duration,
        events: SharedEventBus,
        gauge: TaskGauge,
        shutdown: ShutdownSignal,
    ) -> SharedHeartbeatRegistry {
        Arc::new_cyclic(|weak| Self {
            entries: DashMap::new(),
            deadline,
            events,
            gauge,
            shutdown,
            generations: AtomicU64::new(0),
            weak_self: weak.clone(),
        })
    }

    /// Record a heartbeat signal for `key`.
    ///
    /// Absent key: creates an entry and arms its deadline alarm.
    /// Present key: refreshes `last_seen` and resets the alarm,
    /// cancelling any pending fire. Per-key serialization rides the
    /// map's shard lock; distinct keys never block each other.
    pub fn record_signal(&self, key: &str) {
        let now = Utc::now();
        let deadline_at = Instant::now() + self.deadline;

        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.last_seen = now;
                entry.generation = self.next_generation();
                let _ = entry.deadline_tx.send(Armed {
                    generation: entry.generation,
                    deadline: deadline_at,
                });
            }
            MapEntry::Vacant(vacant) => {
                debug!(key, "Tracking new heartbeat entry");
                let generation = self.next_generation();
                let (deadline_tx, deadline_rx) = watch::channel(Armed {
                    generation,
                    deadline: deadline_at,
                });
                vacant.insert(Entry {
                    last_seen: now,
                    generation,
                    deadline_tx,
                });
                if let Some(registry) = self.weak_self.upgrade() {
                    tokio::spawn(watch_entry(registry, key.to_string(), deadline_rx));
                }
            }
        }

        metrics::counter!("heartbeats_received_total").increment(1);
        metrics::gauge!("tracked_entries").set(self.entries.len() as f64);
    }

    /// Idempotent removal; an absent key is a no-op.
    /// Returns whether an entry was actually removed.
    pub fn remove(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            metrics::gauge!("tracked_entries").set(self.entries.len() as f64);
        }
        removed
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn last_seen(&self, key: &str) -> Option<DateTime<Utc>> {
        self.entries.get(key).map(|e| e.last_seen)
    }

    /// Number of tracked entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Point-in-time liveness snapshot of all entries
    pub fn statuses(&self) -> Vec<EntryStatus> {
        let now = Utc::now();
        self.entries
            .iter()
            .map(|entry| EntryStatus {
                key: entry.key().clone(),
                last_seen: entry.last_seen,
                seconds_silent: now.signed_duration_since(entry.last_seen).num_seconds(),
            })
            .collect()
    }

    pub fn gauge(&self) -> &TaskGauge {
        &self.gauge
    }

    /// One sweep cycle: scan for entries silent past the deadline, then
    /// remove the marked ones after the scan completes. A successful
    /// removal here means the timer never fired for that generation, so
    /// a distinct reclaim event is published. Entries refreshed mid-scan
    /// fail the generation check and survive.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut stale = Vec::new();
        for entry in self.entries.iter() {
            let elapsed = now.signed_duration_since(entry.last_seen);
            if elapsed.to_std().is_ok_and(|e| e > self.deadline) {
                stale.push((entry.key().clone(), entry.generation, entry.last_seen));
            }
        }

        let mut reclaimed = 0;
        for (key, generation, last_seen) in stale {
            if let Some((key, _)) = self
                .entries
                .remove_if(&key, |_, e| e.generation == generation)
            {
                warn!(%key, "Removing expired entry");
                metrics::counter!("entries_reclaimed_total").increment(1);
                self.events.publish(Event::StaleEntryReclaimed(StaleEntryReclaimedEvent {
                    key,
                    last_seen,
                    reclaimed_at: now,
                }));
                reclaimed += 1;
            }
        }

        if reclaimed > 0 {
            metrics::gauge!("tracked_entries").set(self.entries.len() as f64);
        }
        reclaimed
    }

    /// Timer-fire path: remove and notify only if `generation` is still
    /// the entry's current stamp.
    fn reap_expired(&self, key: &str, generation: u64) -> Reap {
        if let Some((key, _)) = self
            .entries
            .remove_if(key, |_, e| e.generation == generation)
        {
            warn!(%key, "Missed heartbeat");
            metrics::counter!("heartbeats_missed_total").increment(1);
            metrics::gauge!("tracked_entries").set(self.entries.len() as f64);
            self.events.publish(Event::MissedHeartbeat(MissedHeartbeatEvent {
                key,
                expired_at: Utc::now(),
            }));
            return Reap::Fired;
        }
        if self.entries.contains_key(key) {
            Reap::Rearmed
        } else {
            Reap::Gone
        }
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed)
    }
}

/// Per-entry deadline alarm.
///
/// Lives exactly as long as its entry: removal drops the watch sender,
/// which ends the task without firing. A reset pushes a new `Armed`
/// through the channel and reschedules the sleep.
async fn watch_entry(
    registry: SharedHeartbeatRegistry,
    key: String,
    mut deadline_rx: watch::Receiver<Armed>,
) {
    let shutdown = registry.shutdown.clone();
    let mut armed = *deadline_rx.borrow();

    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(armed.deadline) => {
                // claim the drain slot before consulting the flag: either
                // the drain waits this fire out, or the fire is suppressed
                let _work = registry.gauge.enter();
                if shutdown.is_triggered() {
                    break;
                }
                match registry.reap_expired(&key, armed.generation) {
                    Reap::Fired | Reap::Gone => break,
                    Reap::Rearmed => {
                        // the winning reset already sent the new deadline,
                        // so this resolves immediately
                        match deadline_rx.changed().await {
                            Ok(()) => armed = *deadline_rx.borrow_and_update(),
                            Err(_) => break,
                        }
                    }
                }
            }
            changed = deadline_rx.changed() => match changed {
                Ok(()) => armed = *deadline_rx.borrow_and_update(),
                Err(_) => break,
            },
            _ = shutdown.notified().wait() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::create_event_bus;
    use crate::support::shutdown::ShutdownCoordinator;

    fn test_registry(
        deadline: Duration,
    ) -> (
        SharedHeartbeatRegistry,
        crate::events::EventSubscriber,
        ShutdownCoordinator,
    ) {
        let coordinator = ShutdownCoordinator::new();
        let events = create_event_bus();
        let subscriber = events.subscribe();
        let registry = HeartbeatRegistry::shared(
            deadline,
            events,
            coordinator.gauge(),
            coordinator.signal(),
        );
        (registry, subscriber, coordinator)
    }

    #[tokio::test]
    async fn test_missed_heartbeat_fires_exactly_once() {
        let (registry, mut events, _coordinator) = test_registry(Duration::from_millis(100));

        let before = Utc::now();
        registry.record_signal("/a");
        assert!(registry.contains("/a"));

        let msg = tokio::time::timeout(Duration::from_millis(500), events.recv())
            .await
            .expect("expiration should fire")
            .expect("bus open");
        match &msg.event {
            Event::MissedHeartbeat(e) => {
                assert_eq!(e.key, "/a");
                assert!(e.expired_at >= before);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(!registry.contains("/a"));

        // no second emission for the same silence episode
        let extra = tokio::time::timeout(Duration::from_millis(200), events.recv()).await;
        assert!(extra.is_err(), "expected no further events");
    }

    #[tokio::test]
    async fn test_repeated_signals_suppress_expiry() {
        let (registry, mut events, _coordinator) = test_registry(Duration::from_millis(100));

        registry.record_signal("/a");
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            registry.record_signal("/a");
        }

        // 200ms past the first signal now, well past its first deadline
        let quiet = tokio::time::timeout(Duration::from_millis(60), events.recv()).await;
        assert!(quiet.is_err(), "resets must cancel pending fires");
        assert!(registry.contains("/a"));
    }

    #[tokio::test]
    async fn test_last_seen_tracks_latest_signal() {
        let (registry, _events, _coordinator) = test_registry(Duration::from_secs(300));

        registry.record_signal("/a");
        let first = registry.last_seen("/a").expect("entry present");

        tokio::time::sleep(Duration::from_millis(20)).await;
        registry.record_signal("/a");
        let second = registry.last_seen("/a").expect("entry present");

        assert!(second > first);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_absent_key_is_noop() {
        let (registry, _events, _coordinator) = test_registry(Duration::from_secs(300));
        assert!(!registry.remove("/never-signaled"));
        registry.record_signal("/a");
        assert!(registry.remove("/a"));
        assert!(!registry.remove("/a"));
    }

    #[tokio::test]
    async fn test_concurrent_distinct_keys_do_not_interfere() {
        let (registry, _events, _coordinator) = test_registry(Duration::from_secs(300));

        let mut handles = Vec::new();
        for i in 0..200 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let key = format!("/service/{}", i);
                for _ in 0..5 {
                    registry.record_signal(&key);
                    tokio::task::yield_now().await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(registry.len(), 200);
        for i in 0..200 {
            assert!(registry.contains(&format!("/service/{}", i)));
        }
    }

    #[tokio::test]
    async fn test_sweep_reclaims_stale_entries() {
        let (registry, mut events, _coordinator) = test_registry(Duration::from_secs(300));

        registry.record_signal("/a");
        registry.record_signal("/b");

        // nothing is stale at the current time
        assert_eq!(registry.sweep(Utc::now()), 0);
        assert_eq!(registry.len(), 2);

        // observed from ten minutes in the future, both are stale
        let future = Utc::now() + chrono::Duration::seconds(600);
        assert_eq!(registry.sweep(future), 2);
        assert!(registry.is_empty());

        for _ in 0..2 {
            let msg = tokio::time::timeout(Duration::from_millis(100), events.recv())
                .await
                .expect("reclaim event")
                .expect("bus open");
            assert_eq!(msg.event.event_type(), "stale_entry_reclaimed");
        }
    }

    #[tokio::test]
    async fn test_reset_invalidates_stale_generation() {
        let (registry, _events, _coordinator) = test_registry(Duration::from_secs(300));

        // first signal mints generation 0, the reset mints generation 1
        registry.record_signal("/a");
        registry.record_signal("/a");

        // a removal armed with the stale stamp must not touch the entry
        assert!(registry
            .entries
            .remove_if("/a", |_, e| e.generation == 0)
            .is_none());
        assert!(registry.contains("/a"));
    }

    #[tokio::test]
    async fn test_timer_and_sweep_do_not_double_emit() {
        let (registry, mut events, _coordinator) = test_registry(Duration::from_millis(100));

        registry.record_signal("/a");
        let msg = tokio::time::timeout(Duration::from_millis(500), events.recv())
            .await
            .expect("expiration should fire")
            .expect("bus open");
        assert_eq!(msg.event.event_type(), "missed_heartbeat");

        // the sweeper finding the key absent is a no-op
        let future = Utc::now() + chrono::Duration::seconds(600);
        assert_eq!(registry.sweep(future), 0);

        let extra = tokio::time::timeout(Duration::from_millis(100), events.recv()).await;
        assert!(extra.is_err(), "sweep must not re-emit for a reaped key");
    }

    #[tokio::test]
    async fn test_signal_after_removal_creates_fresh_entry() {
        let (registry, mut events, _coordinator) = test_registry(Duration::from_millis(100));

        registry.record_signal("/a");
        tokio::time::timeout(Duration::from_millis(500), events.recv())
            .await
            .expect("expiration should fire")
            .expect("bus open");
        assert!(!registry.contains("/a"));

        // no resurrection: this is a brand-new entry with its own alarm
        registry.record_signal("/a");
        assert!(registry.contains("/a"));
        let msg = tokio::time::timeout(Duration::from_millis(500), events.recv())
            .await
            .expect("fresh entry expires on its own deadline")
            .expect("bus open");
        assert_eq!(msg.event.key(), "/a");
    }

    #[tokio::test]
    async fn test_never_signaled_keys_stay_silent() {
        let (registry, mut events, _coordinator) = test_registry(Duration::from_millis(50));

        registry.record_signal("/a");
        tokio::time::timeout(Duration::from_millis(300), events.recv())
            .await
            .expect("only /a expires")
            .expect("bus open");

        assert!(!registry.contains("/ghost"));
        let quiet = tokio::time::timeout(Duration::from_millis(100), events.recv()).await;
        assert!(quiet.is_err());
    }

    #[tokio::test]
    async fn test_statuses_snapshot() {
        let (registry, _events, _coordinator) = test_registry(Duration::from_secs(300));

        registry.record_signal("/a");
        registry.record_signal("/b");

        let mut statuses = registry.statuses();
        statuses.sort_by(|a, b| a.key.cmp(&b.key));
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].key, "/a");
        assert!(statuses[0].seconds_silent >= 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_idle_watchers_without_firing() {
        let (registry, mut events, coordinator) = test_registry(Duration::from_millis(100));

        registry.record_signal("/a");
        coordinator.request_shutdown();
        tokio::time::timeout(Duration::from_millis(500), coordinator.drain_complete())
            .await
            .expect("drain completes with no in-flight work");

        let quiet = tokio::time::timeout(Duration::from_millis(250), events.recv()).await;
        assert!(quiet.is_err(), "no events after drain completes");
    }
}
