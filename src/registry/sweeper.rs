//! Background task that periodically reclaims stale entries.
//!
//! Safety net against per-entry timer loss or delay: whatever happens
//! to the alarms, no entry survives longer than `deadline +
//! sweep_interval` past its last signal.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::support::shutdown::ShutdownSignal;

use super::SharedHeartbeatRegistry;

/// Start the sweeper background task.
///
/// The task scans every `sweep_interval` for entries silent past the
/// registry deadline and removes them, holding a drain-gauge slot for
/// its whole lifetime so shutdown waits out the current cycle.
pub fn start_sweeper(
    registry: SharedHeartbeatRegistry,
    shutdown: ShutdownSignal,
    sweep_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let _work = registry.gauge().enter();

        info!(
            interval_ms = sweep_interval.as_millis() as u64,
            "🧹 Sweeper started"
        );

        let mut interval = tokio::time::interval(sweep_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let reclaimed = registry.sweep(chrono::Utc::now());
                    if reclaimed > 0 {
                        warn!(reclaimed, "Sweep reclaimed stale entries");
                    } else {
                        debug!(tracked = registry.len(), "Sweep cycle clean");
                    }
                }
                _ = shutdown.notified().wait() => {
                    info!("🧹 Sweeper shutting down");
                    break;
                }
            }
        }

        info!("🧹 Sweeper stopped");
    })
}
