//! Liveness events
//!
//! Defines the events the registry emits for external alert routing.
//! The registry only guarantees production; delivery (email, SMS,
//! paging) is the consumer's concern.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events emitted by the liveness registry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    /// A key's deadline elapsed with no intervening signal
    MissedHeartbeat(MissedHeartbeatEvent),
    /// The sweeper reclaimed a stale entry whose timer never fired
    StaleEntryReclaimed(StaleEntryReclaimedEvent),
}

impl Event {
    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::MissedHeartbeat(_) => "missed_heartbeat",
            Event::StaleEntryReclaimed(_) => "stale_entry_reclaimed",
        }
    }

    /// Get the monitored key the event concerns
    pub fn key(&self) -> &str {
        match self {
            Event::MissedHeartbeat(e) => &e.key,
            Event::StaleEntryReclaimed(e) => &e.key,
        }
    }
}

/// Missed heartbeat event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissedHeartbeatEvent {
    pub key: String,
    pub expired_at: DateTime<Utc>,
}

/// Stale entry reclaimed by the sweeper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaleEntryReclaimedEvent {
    pub key: String,
    pub last_seen: DateTime<Utc>,
    pub reclaimed_at: DateTime<Utc>,
}

/// Envelope pairing an event with its publication time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub event: Event,
    pub published_at: DateTime<Utc>,
}

impl EventMessage {
    pub fn new(event: Event) -> Self {
        Self {
            event,
            published_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let event = Event::MissedHeartbeat(MissedHeartbeatEvent {
            key: "/api/orders".to_string(),
            expired_at: Utc::now(),
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "MissedHeartbeat");
        assert_eq!(json["data"]["key"], "/api/orders");

        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back.event_type(), "missed_heartbeat");
        assert_eq!(back.key(), "/api/orders");
    }
}
