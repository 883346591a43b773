//! Liveness event types and the broadcast bus that carries them to
//! external alert consumers.

pub mod event_bus;
pub mod types;

pub use event_bus::{create_event_bus, EventBus, EventSubscriber, SharedEventBus};
pub use types::{Event, EventMessage, MissedHeartbeatEvent, StaleEntryReclaimedEvent};
