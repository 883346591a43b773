//! # Heartbeat Liveness Registry
//!
//! Tracks liveness of named, independently monitored entities by
//! recording the most recent heartbeat signal per key and emitting a
//! notification when a heartbeat has not arrived within a configured
//! deadline.
//!
//! ## Architecture
//!
//! - **registry**: concurrent key → last-seen store with a resettable
//!   per-entry expiration alarm, plus the periodic sweeper backstop
//! - **events**: broadcast bus carrying missed-heartbeat and
//!   stale-reclaim events to external alert consumers
//! - **support**: shutdown signal, drain coordination and error types
//! - **interfaces**: HTTP transport mapping requests onto the registry
//! - **config**: TOML configuration with defaults

pub mod config;
pub mod events;
pub mod interfaces;
pub mod registry;
pub mod support;

pub use config::{default_config_path, AppConfig};
pub use events::{create_event_bus, Event, EventBus, SharedEventBus};
pub use interfaces::http::create_router;
pub use registry::{HeartbeatRegistry, SharedHeartbeatRegistry};
pub use support::shutdown::{ShutdownCoordinator, ShutdownSignal};
